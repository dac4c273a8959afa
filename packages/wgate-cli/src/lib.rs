pub mod cli;
pub(crate) mod command;
