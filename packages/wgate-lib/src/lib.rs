pub mod constant;
pub mod types;
pub mod util;
