use crate::{device::DeviceError, storage::StorageError};
use thiserror::Error;
use wgate_crypto::{CryptoError, Key};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("MTU must be between 1280 and 1500, got {0}")]
    InvalidMtu(u16),

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid IP")]
    InvalidIp,

    #[error("Invalid keepalive: {0}")]
    InvalidKeepalive(i32),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Client not found")]
    ClientNotFound,

    #[error("Public key {0} is already registered")]
    KeyInUse(Key),

    #[error("User {user:?} has reached the limit of {limit} clients")]
    TooManyClients { user: String, limit: usize },

    #[error("IP range exhausted")]
    RangeExhausted,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("AddrParseError: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Network parse error: {0}")]
    NetParse(#[from] ipnet::AddrParseError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ServerError {
    /// Storage and device failures mean persisted or live state could not be
    /// brought in line with memory; the hosting process should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::Storage(_) | ServerError::Device(_))
    }
}
