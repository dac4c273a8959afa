use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
