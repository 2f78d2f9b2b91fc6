pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("Unsupported device type: 0x{0:04x}")]
    UnsupportedType(u16),

    #[error("Record store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record store format error: {0}")]
    Format(#[from] serde_json::Error),
}
