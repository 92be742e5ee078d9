use std::io;
use thiserror::Error;

/// Failures while programming the script region
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("verify failed at {address:#010x}: wrote {expected:#010x}, read {actual:#010x}")]
    VerifyFailed {
        address: u32,
        expected: u32,
        actual: u32,
    },
    #[error("medium fault at {address:#010x}: status {status:#04x}")]
    MediumFault { address: u32, status: u32 },
    #[error("length {len} is not a multiple of the {granularity}-byte program granularity")]
    Misaligned { len: usize, granularity: usize },
    #[error("{len} bytes does not fit the {capacity}-byte script region")]
    TooLarge { len: usize, capacity: usize },
    #[error("{pages} pages of {page_size} bytes do not fit the address space")]
    Geometry { page_size: usize, pages: usize },
    #[error("flash image io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("transport stalled after {sent} of {total} bytes")]
    TransportStalled { sent: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
