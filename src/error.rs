use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaskError {
    #[error("argument out of range: {0}")]
    OutOfRange(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("illegal write: {0}")]
    IllegalWrite(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("truncated read: wanted {wanted} bytes, substrate ended after {got}")]
    TruncatedRead { wanted: usize, got: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaskError>;

impl From<CaskError> for std::io::Error {
    fn from(err: CaskError) -> Self {
        use std::io::ErrorKind;
        match err {
            CaskError::Io(inner) => inner,
            CaskError::OutOfRange(_) | CaskError::IllegalWrite(_) => {
                std::io::Error::new(ErrorKind::InvalidInput, err)
            }
            CaskError::Unsupported(_) => std::io::Error::new(ErrorKind::Unsupported, err),
            CaskError::Corruption(_) => std::io::Error::new(ErrorKind::InvalidData, err),
            CaskError::TruncatedRead { .. } => std::io::Error::new(ErrorKind::UnexpectedEof, err),
        }
    }
}
