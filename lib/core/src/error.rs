use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("No data available for {0}")]
    UnconfiguredCity(String),

    #[error("Failed to read reference data: {0}")]
    ReadFailure(String),

    #[error("Projection failed: {0}")]
    ComputationFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code this error surfaces as at the request boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::UnconfiguredCity(_) => 404,
            Error::InvalidRequest(_) => 400,
            Error::ReadFailure(_)
            | Error::ComputationFailure(_)
            | Error::InvalidConfig(_)
            | Error::Io(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == 404
    }
}
