use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("Connection string error: {0}")]
    ConnectionString(String),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Provisioning error: {0}")]
    Provision(String),

    #[error("Database '{0}' already exists")]
    DatabaseExists(String),

    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, ScratchError>;

impl<T> From<std::sync::PoisonError<T>> for ScratchError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for ScratchError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
