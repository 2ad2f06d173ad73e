// Error types for the device photo filesystem

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotoFsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to open device database: {0}")]
    DatabaseOpen(rusqlite::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("unable to determine device database schema: {0}")]
    SchemaUnknown(String),

    #[error("device database schema is ambiguous: {0}")]
    SchemaAmbiguous(String),

    #[error("host I/O error: {0}")]
    HostIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PhotoFsError>;
