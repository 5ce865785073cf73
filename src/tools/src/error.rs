use thiserror::Error;

use crate::errlist::ErrorList;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("format error: {0}")]
    Format(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(anyhow::Error),
    #[error("retention policy {retention_policy} already exists on database {database}, use --replace to overwrite")]
    Conflict {
        database: String,
        retention_policy: String,
    },
    #[error("write error: {0}")]
    Write(anyhow::Error),
    #[error("{0}")]
    Multiple(ErrorList),
}

impl ImportError {
    pub fn format(msg: impl Into<String>) -> Self {
        ImportError::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
