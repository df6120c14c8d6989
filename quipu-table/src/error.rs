use quipu_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("table model was disposed")]
    Disposed,

    #[error("auth collaborator went away")]
    AuthUnavailable,
}

pub type Result<T> = std::result::Result<T, TableError>;
