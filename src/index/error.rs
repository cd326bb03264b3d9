use crate::file::FileError;
use crate::record::RecordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Key field '{0}' is not an INT column")]
    KeyNotInt(String),

    #[error("Key field index {index} out of range for schema with {fields} fields")]
    KeyIndexOutOfRange { index: usize, fields: usize },

    #[error("B+tree invariant violated: {0}")]
    Corrupted(String),
}

pub type IndexResult<T> = Result<T, IndexError>;
