use crate::file::FileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("No such field: {0}")]
    NoSuchField(String),

    #[error("Duplicate field name: {0}")]
    DuplicateFieldName(String),

    #[error("Slot out of range: slot {slot}, capacity {capacity}")]
    SlotOutOfRange { slot: usize, capacity: usize },

    #[error("Slot {0} is empty")]
    SlotEmpty(usize),

    #[error("Page out of range: page {page}, file has {num_pages} pages")]
    PageOutOfRange { page: usize, num_pages: usize },

    #[error("Record of {record} bytes does not fit in a {page}-byte page")]
    TupleTooLarge { record: usize, page: usize },
}

pub type RecordResult<T> = Result<T, RecordError>;
