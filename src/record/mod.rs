mod error;
mod heap_file;
mod heap_page;
mod schema;
mod tuple;
mod value;

pub use error::{RecordError, RecordResult};
pub use heap_file::HeapFile;
pub use heap_page::HeapPage;
pub use schema::TupleDesc;
pub use tuple::Tuple;
pub use value::{CHAR_SIZE, Field, FieldType};
