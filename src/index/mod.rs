mod btree_file;
mod error;
mod index_page;
mod leaf_page;

pub use btree_file::BTreeFile;
pub use error::{IndexError, IndexResult};
pub use index_page::{IndexInsert, IndexPage, IndexSplit};
pub use leaf_page::{LeafInsert, LeafPage, LeafSplit, NO_NEXT_LEAF};
