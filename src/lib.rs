pub mod error;
pub mod index;

pub use error::TreeError;
pub use index::BPlusTree;
