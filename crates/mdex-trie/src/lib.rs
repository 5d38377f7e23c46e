pub mod codec;
pub mod error;
pub mod index;
pub mod trie;

pub use error::TrieError;
pub use index::{TrieIndex, load, save, try_load};
pub use trie::Trie;
