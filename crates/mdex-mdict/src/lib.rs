pub mod block;
pub mod compression;
pub mod crypto;
pub mod error;
pub mod flavor;
pub mod header;
pub mod index;
pub mod models;
pub mod reader;
#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use crypto::Passcode;
pub use error::{MdictError, Result};
pub use reader::{MAX_REDIRECTS, MdictFile};
