pub mod error;
pub mod registry;
pub mod storage;

#[cfg(test)]
mod tests;

pub use error::MdexError;
pub use registry::Registry;
pub use storage::{Backup, Storage, validate_id};
