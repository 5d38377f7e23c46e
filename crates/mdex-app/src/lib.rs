pub mod library;
pub mod worker;


use mdex_config::Config;
use mdex_core::MdexError;
use mdex_mdict::Passcode;
use tracing::warn;

pub use library::{IndexReport, Library, RebuildReport};

/// Run blocking file or parse work off the async executor
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, MdexError>
where
    F: FnOnce() -> Result<T, MdexError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MdexError::WorkerFailure(format!("blocking task failed: {e}")))?
}

/// An unusable passcode is logged and ignored; encrypted dictionaries then
/// fail to open on their own.
pub(crate) fn passcode(config: &Config) -> Option<Passcode> {
    let (regcode, email) = config.passcode_parts()?;
    match Passcode::new(regcode, email) {
        Ok(passcode) => Some(passcode),
        Err(e) => {
            warn!("ignoring invalid passcode: {e}");
            None
        }
    }
}
