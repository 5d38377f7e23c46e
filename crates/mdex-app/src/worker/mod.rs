pub mod entry;
pub mod launcher;
pub mod state;

pub use entry::{ResultWriter, WorkerContext, run_stdio, run_task};
pub use launcher::{WorkerCommand, WorkerLauncher};
pub use state::TaskState;
