//! Download task model: state machine, live counters, control handle and
//! snapshots.

mod control;
mod counters;
mod download_task;
mod snapshot;
mod state;

pub use control::TaskControl;
pub use counters::TaskCounters;
pub use download_task::{DownloadTask, normalize_url};
pub use snapshot::TaskSnapshot;
pub use state::TaskState;
