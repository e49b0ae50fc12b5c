#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod cleanup;
pub mod clock;
mod config;
pub mod diagnostics;
mod effects;
mod error;
mod index_store;
pub mod inspect;
pub mod invalidate;
pub mod lock;
mod outcome;
pub mod publish;
mod response;
pub mod store;

pub use crate::cleanup::{cleanup_command, CleanupReport, CleanupRequest, CleanupWorkflow};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{CommandContext, Config, GlobalOptions};
pub use crate::diagnostics::commands as diag_commands;
pub use crate::effects::{Effects, SharedEffects, SystemEffects};
pub use crate::error::{CleanupError, IndexError, PublishError};
pub use crate::index_store::IndexStore;
pub use crate::inspect::{index_show, lock_release, lock_status, IndexShowRequest, LockRequest};
pub use crate::invalidate::{CacheInvalidator, RecordingInvalidator};
pub use crate::lock::{LockCoordinator, LockHandle, LockOutcome, LockPolicy};
pub use crate::outcome::{CommandStatus, ExecutionOutcome};
pub use crate::publish::{publish_command, IndexUpdateWorkflow, PublishReport, PublishRequest};
pub use crate::response::{format_status_message, to_json_response, CommandGroup, CommandInfo};
pub use crate::store::{open_store, LocalStore, MemoryStore, ObjectStore, StoreError, StoreLocation};
