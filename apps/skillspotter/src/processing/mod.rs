//! Processing poller: waits for the backend to finish work started by an upload.

pub mod poller;
pub mod registry;

pub use poller::{poll_for_result, PollConfig, PollError, PollOutcome, PollPhase, PollState};
pub use registry::{PollGuard, PollRegistry};
