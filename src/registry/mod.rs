//! Session registry and housekeeping
//!
//! - `SessionRegistry`: session_id → live session, with owner checks
//! - `spawn_reaper`: finalizes sessions abandoned without a finalize call

mod reaper;
mod store;

pub use reaper::spawn_reaper;
pub use store::{SessionRegistry, TranscriptSink};
