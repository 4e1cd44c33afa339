//! Device synchronizer - the single owner of amplifier state
//!
//! Everything that talks to the device goes through one actor: UI edits
//! arrive as commands, inbound frames arrive on the transport queue, and
//! the actor serializes both onto the shared model. Collaborators observe
//! the result through status events; nobody else mutates the store.

mod actor;
mod commands;
mod handle;
#[cfg(test)]
mod tests;

pub use actor::Synchronizer;
pub use commands::{Direction, StatusEvent, SubscriberFn, SyncCommand, SyncState};
pub use handle::SyncHandle;
