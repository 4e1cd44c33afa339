//! VTX GW - Vox Valvetronix VT-X amplifier controller core
//!
//! Talks to the amplifier over MIDI SysEx: a midir transport, a framed
//! codec, a typed parameter model, the program/bank store, and the
//! synchronizer actor that ties them together. UI front-ends sit on top
//! of [`sync::SyncHandle`] and the status events it publishes.

pub mod ampfile;
pub mod config;
pub mod midi;
pub mod params;
pub mod paths;
pub mod program;
pub mod protocol;
pub mod store;
pub mod sync;

pub use config::AppConfig;
pub use paths::AppPaths;
pub use sync::{StatusEvent, SyncHandle, SyncState, Synchronizer};
