//! # Audio Module
//!
//! Queue control and voice playback for one guild at a time.
//!
//! - [`controller`]: the per-guild queue controller (add, skip, seek, stop...)
//! - [`manager`]: owns one controller per guild and pumps its player events
//! - [`voice`]: the contracts the controller drives (backend, connection, player)
//! - [`driver`]: those contracts implemented on top of songbird
//! - [`resource`]: playable resources tagged with a monotonically increasing id

pub mod controller;
pub mod driver;
pub mod error;
pub mod manager;
pub mod resource;
pub mod voice;

#[cfg(test)]
pub mod fakes;
