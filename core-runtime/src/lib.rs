//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the download and playback crates:
//! - Logging and tracing infrastructure
//! - Configuration and bridge resolution
//! - Event bus for playback and download notifications
//!
//! ## Overview
//!
//! Everything above this crate logs through `tracing`, publishes state through
//! [`events::EventBus`] and receives its collaborators from
//! [`config::CoreConfig`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
