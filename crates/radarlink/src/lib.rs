//! `radarlink` - Relay a rotating range sensor to a radar display
//!
//! This library decodes `angle,distance` frames from a serial link, keeps a
//! JSON history log, fans samples out to display clients, and maintains the
//! radar view state with simulated and live modes.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod decoder;
pub mod display;
pub mod error;
pub mod hub;
pub mod link;
pub mod logging;
pub mod mode;
pub mod relay;
pub mod sample;
pub mod server;
pub mod simulation;
pub mod store;

pub use config::Config;
pub use decoder::FrameDecoder;
pub use display::{DisplayState, Event, Mode, SharedDisplay};
pub use error::{Error, Result};
pub use hub::BroadcastHub;
pub use logging::init_logging;
pub use mode::{ModeController, ModeHandle};
pub use sample::{Sample, Status};
pub use store::{SampleStore, StoreHandle, StoreWriter};
