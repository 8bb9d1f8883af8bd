//! # songid Common Library
//!
//! Shared code for the songid crates:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Tracing initialization
//! - Song identification types
//! - Event types (SongIdEvent) and the EventBus
//! - Clock abstraction

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod song;
pub mod time;

pub use error::{Error, Result};
pub use song::{MatchSource, SongIdentification};
