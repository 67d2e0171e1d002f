//! # vcover Common Library
//!
//! Shared code for the vcover cover bot including:
//! - Error types
//! - TOML configuration model and persistence
//! - Event types (BotEvent enum) and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use config::{BackendKind, BotConfig, ConfigStore};
pub use error::{Error, Result};
