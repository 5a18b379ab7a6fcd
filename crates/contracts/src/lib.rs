//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the log hub.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Record model
//! - A `LogRecord` is the unit of work fanned out to targets
//! - Levels are plain strings resolved through `LevelConfig`; ranks are only
//!   compared through `LevelConfig::admits`

mod config;
mod error;
mod level;
mod record;
mod target;

pub use config::*;
pub use error::*;
pub use level::*;
pub use record::*;
pub use target::*;
