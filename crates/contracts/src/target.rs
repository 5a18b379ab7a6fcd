//! Target trait - Dispatcher output interface
//!
//! Defines the abstract interface for log targets.

use crate::{ContractError, LogRecord};

/// Log target trait
///
/// All target implementations must implement this trait. A target decides on
/// its own whether internal failures are swallowed (best-effort targets) or
/// returned so the dispatcher can suspend it.
#[trait_variant::make(Target: Send)]
pub trait LocalTarget {
    /// Target name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Handle one record
    ///
    /// # Errors
    /// Returns a write error when the target wants to be suspended
    async fn log(&mut self, record: &LogRecord) -> Result<(), ContractError>;

    /// Release held resources. Must be idempotent.
    async fn stop(&mut self) -> Result<(), ContractError>;
}
