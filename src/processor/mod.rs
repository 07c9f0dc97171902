//! External processors: the slow, fallible operation applied to each unit.
//!
//! Two implementations are provided:
//!
//! - [`GeneratorTool`]: runs the map generator binary once per `.mwm` file
//! - [`WayIdClient`]: asks a routing server for the way ids joining two towns
//!
//! A processor returns the raw result identifiers for a unit; the worker
//! files them into categories using the unit's own role.

pub mod generator;
pub mod way_ids;

use async_trait::async_trait;
use thiserror::Error;

pub use generator::{DesignerLaunch, GeneratorTool};
pub use way_ids::{WayIdClient, WayIdsResponse, DEFAULT_REQUEST_TIMEOUT_SECS};

/// Errors a processor call can return.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// The external dependency could not be reached at all (missing binary,
    /// refused connection). Aborts a run when seen by the preflight probe.
    #[error("dependency unreachable: {0}")]
    Unreachable(String),

    /// The dependency was reached but the call failed.
    #[error("{0}")]
    Failed(String),

    /// The response could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The call did not finish within the configured bound.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ProcessorError {
    /// Returns whether this error means the dependency itself is unavailable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// The operation that turns one work unit into result identifiers.
///
/// Implementations must be safe to call concurrently from every worker.
#[async_trait]
pub trait ExternalProcessor<U>: Send + Sync {
    /// Processes one unit, returning the identifiers it produced.
    async fn process(&self, unit: &U) -> Result<Vec<String>, ProcessorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_is_unreachable() {
        assert!(ProcessorError::Unreachable("refused".into()).is_unreachable());
        assert!(!ProcessorError::Failed("exit 1".into()).is_unreachable());
        assert!(!ProcessorError::Timeout(Duration::from_secs(1)).is_unreachable());
    }

    #[test]
    fn test_processor_error_display() {
        let err = ProcessorError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().contains("30"));

        let err = ProcessorError::Decode("missing field `way_ids`".into());
        assert!(err.to_string().contains("way_ids"));
    }
}
