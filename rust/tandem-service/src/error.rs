use thiserror::Error;

/// A fatal misconfiguration of a service's start/stop strategy.
///
/// These are surfaced from `start`/`stop` before any state transition or
/// thread spawn takes place, so a failed call leaves the service exactly as
/// it was.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// Neither a handler nor a closure pair is configured.
    #[error("service has no start/stop strategy configured")]
    NotConfigured,

    /// Both a handler and a closure pair are configured where exactly one
    /// is required.
    #[error("service has both a handler and closures configured")]
    AmbiguousStrategy,

    /// The configured handler has been dropped and no fallback exists.
    #[error("service handler has been dropped")]
    HandlerDropped,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
