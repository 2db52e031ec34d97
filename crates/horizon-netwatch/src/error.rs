//! Error types for the change notification engine.

use thiserror::Error;

use crate::interface::AddressFamily;

/// Errors surfaced by watch registration and stable-address waits.
///
/// All variants are cloneable so a failure observed while re-arming a watch
/// can be handed to every subscriber of the owning hub.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The host has no support for the requested address family.
    ///
    /// Hubs treat this as a degraded configuration rather than a failure:
    /// the family is skipped and the remaining families stay watched.
    #[error("address family {0} is not supported on this host")]
    UnsupportedFamily(AddressFamily),

    /// The operating system rejected a change notification request.
    #[error("native change notification request failed: {0}")]
    NativeRequest(String),

    /// The notification channel was cancelled before the request was issued.
    #[error("change notification channel is closed")]
    WatchClosed,

    /// The dispatch worker pool could not be created or used.
    #[error("dispatch pool error: {0}")]
    Dispatch(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WatchError>;
