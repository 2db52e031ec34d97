//! Driver traits between the hubs and the platform.
//!
//! Everything OS-specific sits behind these three traits. The engine ships a
//! system-backed implementation in [`system`](crate::system); tests drive the
//! hubs with scripted sources instead, which keeps every notification path
//! deterministic.

use crate::error::Result;
use crate::interface::AddressFamily;

/// A one-shot notification trigger.
///
/// A channel invokes the trigger at most once, on any thread, when the next
/// change for its family is observed.
pub type FireTrigger = Box<dyn FnOnce() + Send>;

/// Factory for per-family change notification channels.
pub trait ChangeSource: Send + Sync {
    /// Opens a notification channel for `family`.
    ///
    /// Returns [`WatchError::UnsupportedFamily`] when the host cannot watch
    /// this family at all; hubs degrade to the remaining families in that
    /// case rather than failing the subscribe.
    ///
    /// [`WatchError::UnsupportedFamily`]: crate::WatchError::UnsupportedFamily
    fn open(&self, family: AddressFamily) -> Result<Box<dyn ChangeChannel>>;
}

/// A single family's notification channel.
///
/// A channel holds at most one pending trigger. Issuing a new request before
/// the previous trigger fired replaces it; the replaced trigger never runs.
pub trait ChangeChannel: Send {
    /// Registers `trigger` to be invoked on the next observed change.
    ///
    /// A failed request leaves the channel with no pending trigger.
    fn request(&mut self, trigger: FireTrigger) -> Result<()>;

    /// Drops any pending trigger and releases the underlying OS resources.
    ///
    /// After `cancel` returns the channel takes no new trigger, but one that
    /// was already handed to a dispatch thread may still run. The hard
    /// no-fire-after-teardown guarantee is provided one layer up: the hubs
    /// retire a one-shot gate before cancelling the channel, and the gate
    /// absorbs any straggler.
    fn cancel(&mut self);
}

/// Starter for stable-address-table registrations.
pub trait StableSource: Send + Sync {
    /// Registers `on_ready` to run once the host's address table is stable.
    ///
    /// The callback is invoked exactly once, either synchronously from
    /// `begin` when the table is already stable or later from a worker
    /// thread. There is no cancellation: a successful `begin` always leads
    /// to the callback.
    fn begin(&self, on_ready: Box<dyn FnOnce() + Send>) -> Result<()>;
}
