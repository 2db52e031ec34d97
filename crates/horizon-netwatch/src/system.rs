//! System-backed change and stability sources.
//!
//! [`SystemChangeSource`] adapts the platform's interface watcher to the
//! per-family one-shot channel contract. The watcher pushes full interface
//! snapshots; each channel projects them down to the address set of its own
//! family and fires only when that set actually differs from the last one it
//! saw. Triggers are handed to the dispatch pool so subscriber code never
//! runs on the watcher's own thread.
//!
//! [`SystemStableSource`] implements stability as quiescence: the address
//! table is declared stable once no change has been observed for a settle
//! window, with a hard cap so a flapping link cannot block a waiter forever.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{Result, WatchError};
use crate::interface::AddressFamily;
use crate::pool::DispatchPool;
use crate::source::{ChangeChannel, ChangeSource, FireTrigger, StableSource};
use crate::stable::StableWaitConfig;

/// Change source backed by the operating system's interface watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemChangeSource;

impl SystemChangeSource {
    pub fn new() -> Self {
        Self
    }
}

impl ChangeSource for SystemChangeSource {
    fn open(&self, family: AddressFamily) -> Result<Box<dyn ChangeChannel>> {
        if !family_supported(family) {
            return Err(WatchError::UnsupportedFamily(family));
        }
        Ok(Box::new(SystemChangeChannel::new(family)))
    }
}

/// Probes family support the same way socket creation would discover it.
fn family_supported(family: AddressFamily) -> bool {
    let domain = match family {
        AddressFamily::V4 => socket2::Domain::IPV4,
        AddressFamily::V6 => socket2::Domain::IPV6,
    };
    match socket2::Socket::new(domain, socket2::Type::DGRAM, None) {
        Ok(_socket) => true,
        Err(err) => {
            tracing::debug!(
                target: "horizon_netwatch::system",
                family = %family,
                error = %err,
                "address family probe failed"
            );
            false
        }
    }
}

struct ChannelState {
    /// The one-shot trigger for the next relevant change, if armed.
    pending: Option<FireTrigger>,
    /// Address set seen at the last callback. `None` until the watcher's
    /// initial snapshot arrives; that snapshot never fires.
    baseline: Option<BTreeSet<IpAddr>>,
    closed: bool,
}

struct ChannelShared {
    state: Mutex<ChannelState>,
}

impl ChannelShared {
    /// Watcher callback body: refresh the family's baseline and take the
    /// pending trigger when the projected address set moved.
    fn observe(self: &Arc<Self>, family: AddressFamily, addresses: BTreeSet<IpAddr>) {
        let fired = {
            let mut state = self.state.lock();
            match &state.baseline {
                None => {
                    state.baseline = Some(addresses);
                    None
                }
                Some(previous) if *previous == addresses => None,
                _ => {
                    state.baseline = Some(addresses);
                    state.pending.take()
                }
            }
        };

        if let Some(trigger) = fired {
            tracing::trace!(
                target: "horizon_netwatch::system",
                family = %family,
                "address set changed; dispatching trigger"
            );
            DispatchPool::global().spawn(trigger);
        }
    }
}

/// One family's live notification channel.
struct SystemChangeChannel {
    family: AddressFamily,
    shared: Arc<ChannelShared>,
    /// Started lazily on the first request; drop stops the watcher.
    watch: Option<netwatcher::WatchHandle>,
}

impl SystemChangeChannel {
    fn new(family: AddressFamily) -> Self {
        Self {
            family,
            shared: Arc::new(ChannelShared {
                state: Mutex::new(ChannelState {
                    pending: None,
                    baseline: None,
                    closed: false,
                }),
            }),
            watch: None,
        }
    }

    fn ensure_watching(&mut self) -> Result<()> {
        if self.watch.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let family = self.family;
        let handle = netwatcher::watch_interfaces(move |update| {
            let addresses: BTreeSet<IpAddr> = update
                .interfaces
                .values()
                .flat_map(|iface| iface.ips.iter().copied())
                .filter(|ip| family.matches(ip))
                .collect();
            shared.observe(family, addresses);
        })
        .map_err(|e| WatchError::NativeRequest(e.to_string()))?;

        self.watch = Some(handle);
        tracing::debug!(
            target: "horizon_netwatch::system",
            family = %self.family,
            "system interface watcher started"
        );
        Ok(())
    }
}

impl ChangeChannel for SystemChangeChannel {
    fn request(&mut self, trigger: FireTrigger) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(WatchError::WatchClosed);
            }
            // Stored before the watcher starts so a change racing the start
            // cannot slip between registration and arming.
            state.pending = Some(trigger);
        }

        if let Err(err) = self.ensure_watching() {
            self.shared.state.lock().pending = None;
            return Err(err);
        }
        Ok(())
    }

    fn cancel(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.pending = None;
        }
        // Dropped outside the lock: stopping the watcher may join a thread
        // that is blocked in observe() on that same lock.
        self.watch = None;
        tracing::debug!(
            target: "horizon_netwatch::system",
            family = %self.family,
            "system interface watcher stopped"
        );
    }
}

/// Stability source that waits for the address table to go quiet.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStableSource {
    config: StableWaitConfig,
}

impl SystemStableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StableWaitConfig) -> Self {
        Self { config }
    }
}

impl StableSource for SystemStableSource {
    fn begin(&self, on_ready: Box<dyn FnOnce() + Send>) -> Result<()> {
        let (changes_tx, changes_rx) = crossbeam_channel::unbounded::<()>();

        let watch = netwatcher::watch_interfaces(move |_update| {
            let _ = changes_tx.send(());
        })
        .map_err(|e| WatchError::NativeRequest(e.to_string()))?;

        let settle = self.config.settle_window_duration();
        let deadline = Instant::now() + self.config.max_wait_duration();

        thread::Builder::new()
            .name("netwatch-stable".to_string())
            .spawn(move || {
                // Keeps the watcher alive for the whole observation.
                let watch = watch;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::debug!(
                            target: "horizon_netwatch::system",
                            "address table still moving at max wait; declaring stable as-is"
                        );
                        break;
                    }
                    let window = settle.min(deadline - now);
                    match changes_rx.recv_timeout(window) {
                        // Something moved (or the initial snapshot arrived);
                        // the settle window restarts.
                        Ok(()) => continue,
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => break,
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
                drop(watch);
                on_ready();
            })
            .map_err(|e| WatchError::Dispatch(e.to_string()))?;

        Ok(())
    }
}
