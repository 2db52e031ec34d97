//! Scripted sources and providers shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use horizon_netwatch::{
    AddressFamily, ChangeChannel, ChangeHandler, ChangeSource, FireTrigger, InterfaceAddress,
    InterfaceProvider, NetworkInterface, Result, StableSource, WatchError,
};

/// Installs a fmt subscriber honoring `RUST_LOG` for the test binary.
///
/// Call at the top of a test to see the engine's tracing output while
/// debugging it. Only the first call in a process installs; the rest are
/// no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct FamilyState {
    pending: Option<FireTrigger>,
    requests: usize,
    cancels: usize,
    opens: usize,
    closed: bool,
    fail_next_request: bool,
}

/// A change source the test script drives by hand.
///
/// Triggers are invoked synchronously from [`fire`](MockChangeSource::fire),
/// so a test observes the complete firing (re-arm plus fan-out) before the
/// call returns.
#[derive(Clone)]
pub struct MockChangeSource {
    families: Arc<Mutex<HashMap<AddressFamily, FamilyState>>>,
    unsupported: Vec<AddressFamily>,
}

impl MockChangeSource {
    pub fn new() -> Self {
        Self {
            families: Arc::new(Mutex::new(HashMap::new())),
            unsupported: Vec::new(),
        }
    }

    /// A source that reports the given families as unsupported.
    pub fn with_unsupported(unsupported: &[AddressFamily]) -> Self {
        Self {
            families: Arc::new(Mutex::new(HashMap::new())),
            unsupported: unsupported.to_vec(),
        }
    }

    /// Simulates a native change: takes the pending trigger for `family`
    /// and runs it on the calling thread.
    ///
    /// Returns false when no trigger was armed, which is itself something
    /// tests assert on.
    pub fn fire(&self, family: AddressFamily) -> bool {
        // The trigger must run outside the lock: it re-enters this source
        // through the hub's re-arm request.
        let trigger = self
            .families
            .lock()
            .entry(family)
            .or_default()
            .pending
            .take();
        match trigger {
            Some(trigger) => {
                trigger();
                true
            }
            None => false,
        }
    }

    /// Steals the pending trigger without running it, so a test can replay
    /// it later as a straggler.
    pub fn take_trigger(&self, family: AddressFamily) -> Option<FireTrigger> {
        self.families.lock().entry(family).or_default().pending.take()
    }

    /// Arranges for the next request on `family` to fail.
    pub fn fail_next_request(&self, family: AddressFamily) {
        self.families
            .lock()
            .entry(family)
            .or_default()
            .fail_next_request = true;
    }

    pub fn has_pending(&self, family: AddressFamily) -> bool {
        self.families
            .lock()
            .entry(family)
            .or_default()
            .pending
            .is_some()
    }

    pub fn requests(&self, family: AddressFamily) -> usize {
        self.families.lock().entry(family).or_default().requests
    }

    pub fn cancels(&self, family: AddressFamily) -> usize {
        self.families.lock().entry(family).or_default().cancels
    }

    pub fn opens(&self, family: AddressFamily) -> usize {
        self.families.lock().entry(family).or_default().opens
    }
}

impl ChangeSource for MockChangeSource {
    fn open(&self, family: AddressFamily) -> Result<Box<dyn ChangeChannel>> {
        if self.unsupported.contains(&family) {
            return Err(WatchError::UnsupportedFamily(family));
        }
        {
            let mut families = self.families.lock();
            let state = families.entry(family).or_default();
            state.opens += 1;
            state.closed = false;
        }
        Ok(Box::new(MockChannel {
            family,
            families: Arc::clone(&self.families),
        }))
    }
}

struct MockChannel {
    family: AddressFamily,
    families: Arc<Mutex<HashMap<AddressFamily, FamilyState>>>,
}

impl ChangeChannel for MockChannel {
    fn request(&mut self, trigger: FireTrigger) -> Result<()> {
        let mut families = self.families.lock();
        let state = families.entry(self.family).or_default();
        if state.fail_next_request {
            state.fail_next_request = false;
            return Err(WatchError::NativeRequest("scripted failure".to_string()));
        }
        if state.closed {
            return Err(WatchError::WatchClosed);
        }
        state.requests += 1;
        state.pending = Some(trigger);
        Ok(())
    }

    fn cancel(&mut self) {
        let mut families = self.families.lock();
        let state = families.entry(self.family).or_default();
        state.cancels += 1;
        state.pending = None;
        state.closed = true;
    }
}

#[derive(Clone)]
enum StableMode {
    /// `begin` resolves before returning.
    Immediate,
    /// Registrations queue until the test releases them.
    Manual,
    /// Registrations resolve from a background thread after a delay.
    Delayed(Duration),
    /// `begin` itself fails.
    Fail,
}

/// A stability source with scripted resolution timing.
#[derive(Clone)]
pub struct MockStableSource {
    mode: StableMode,
    pending: Arc<Mutex<Vec<Box<dyn FnOnce() + Send>>>>,
}

impl MockStableSource {
    pub fn immediate() -> Self {
        Self::with_mode(StableMode::Immediate)
    }

    pub fn manual() -> Self {
        Self::with_mode(StableMode::Manual)
    }

    pub fn delayed(delay: Duration) -> Self {
        Self::with_mode(StableMode::Delayed(delay))
    }

    pub fn failing() -> Self {
        Self::with_mode(StableMode::Fail)
    }

    fn with_mode(mode: StableMode) -> Self {
        Self {
            mode,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Resolves every queued registration, returning how many there were.
    pub fn release_all(&self) -> usize {
        let drained: Vec<_> = std::mem::take(&mut *self.pending.lock());
        let count = drained.len();
        for on_ready in drained {
            on_ready();
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl StableSource for MockStableSource {
    fn begin(&self, on_ready: Box<dyn FnOnce() + Send>) -> Result<()> {
        match self.mode {
            StableMode::Immediate => {
                on_ready();
                Ok(())
            }
            StableMode::Manual => {
                self.pending.lock().push(on_ready);
                Ok(())
            }
            StableMode::Delayed(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    on_ready();
                });
                Ok(())
            }
            StableMode::Fail => Err(WatchError::NativeRequest(
                "stability registration refused".to_string(),
            )),
        }
    }
}

struct ProviderState {
    reachable: bool,
    interfaces: Vec<NetworkInterface>,
}

/// An interface provider whose answers the test script controls.
#[derive(Clone)]
pub struct MockProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockProvider {
    /// A provider with one up, addressed, non-loopback interface.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                reachable: true,
                interfaces: vec![NetworkInterface {
                    name: "eth0".to_string(),
                    index: 2,
                    is_up: true,
                    is_loopback: false,
                    addresses: vec![InterfaceAddress {
                        address: "10.0.0.5".parse().unwrap(),
                        prefix_len: 24,
                    }],
                }],
            })),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    pub fn set_interfaces(&self, interfaces: Vec<NetworkInterface>) {
        self.state.lock().interfaces = interfaces;
    }
}

impl InterfaceProvider for MockProvider {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        self.state.lock().interfaces.clone()
    }

    fn is_reachable(&self) -> bool {
        self.state.lock().reachable
    }
}

/// Records delivered events for later assertion.
pub struct EventLog<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone + Send + 'static> EventLog<E> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A handler that appends every delivered event to this log.
    pub fn handler(&self) -> ChangeHandler<E> {
        let events = Arc::clone(&self.events);
        ChangeHandler::new(move |event: &E| {
            events.lock().push(event.clone());
        })
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
