//! One-shot change watches.
//!
//! A [`ChangeWatch`] pairs a notification channel with a gate that enforces
//! the one-shot contract: each arm produces at most one observed firing, a
//! firing must be re-armed before the next one can be observed, and after
//! [`ChangeWatch::disarm`] returns no firing is ever observed again, even if
//! the underlying channel has a straggler trigger in flight.
//!
//! Firing is split into two phases. Phase one runs the gate's handler, which
//! is expected to take its owner's lock, snapshot subscribers, and re-arm;
//! it returns the fan-out work as a deferred closure. The gate marks itself
//! idle before running the deferred closure, so `disarm` only ever waits for
//! phase one. A subscriber that tears down its own hub from inside a
//! callback therefore cannot deadlock against the gate.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::Result;
use crate::interface::AddressFamily;
use crate::source::{ChangeChannel, FireTrigger};

/// Fan-out work produced by phase one of a firing.
pub(crate) type Deferred = Box<dyn FnOnce() + Send>;

/// Phase-one handler invoked when an armed watch fires.
///
/// Returns the deferred fan-out work, or `None` when the firing should be
/// dropped (owner gone, no subscribers).
pub(crate) type FireHandler = Box<dyn Fn() -> Option<Deferred> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatePhase {
    /// No request outstanding.
    Unarmed,
    /// A trigger for this generation is registered with the channel.
    Armed(u64),
    /// The generation fired; the owner has not re-armed yet.
    AwaitingRearm(u64),
    /// Torn down. Late triggers are absorbed silently.
    Retired,
}

struct GateCore {
    phase: GatePhase,
    /// Generations are never reused, even across a failed arm.
    next_generation: u64,
    /// True while phase one of a firing is executing.
    in_flight: bool,
}

enum ArmDecision {
    Request(u64),
    AlreadyArmed,
    Retired,
}

/// Serializes firings against arming and teardown.
struct FireGate {
    family: AddressFamily,
    core: Mutex<GateCore>,
    idle: Condvar,
    handler: FireHandler,
}

impl FireGate {
    fn new(family: AddressFamily, handler: FireHandler) -> Self {
        Self {
            family,
            core: Mutex::new(GateCore {
                phase: GatePhase::Unarmed,
                next_generation: 1,
                in_flight: false,
            }),
            idle: Condvar::new(),
            handler,
        }
    }

    /// Entry point for channel triggers.
    fn fire(&self, generation: u64) {
        {
            let mut core = self.core.lock();
            match core.phase {
                GatePhase::Retired => {
                    tracing::trace!(
                        target: "horizon_netwatch::watch",
                        family = %self.family,
                        generation,
                        "late trigger absorbed after teardown"
                    );
                    return;
                }
                GatePhase::Armed(armed) if armed == generation => {
                    core.phase = GatePhase::AwaitingRearm(generation);
                    core.in_flight = true;
                }
                phase => {
                    panic!(
                        "change watch for {} fired twice for generation {generation} \
                         (phase {phase:?}); the notification source broke the one-shot contract",
                        self.family
                    );
                }
            }
        }

        // Phase one runs without the gate lock so the handler can take its
        // owner's lock and call back into arm().
        let deferred = (self.handler)();

        {
            let mut core = self.core.lock();
            core.in_flight = false;
            self.idle.notify_all();
        }

        if let Some(work) = deferred {
            work();
        }
    }

    fn advance(&self) -> ArmDecision {
        let mut core = self.core.lock();
        match core.phase {
            GatePhase::Unarmed | GatePhase::AwaitingRearm(_) => {
                let generation = core.next_generation;
                core.next_generation += 1;
                core.phase = GatePhase::Armed(generation);
                ArmDecision::Request(generation)
            }
            GatePhase::Armed(_) => ArmDecision::AlreadyArmed,
            GatePhase::Retired => ArmDecision::Retired,
        }
    }

    /// Undoes an [`advance`](Self::advance) whose channel request failed.
    fn rollback_arm(&self, generation: u64) {
        let mut core = self.core.lock();
        if core.phase == GatePhase::Armed(generation) {
            core.phase = GatePhase::Unarmed;
        }
    }

    /// Retires the gate and waits out any phase-one execution in progress.
    fn retire(&self) {
        let mut core = self.core.lock();
        core.phase = GatePhase::Retired;
        while core.in_flight {
            self.idle.wait(&mut core);
        }
    }

    fn is_armed(&self) -> bool {
        matches!(self.core.lock().phase, GatePhase::Armed(_))
    }
}

/// A re-armable one-shot watch over a single address family.
pub(crate) struct ChangeWatch {
    family: AddressFamily,
    channel: Box<dyn ChangeChannel>,
    gate: Arc<FireGate>,
}

impl ChangeWatch {
    pub(crate) fn new(
        family: AddressFamily,
        channel: Box<dyn ChangeChannel>,
        handler: FireHandler,
    ) -> Self {
        Self {
            family,
            channel,
            gate: Arc::new(FireGate::new(family, handler)),
        }
    }

    pub(crate) fn family(&self) -> AddressFamily {
        self.family
    }

    /// Arms the watch: registers a fresh one-shot trigger with the channel.
    ///
    /// Arming an already-armed or retired watch is a no-op. On request
    /// failure the gate rolls back and the watch is left disarmed.
    pub(crate) fn arm(&mut self) -> Result<()> {
        let generation = match self.gate.advance() {
            ArmDecision::Request(generation) => generation,
            ArmDecision::AlreadyArmed | ArmDecision::Retired => return Ok(()),
        };

        let gate = Arc::clone(&self.gate);
        let trigger: FireTrigger = Box::new(move || gate.fire(generation));

        match self.channel.request(trigger) {
            Ok(()) => {
                tracing::trace!(
                    target: "horizon_netwatch::watch",
                    family = %self.family,
                    generation,
                    "watch armed"
                );
                Ok(())
            }
            Err(err) => {
                self.gate.rollback_arm(generation);
                tracing::warn!(
                    target: "horizon_netwatch::watch",
                    family = %self.family,
                    error = %err,
                    "failed to arm change watch"
                );
                Err(err)
            }
        }
    }

    /// Permanently tears the watch down.
    ///
    /// Blocks until any in-progress phase-one firing has completed, then
    /// cancels the channel. Once `disarm` returns, no firing for this watch
    /// will be observed again. Idempotent.
    pub(crate) fn disarm(&mut self) {
        self.gate.retire();
        self.channel.cancel();
        tracing::trace!(
            target: "horizon_netwatch::watch",
            family = %self.family,
            "watch disarmed"
        );
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.gate.is_armed()
    }
}

impl Drop for ChangeWatch {
    fn drop(&mut self) {
        self.disarm();
    }
}
