//! Adapter lifecycle state machine
//!
//! The lifecycle gate owns the adapter state and the count of in-flight
//! dispatches. Dispatch admission checks the state and increments the count
//! under the same mutex, so once deactivation begins no new request is
//! admitted. Every state change and every completed dispatch notifies the
//! condition variable the blocking waits sleep on.

use crate::error::{AdapterError, DispatchError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// State of an object adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterState {
    Created,
    Activating,
    Active,
    Holding,
    Deactivating,
    Deactivated,
    Destroyed,
}

impl AdapterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Holding => "holding",
            Self::Deactivating => "deactivating",
            Self::Deactivated => "deactivated",
            Self::Destroyed => "destroyed",
        }
    }

    /// Check whether deactivation has begun
    pub fn is_shutting_down(&self) -> bool {
        *self >= Self::Deactivating
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `begin_activate` decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The adapter was already active
    AlreadyActive,
    /// A held adapter that had been activated before became active again
    Resumed,
    /// First activation: the caller must finish it with `finish_activate`
    First,
}

struct Gate {
    state: AdapterState,
    /// State to roll back to when a first activation fails
    before_activation: AdapterState,
    activated: bool,
    destroying: bool,
    in_flight: usize,
}

/// State, in-flight counter and the condition variable guarding both
pub struct Lifecycle {
    adapter: String,
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl Lifecycle {
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            gate: Mutex::new(Gate {
                state: AdapterState::Created,
                before_activation: AdapterState::Created,
                activated: false,
                destroying: false,
                in_flight: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> AdapterState {
        self.gate.lock().state
    }

    /// Number of dispatches currently admitted
    pub fn in_flight(&self) -> usize {
        self.gate.lock().in_flight
    }

    /// Check whether a first activation ever succeeded
    pub fn has_activated(&self) -> bool {
        self.gate.lock().activated
    }

    fn deactivated(&self) -> AdapterError {
        AdapterError::Deactivated(self.adapter.clone())
    }

    /// Lock the gate once no first activation is in progress
    fn settled(&self) -> MutexGuard<'_, Gate> {
        let mut gate = self.gate.lock();
        while gate.state == AdapterState::Activating {
            self.changed.wait(&mut gate);
        }
        gate
    }

    fn transition(&self, gate: &mut Gate, to: AdapterState) {
        debug!(adapter = %self.adapter, from = %gate.state, to = %to, "Adapter state change");
        gate.state = to;
        self.changed.notify_all();
    }

    /// Start an activation
    pub fn begin_activate(&self) -> Result<Activation> {
        let mut gate = self.settled();
        match gate.state {
            AdapterState::Active => Ok(Activation::AlreadyActive),
            AdapterState::Holding if gate.activated => {
                self.transition(&mut gate, AdapterState::Active);
                Ok(Activation::Resumed)
            }
            AdapterState::Created | AdapterState::Holding => {
                gate.before_activation = gate.state;
                self.transition(&mut gate, AdapterState::Activating);
                Ok(Activation::First)
            }
            _ => Err(self.deactivated()),
        }
    }

    /// Complete a first activation; on failure the previous state is restored
    pub fn finish_activate(&self, succeeded: bool) {
        let mut gate = self.gate.lock();
        if succeeded {
            gate.activated = true;
            self.transition(&mut gate, AdapterState::Active);
        } else {
            let previous = gate.before_activation;
            self.transition(&mut gate, previous);
        }
    }

    /// Stop admitting new dispatches
    ///
    /// Dispatches already admitted keep running. Holding a held or freshly
    /// created adapter is allowed.
    pub fn hold(&self) -> Result<()> {
        let mut gate = self.settled();
        match gate.state {
            AdapterState::Holding => Ok(()),
            AdapterState::Created | AdapterState::Active => {
                self.transition(&mut gate, AdapterState::Holding);
                Ok(())
            }
            _ => Err(self.deactivated()),
        }
    }

    /// Block until the adapter is not active and no dispatch is in flight
    pub fn wait_for_hold(&self) {
        let mut gate = self.gate.lock();
        while matches!(gate.state, AdapterState::Active | AdapterState::Activating)
            || gate.in_flight > 0
        {
            self.changed.wait(&mut gate);
        }
    }

    /// Start a deactivation
    ///
    /// Returns `false` when another caller already deactivated the adapter;
    /// if that deactivation is still in progress this waits for it.
    pub fn begin_deactivate(&self) -> bool {
        let mut gate = self.settled();
        if gate.state.is_shutting_down() {
            while gate.state == AdapterState::Deactivating {
                self.changed.wait(&mut gate);
            }
            return false;
        }

        self.transition(&mut gate, AdapterState::Deactivating);
        true
    }

    pub fn finish_deactivate(&self) {
        let mut gate = self.gate.lock();
        self.transition(&mut gate, AdapterState::Deactivated);
    }

    /// Block until the adapter is deactivated and no dispatch is in flight
    pub fn wait_for_deactivate(&self) {
        let mut gate = self.gate.lock();
        while gate.state < AdapterState::Deactivated || gate.in_flight > 0 {
            self.changed.wait(&mut gate);
        }
    }

    /// Check whether deactivation has completed
    pub fn is_deactivated(&self) -> bool {
        self.gate.lock().state >= AdapterState::Deactivated
    }

    /// Claim the destruction of the adapter
    ///
    /// Only the first caller gets `true`; later callers wait until the
    /// adapter is destroyed and get `false`.
    pub fn begin_destroy(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.destroying {
            while gate.state != AdapterState::Destroyed {
                self.changed.wait(&mut gate);
            }
            return false;
        }
        gate.destroying = true;
        true
    }

    pub fn finish_destroy(&self) {
        let mut gate = self.gate.lock();
        self.transition(&mut gate, AdapterState::Destroyed);
    }

    /// Fail once deactivation has begun
    pub fn check_not_deactivated(&self) -> Result<()> {
        if self.gate.lock().state.is_shutting_down() {
            return Err(self.deactivated());
        }
        Ok(())
    }

    /// Admit one dispatch
    ///
    /// Blocks while the adapter is created, activating or holding; fails once
    /// deactivation has begun. The returned guard keeps the dispatch counted
    /// until it is dropped.
    pub fn admit(&self) -> std::result::Result<DispatchGuard<'_>, DispatchError> {
        let mut gate = self.gate.lock();
        loop {
            match gate.state {
                AdapterState::Active => break,
                AdapterState::Created | AdapterState::Activating | AdapterState::Holding => {
                    self.changed.wait(&mut gate);
                }
                _ => return Err(DispatchError::Deactivated(self.adapter.clone())),
            }
        }
        gate.in_flight += 1;
        Ok(DispatchGuard { lifecycle: self })
    }
}

/// Marks one admitted dispatch; releases it on drop
pub struct DispatchGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let mut gate = self.lifecycle.gate.lock();
        gate.in_flight -= 1;
        if gate.in_flight == 0 {
            self.lifecycle.changed.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn active() -> Lifecycle {
        let lifecycle = Lifecycle::new("Test");
        assert_eq!(lifecycle.begin_activate().unwrap(), Activation::First);
        lifecycle.finish_activate(true);
        lifecycle
    }

    #[test]
    fn test_activate_hold_resume() {
        let lifecycle = active();
        assert_eq!(lifecycle.state(), AdapterState::Active);
        assert!(lifecycle.has_activated());
        assert_eq!(lifecycle.begin_activate().unwrap(), Activation::AlreadyActive);

        lifecycle.hold().unwrap();
        lifecycle.hold().unwrap();
        assert_eq!(lifecycle.state(), AdapterState::Holding);
        lifecycle.wait_for_hold();

        assert_eq!(lifecycle.begin_activate().unwrap(), Activation::Resumed);
        assert_eq!(lifecycle.state(), AdapterState::Active);
    }

    #[test]
    fn test_failed_activation_rolls_back() {
        let lifecycle = Lifecycle::new("Test");
        assert_eq!(lifecycle.begin_activate().unwrap(), Activation::First);
        lifecycle.finish_activate(false);
        assert_eq!(lifecycle.state(), AdapterState::Created);
        assert!(!lifecycle.has_activated());
        assert_eq!(lifecycle.begin_activate().unwrap(), Activation::First);
    }

    #[test]
    fn test_hold_before_first_activation() {
        let lifecycle = Lifecycle::new("Test");
        lifecycle.hold().unwrap();
        lifecycle.wait_for_hold();
        assert_eq!(lifecycle.begin_activate().unwrap(), Activation::First);
        lifecycle.finish_activate(false);
        assert_eq!(lifecycle.state(), AdapterState::Holding);
    }

    #[test]
    fn test_deactivate_is_one_way() {
        let lifecycle = active();
        assert!(lifecycle.begin_deactivate());
        assert!(lifecycle.check_not_deactivated().is_err());
        assert!(!lifecycle.is_deactivated());
        lifecycle.finish_deactivate();
        assert!(lifecycle.is_deactivated());

        assert!(!lifecycle.begin_deactivate());
        assert!(matches!(
            lifecycle.begin_activate(),
            Err(AdapterError::Deactivated(_))
        ));
        assert!(lifecycle.hold().is_err());
        assert!(matches!(
            lifecycle.admit(),
            Err(DispatchError::Deactivated(_))
        ));
        lifecycle.wait_for_deactivate();
    }

    #[test]
    fn test_destroy_claimed_once() {
        let lifecycle = active();
        assert!(lifecycle.begin_deactivate());
        lifecycle.finish_deactivate();
        assert!(lifecycle.begin_destroy());
        lifecycle.finish_destroy();
        assert!(!lifecycle.begin_destroy());
        assert_eq!(lifecycle.state(), AdapterState::Destroyed);
    }

    #[test]
    fn test_admission_counts_in_flight() {
        let lifecycle = active();
        let guard = lifecycle.admit().unwrap();
        assert_eq!(lifecycle.in_flight(), 1);
        drop(guard);
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[test]
    fn test_admission_waits_while_holding() {
        let lifecycle = Arc::new(active());
        lifecycle.hold().unwrap();

        let worker = {
            let lifecycle = lifecycle.clone();
            thread::spawn(move || lifecycle.admit().map(|_| ()).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(lifecycle.in_flight(), 0);
        assert_eq!(lifecycle.begin_activate().unwrap(), Activation::Resumed);
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_deactivate_wakes_waiting_admission() {
        let lifecycle = Arc::new(active());
        lifecycle.hold().unwrap();

        let worker = {
            let lifecycle = lifecycle.clone();
            thread::spawn(move || lifecycle.admit().map(|_| ()).is_err())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(lifecycle.begin_deactivate());
        lifecycle.finish_deactivate();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_wait_for_deactivate_waits_for_in_flight() {
        let lifecycle = Arc::new(active());
        let (tx, rx) = std::sync::mpsc::channel();

        let worker = {
            let lifecycle = lifecycle.clone();
            thread::spawn(move || {
                let _guard = lifecycle.admit().unwrap();
                tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
            })
        };

        rx.recv().unwrap();
        assert!(lifecycle.begin_deactivate());
        lifecycle.finish_deactivate();
        lifecycle.wait_for_deactivate();
        assert_eq!(lifecycle.in_flight(), 0);
        worker.join().unwrap();
    }
}
