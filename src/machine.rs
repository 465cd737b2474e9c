//! Per-context confirmation state machine.
//!
//! The single merge point for both confirmation sources: inbound signals
//! from the channel and direct oracle polls both feed [`observe`], and the
//! transition guard decides. No call site ever asks "am I already confirmed"
//! on its own — that is how double-fire bugs happen.
//!
//! [`observe`]: ConfirmationStateMachine::observe

use parking_lot::Mutex;

use crate::types::ConfirmationState;

type Callback = Box<dyn FnMut() + Send>;

/// Tracks one context's confirmation state and fires the "just confirmed"
/// callback exactly once per machine lifetime.
///
/// Monotonic: `Unconfirmed -> Confirmed` is the only transition; a stale
/// `Unconfirmed` observation after the terminal state is ignored. Any number
/// of duplicate or concurrent `Confirmed` observations, from either source,
/// fire the callback once.
///
/// The callback lives in a swappable slot: the host can keep handing in its
/// latest closure on every re-render without re-subscribing anything. The
/// callback must not itself call back into this machine.
pub struct ConfirmationStateMachine {
    state: Mutex<ConfirmationState>,
    callback: Mutex<Option<Callback>>,
}

impl ConfirmationStateMachine {
    /// A machine in `Unconfirmed` with no callback installed.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConfirmationState::Unconfirmed),
            callback: Mutex::new(None),
        }
    }

    /// A machine with a callback already installed.
    pub fn with_callback(callback: impl FnMut() + Send + 'static) -> Self {
        let machine = Self::new();
        machine.set_on_confirmed(callback);
        machine
    }

    /// Install or replace the "just confirmed" callback.
    ///
    /// Replacing the callback after the transition already fired does not
    /// fire the new one — the transition is consumed.
    pub fn set_on_confirmed(&self, callback: impl FnMut() + Send + 'static) {
        *self.callback.lock() = Some(Box::new(callback));
    }

    /// Feed one observation from either source.
    ///
    /// Returns `true` when this observation caused the transition (and the
    /// callback fired), `false` otherwise.
    pub fn observe(&self, input: ConfirmationState) -> bool {
        let transitioned = {
            let mut state = self.state.lock();
            match (*state, input) {
                (ConfirmationState::Unconfirmed, ConfirmationState::Confirmed) => {
                    *state = ConfirmationState::Confirmed;
                    true
                }
                (ConfirmationState::Confirmed, ConfirmationState::Unconfirmed) => {
                    // Stale or late poll result; terminal state never reverts.
                    tracing::debug!("ignoring unconfirmed observation after terminal state");
                    false
                }
                _ => false,
            }
        };

        if transitioned {
            if let Some(callback) = self.callback.lock().as_mut() {
                callback();
            }
        }
        transitioned
    }

    /// Current state.
    pub fn state(&self) -> ConfirmationState {
        *self.state.lock()
    }

    /// Whether the terminal state was reached.
    pub fn is_confirmed(&self) -> bool {
        self.state().is_confirmed()
    }
}

impl Default for ConfirmationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_machine() -> (Arc<ConfirmationStateMachine>, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let machine = Arc::new(ConfirmationStateMachine::with_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (machine, fired)
    }

    #[test]
    fn test_fires_exactly_once_on_duplicates() {
        let (machine, fired) = counting_machine();

        assert!(machine.observe(ConfirmationState::Confirmed));
        assert!(!machine.observe(ConfirmationState::Confirmed));
        assert!(!machine.observe(ConfirmationState::Confirmed));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unconfirmed_observations_do_nothing() {
        let (machine, fired) = counting_machine();

        assert!(!machine.observe(ConfirmationState::Unconfirmed));
        assert_eq!(machine.state(), ConfirmationState::Unconfirmed);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_monotonic_never_reverts() {
        let (machine, fired) = counting_machine();

        machine.observe(ConfirmationState::Confirmed);
        // A stale/late poll result arrives after the transition.
        assert!(!machine.observe(ConfirmationState::Unconfirmed));

        assert!(machine.is_confirmed());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_swap_does_not_refire() {
        let (machine, fired) = counting_machine();
        machine.observe(ConfirmationState::Confirmed);

        let late = Arc::new(AtomicUsize::new(0));
        let late_counter = Arc::clone(&late);
        machine.set_on_confirmed(move || {
            late_counter.fetch_add(1, Ordering::SeqCst);
        });
        machine.observe(ConfirmationState::Confirmed);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(late.load(Ordering::SeqCst), 0, "consumed transition must not refire");
    }

    #[test]
    fn test_concurrent_observations_fire_once() {
        let (machine, fired) = counting_machine();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let machine = Arc::clone(&machine);
                std::thread::spawn(move || {
                    machine.observe(ConfirmationState::Confirmed);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    proptest! {
        /// For any interleaving of confirmed/unconfirmed observations, the
        /// callback fires exactly once iff at least one was confirmed, and
        /// the final state is monotonic.
        #[test]
        fn prop_exactly_once(observations in proptest::collection::vec(any::<bool>(), 0..32)) {
            let (machine, fired) = counting_machine();

            for confirmed in &observations {
                let input = if *confirmed {
                    ConfirmationState::Confirmed
                } else {
                    ConfirmationState::Unconfirmed
                };
                machine.observe(input);
            }

            let any_confirmed = observations.iter().any(|c| *c);
            prop_assert_eq!(fired.load(Ordering::SeqCst), usize::from(any_confirmed));
            prop_assert_eq!(machine.is_confirmed(), any_confirmed);
        }
    }
}
