//! Origin-tab listener.
//!
//! Runs only while a "waiting for confirmation" UI is active. Two inputs
//! feed the same state-machine guard: inbound signals from the channel and a
//! fixed-interval oracle poll. The poll is the backstop for every way the
//! channel can fail — the primitive being unsupported, nobody listening at
//! publish time, a dropped notification. Everything stops the moment the
//! terminal state is reached or the handle is dropped.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::SignalChannel;
use crate::config::RelayConfig;
use crate::machine::ConfirmationStateMachine;
use crate::session::SessionOracle;
use crate::types::ConfirmationState;

/// Origin-side listener: channel subscription plus poll backstop.
pub struct OriginTabListener {
    oracle: Arc<dyn SessionOracle>,
    channel: Arc<dyn SignalChannel>,
    machine: Arc<ConfirmationStateMachine>,
    config: RelayConfig,
}

impl OriginTabListener {
    /// Create a listener over the given collaborators.
    pub fn new(
        oracle: Arc<dyn SessionOracle>,
        channel: Arc<dyn SignalChannel>,
        machine: Arc<ConfirmationStateMachine>,
        config: RelayConfig,
    ) -> Self {
        Self {
            oracle,
            channel,
            machine,
            config,
        }
    }

    /// Start listening.
    ///
    /// With `enabled = false` the returned handle is inert: no tasks, no
    /// subscriptions, no timers. The host enables the listener only while
    /// its waiting UI is shown and shuts the handle down when the UI goes
    /// away; re-enabling is just spawning again.
    pub fn spawn(&self, enabled: bool) -> ListenerHandle {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        if !enabled {
            return ListenerHandle { cancel, tasks };
        }

        // Subscribe before spawning so a signal published in between is not
        // missed by this handle.
        match self.channel.subscribe() {
            Ok(mut subscription) => {
                let oracle = Arc::clone(&self.oracle);
                let machine = Arc::clone(&self.machine);
                let task_cancel = cancel.clone();
                tasks.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = task_cancel.cancelled() => break,
                            signal = subscription.recv() => {
                                let Some(signal) = signal else { break };
                                tracing::debug!(user = %signal.user_id, "confirmation signal received");
                                // Re-verify with the provider before driving
                                // UI state off a foreign message.
                                match oracle.confirmed_status().await {
                                    Ok(status) if status.confirmed => {
                                        machine.observe(ConfirmationState::Confirmed);
                                    }
                                    Ok(_) => {
                                        tracing::debug!("signal arrived but provider still reports unconfirmed");
                                    }
                                    Err(e) => {
                                        tracing::debug!(error = %e, "re-verification failed, leaving it to the poll");
                                    }
                                }
                                if machine.is_confirmed() {
                                    task_cancel.cancel();
                                    break;
                                }
                            }
                        }
                    }
                }));
            }
            Err(e) => {
                tracing::warn!(error = %e, "channel subscription failed, poll backstop only");
            }
        }

        // Poll backstop.
        {
            let oracle = Arc::clone(&self.oracle);
            let machine = Arc::clone(&self.machine);
            let poll_interval = self.config.poll_interval;
            let task_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll_interval);
                // The first tick of an interval completes immediately; the
                // backstop checks only after a full interval has passed.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = task_cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            match oracle.confirmed_status().await {
                                Ok(status) => {
                                    let input = if status.confirmed {
                                        ConfirmationState::Confirmed
                                    } else {
                                        ConfirmationState::Unconfirmed
                                    };
                                    machine.observe(input);
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "backstop poll failed");
                                }
                            }
                            if machine.is_confirmed() {
                                // Terminal state: no further work.
                                task_cancel.cancel();
                                break;
                            }
                        }
                    }
                }
            }));
        }

        ListenerHandle { cancel, tasks }
    }
}

/// Handle owning the listener's tasks.
///
/// Dropping it (or calling [`shutdown`](ListenerHandle::shutdown)) cancels
/// the subscription and the poll deterministically — a torn-down UI leaves
/// no dangling timers behind.
pub struct ListenerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Whether any task is still running.
    pub fn is_active(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Cancel and wait for all tasks to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}
