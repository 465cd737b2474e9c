//! Confirmation-tab lifecycle.
//!
//! The confirmation tab runs exactly one pass on load: verify the
//! confirmation, announce it, then get out of the user's way — close itself
//! if the environment allows it, hand off to a live origin tab if one
//! acknowledged, or redirect to sign-in if nobody is listening. Each step
//! and its exit conditions are explicit states rather than a chain of nested
//! timers, so every branch is independently testable.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::sleep;

use crate::channel::SignalChannel;
use crate::config::RelayConfig;
use crate::session::{OracleError, SessionOracle};
use crate::store::KeyValueStore;
use crate::types::{
    extract_tokens, AcknowledgmentSignal, ConfirmationSignal, LocationParts, RedirectFlag,
};
use crate::{ACK_KEY, REDIRECT_FLAG_KEY, SIGNAL_KEY, SIGN_IN_ROUTE};

/// Terminal failures of one confirmation-tab load.
///
/// All of these are terminal for the load and recoverable only through the
/// resend action (or, for `NoSession`, returning home to sign in again).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmError {
    /// The confirmation URL carried an explicit provider error.
    #[error("{message}")]
    Token {
        /// Message from the provider, or a generic fallback.
        message: String,
    },
    /// Installing the URL tokens into a session failed.
    #[error("could not establish a session: {message}")]
    SessionInstall {
        /// Provider's rejection message.
        message: String,
    },
    /// No user session exists after the settle delay.
    #[error("no signed-in user was found")]
    NoSession,
    /// A user exists but the email is still unconfirmed.
    #[error("the email address has not been confirmed yet")]
    NotYetConfirmed,
    /// The provider could not be reached.
    #[error("identity provider unavailable: {message}")]
    Provider {
        /// Transport-level failure description.
        message: String,
    },
}

/// States of the confirmation tab.
///
/// `Loading -> {Success, Failed}`; the sub-states `SuccessClosing` and
/// `RedirectedAway` are reachable only from `Success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabState {
    /// Verifying the confirmation.
    Loading,
    /// Confirmed and announced; trying to close.
    Success,
    /// The origin tab acknowledged; showing "you may close this tab".
    SuccessClosing,
    /// No origin tab acknowledged; this tab redirected to sign-in.
    RedirectedAway,
    /// Terminal failure for this load.
    Failed(ConfirmError),
}

/// Capabilities of the hosting environment the controller cannot provide
/// itself: closing the tab and navigating it elsewhere.
pub trait TabEnvironment: Send + Sync {
    /// Ask the environment to close this tab. Returns `true` when the
    /// environment will actually terminate the context — not all
    /// environments permit a scripted close.
    fn attempt_close(&self) -> bool;

    /// Navigate this tab to an application route.
    fn navigate(&self, path: &str);
}

/// Drives the confirmation tab from load to a terminal state.
pub struct ConfirmationTabController {
    oracle: Arc<dyn SessionOracle>,
    channel: Arc<dyn SignalChannel>,
    store: Arc<dyn KeyValueStore>,
    env: Arc<dyn TabEnvironment>,
    config: RelayConfig,
    location: LocationParts,
    state_tx: watch::Sender<TabState>,
}

impl ConfirmationTabController {
    /// Create a controller for the tab at `location`.
    pub fn new(
        oracle: Arc<dyn SessionOracle>,
        channel: Arc<dyn SignalChannel>,
        store: Arc<dyn KeyValueStore>,
        env: Arc<dyn TabEnvironment>,
        config: RelayConfig,
        location: LocationParts,
    ) -> Self {
        let (state_tx, _) = watch::channel(TabState::Loading);
        Self {
            oracle,
            channel,
            store,
            env,
            config,
            location,
            state_tx,
        }
    }

    /// Observe state transitions (for the hosting UI).
    pub fn subscribe_state(&self) -> watch::Receiver<TabState> {
        self.state_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> TabState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: TabState) {
        self.state_tx.send_replace(state);
    }

    fn fail(&self, error: ConfirmError) -> TabState {
        tracing::warn!(error = %error, "confirmation tab failed");
        let state = TabState::Failed(error);
        self.set_state(state.clone());
        state
    }

    /// Execute the confirmation-tab algorithm once and return the terminal
    /// state. `Success` as a return value means the environment agreed to
    /// close the tab — in a browser this context is about to die.
    pub async fn run(&self) -> TabState {
        let tokens = extract_tokens(&self.location);

        // 1. An explicit provider error on the URL is terminal, tokens or not.
        if tokens.has_error() {
            let message = tokens
                .error_message()
                .unwrap_or("the confirmation link is invalid or has expired")
                .to_string();
            return self.fail(ConfirmError::Token { message });
        }

        // 2./3. Install tokens when present, then let the provider settle;
        // with no tokens the session may arrive out-of-band (cookie
        // exchange), which is slower to observe.
        if tokens.has_token_pair() {
            let access = tokens.access_token.as_deref().unwrap_or_default();
            let refresh = tokens.refresh_token.as_deref().unwrap_or_default();
            if let Err(e) = self.oracle.install_session(access, refresh).await {
                return self.fail(ConfirmError::SessionInstall {
                    message: e.to_string(),
                });
            }
            sleep(self.config.token_settle).await;
        } else {
            sleep(self.config.sessionless_settle).await;
        }

        // 4. Ask the provider, distinguishing "nobody is signed in" from
        // "signed in but still pending".
        let status = match self.oracle.confirmed_status().await {
            Ok(status) => status,
            Err(OracleError::NoSession) => return self.fail(ConfirmError::NoSession),
            Err(e) => {
                return self.fail(ConfirmError::Provider {
                    message: e.to_string(),
                })
            }
        };
        if !status.confirmed {
            return self.fail(ConfirmError::NotYetConfirmed);
        }

        // 5. Announce. A publish failure does not un-confirm the user; the
        // origin tab's poll backstop will still find out.
        let email = status.email.clone().unwrap_or_default();
        let signal = ConfirmationSignal::new(status.user_id.unwrap_or_default(), email.clone());
        if let Err(e) = self.channel.publish(&signal).await {
            tracing::warn!(error = %e, "confirmation signal publish failed");
        }

        self.set_state(TabState::Success);
        sleep(self.config.success_hold).await;

        if self.env.attempt_close() {
            // The environment is tearing this context down.
            return TabState::Success;
        }

        // 6. The close was refused. Probe whether a live origin tab consumed
        // the signal and acknowledged.
        sleep(self.config.ack_probe_delay).await;

        if self.take_acknowledgment().await.is_some() {
            self.set_state(TabState::SuccessClosing);
            sleep(self.config.close_retry_delay).await;
            self.env.attempt_close();
            TabState::SuccessClosing
        } else {
            // Nobody is listening. Leave a flag for the sign-in page, clear
            // the stale signal, and take the user there ourselves.
            self.persist_redirect_flag(&email).await;
            if let Err(e) = self.store.remove(SIGNAL_KEY).await {
                tracing::warn!(error = %e, "stale signal cleanup failed");
            }
            self.env.navigate(SIGN_IN_ROUTE);
            self.set_state(TabState::RedirectedAway);
            TabState::RedirectedAway
        }
    }

    /// Consume the acknowledgment key, if a valid one is present.
    /// A malformed ack is deleted and treated as absent.
    async fn take_acknowledgment(&self) -> Option<AcknowledgmentSignal> {
        let raw = match self.store.get(ACK_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "acknowledgment probe failed");
                return None;
            }
        };
        if let Err(e) = self.store.remove(ACK_KEY).await {
            tracing::warn!(error = %e, "acknowledgment cleanup failed");
        }
        match serde_json::from_str(&raw) {
            Ok(ack) => Some(ack),
            Err(e) => {
                tracing::warn!(error = %e, "clearing malformed acknowledgment key");
                None
            }
        }
    }

    async fn persist_redirect_flag(&self, email: &str) {
        let flag = RedirectFlag::new(email);
        match serde_json::to_string(&flag) {
            Ok(json) => {
                if let Err(e) = self.store.put(REDIRECT_FLAG_KEY, &json).await {
                    tracing::warn!(error = %e, "redirect flag write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "redirect flag encoding failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BroadcastBus, connect};
    use crate::session::InMemorySessionOracle;
    use crate::store::SharedStore;
    use crate::types::ContextIdentity;
    use crate::CONFIRMATION_ROUTE;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Environment double: scripted close behavior, recorded navigations.
    struct ScriptedEnv {
        close_allowed: AtomicBool,
        close_attempts: AtomicUsize,
        navigations: Mutex<Vec<String>>,
    }

    impl ScriptedEnv {
        fn new(close_allowed: bool) -> Arc<Self> {
            Arc::new(Self {
                close_allowed: AtomicBool::new(close_allowed),
                close_attempts: AtomicUsize::new(0),
                navigations: Mutex::new(Vec::new()),
            })
        }
    }

    impl TabEnvironment for ScriptedEnv {
        fn attempt_close(&self) -> bool {
            self.close_attempts.fetch_add(1, Ordering::SeqCst);
            self.close_allowed.load(Ordering::SeqCst)
        }

        fn navigate(&self, path: &str) {
            self.navigations.lock().push(path.to_string());
        }
    }

    struct Harness {
        controller: ConfirmationTabController,
        env: Arc<ScriptedEnv>,
        shared: SharedStore,
        oracle: Arc<InMemorySessionOracle>,
    }

    fn harness(oracle: InMemorySessionOracle, location: LocationParts, close_allowed: bool) -> Harness {
        let shared = SharedStore::new();
        let identity = ContextIdentity::new(CONFIRMATION_ROUTE);
        let store: Arc<dyn KeyValueStore> = Arc::new(shared.handle(&identity));
        let bus = BroadcastBus::new();
        let config = RelayConfig::default();
        let channel = connect(&bus, &identity, Arc::clone(&store), &config);
        let env = ScriptedEnv::new(close_allowed);
        let oracle = Arc::new(oracle);
        let controller = ConfirmationTabController::new(
            Arc::clone(&oracle) as Arc<dyn SessionOracle>,
            channel,
            store,
            Arc::clone(&env) as Arc<dyn TabEnvironment>,
            config,
            location,
        );
        Harness {
            controller,
            env,
            shared,
            oracle,
        }
    }

    fn token_location() -> LocationParts {
        LocationParts::with_fragment(
            CONFIRMATION_ROUTE,
            "access_token=aaa&refresh_token=rrr",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_url_error_is_terminal() {
        let h = harness(
            InMemorySessionOracle::new(),
            LocationParts::with_fragment(
                CONFIRMATION_ROUTE,
                "error=otp_expired&error_description=Link+expired",
            ),
            false,
        );

        let state = h.controller.run().await;
        assert_eq!(
            state,
            TabState::Failed(ConfirmError::Token {
                message: "Link expired".to_string()
            })
        );
        assert_eq!(h.env.close_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_failure_is_terminal() {
        let oracle = InMemorySessionOracle::with_unconfirmed_user("u1", "a@b.com");
        oracle.fail_next_install("bad tokens");
        let h = harness(oracle, token_location(), false);

        let state = h.controller.run().await;
        assert!(matches!(state, TabState::Failed(ConfirmError::SessionInstall { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_session_and_pending_are_distinguished() {
        let h = harness(InMemorySessionOracle::new(), LocationParts::path_only(CONFIRMATION_ROUTE), false);
        assert_eq!(h.controller.run().await, TabState::Failed(ConfirmError::NoSession));

        let h = harness(
            InMemorySessionOracle::with_unconfirmed_user("u1", "a@b.com"),
            LocationParts::path_only(CONFIRMATION_ROUTE),
            false,
        );
        assert_eq!(h.controller.run().await, TabState::Failed(ConfirmError::NotYetConfirmed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_install_then_confirm_succeeds_and_closes() {
        let oracle = InMemorySessionOracle::with_unconfirmed_user("u1", "a@b.com");
        oracle.detach_session();
        oracle.confirm();
        let h = harness(oracle, token_location(), true);

        let state = h.controller.run().await;
        assert_eq!(state, TabState::Success);
        assert_eq!(h.env.close_attempts.load(Ordering::SeqCst), 1);
        // Tokens from the URL were installed.
        assert_eq!(h.oracle.session_snapshot().access_token.as_deref(), Some("aaa"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_reaches_success_closing() {
        let oracle = InMemorySessionOracle::with_confirmed_user("u1", "a@b.com");
        let h = harness(oracle, token_location(), false);

        // A live origin tab consumed the signal and acknowledged.
        let origin = h.shared.handle(&ContextIdentity::new("/dashboard"));
        let ack = serde_json::to_string(&AcknowledgmentSignal::new(
            ContextIdentity::new("/dashboard").id,
        ))
        .unwrap();
        origin.put(ACK_KEY, &ack).await.unwrap();

        let state = h.controller.run().await;
        assert_eq!(state, TabState::SuccessClosing);
        assert_eq!(
            h.env.close_attempts.load(Ordering::SeqCst),
            2,
            "close is retried after the acknowledgment"
        );
        assert!(h.env.navigations.lock().is_empty());
        assert_eq!(h.shared.peek(ACK_KEY), None, "ack is consumed by the probe");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_redirects_with_flag() {
        let oracle = InMemorySessionOracle::with_confirmed_user("u1", "a@b.com");
        let h = harness(oracle, token_location(), false);

        let state = h.controller.run().await;
        assert_eq!(state, TabState::RedirectedAway);
        assert_eq!(h.env.navigations.lock().as_slice(), [SIGN_IN_ROUTE.to_string()]);

        let flag: RedirectFlag =
            serde_json::from_str(&h.shared.peek(REDIRECT_FLAG_KEY).unwrap()).unwrap();
        assert_eq!(flag.email, "a@b.com");
        assert_eq!(h.shared.peek(SIGNAL_KEY), None, "stale signal is cleared");
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_ack_treated_as_absent() {
        let oracle = InMemorySessionOracle::with_confirmed_user("u1", "a@b.com");
        let h = harness(oracle, token_location(), false);

        let origin = h.shared.handle(&ContextIdentity::new("/dashboard"));
        origin.put(ACK_KEY, "{garbage").await.unwrap();

        let state = h.controller.run().await;
        assert_eq!(state, TabState::RedirectedAway);
        assert_eq!(h.shared.peek(ACK_KEY), None, "poisoned ack is cleared");
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions_are_observable() {
        let oracle = InMemorySessionOracle::with_confirmed_user("u1", "a@b.com");
        let h = harness(oracle, token_location(), true);
        let mut states = h.controller.subscribe_state();
        assert_eq!(*states.borrow(), TabState::Loading);

        h.controller.run().await;

        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), TabState::Success);
    }
}
