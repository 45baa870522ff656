//! Bearer credentials and the re-credential protocol.
//!
//! Issuing and refreshing credentials belongs to an external provider. The
//! engine only holds the current credential (a `watch` channel the provider
//! pushes into) and a hook it calls when the store answers `Unauthorized`.
//! The affected call chain then waits, bounded by a timeout, for a new value
//! to be pushed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{RemoteError, Result};

const DEFAULT_RECREDENTIAL_WAIT: Duration = Duration::from_secs(30);

/// An opaque bearer credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn bearer(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Asks the credential provider for a replacement credential.
///
/// Implementations return once the request is accepted; the replacement
/// arrives through the [`CredentialPusher`].
#[async_trait]
pub trait RecredentialHook: Send + Sync {
    async fn request_recredential(&self, stale: &Credential) -> Result<()>;
}

/// Hook for callers that cannot refresh: every request is refused.
#[derive(Debug, Default)]
pub struct NoRecredential;

#[async_trait]
impl RecredentialHook for NoRecredential {
    async fn request_recredential(&self, _stale: &Credential) -> Result<()> {
        Err(RemoteError::CredentialExhausted(
            "no credential provider attached".to_string(),
        ))
    }
}

/// Provider side of the channel.
#[derive(Debug)]
pub struct CredentialPusher {
    tx: watch::Sender<Credential>,
}

impl CredentialPusher {
    pub fn push(&self, credential: Credential) {
        self.tx.send_replace(credential);
    }
}

/// Engine side of the channel, cloned into every call chain of a request.
#[derive(Clone)]
pub struct CredentialChannel {
    rx: watch::Receiver<Credential>,
    hook: Arc<dyn RecredentialHook>,
    // one hook request per stale credential
    refresh_lane: Arc<Mutex<()>>,
    wait: Duration,
}

impl fmt::Debug for CredentialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialChannel")
            .field("wait", &self.wait)
            .finish()
    }
}

impl CredentialChannel {
    pub fn new(initial: Credential, hook: Arc<dyn RecredentialHook>) -> (Self, CredentialPusher) {
        let (tx, rx) = watch::channel(initial);
        let channel = Self {
            rx,
            hook,
            refresh_lane: Arc::new(Mutex::new(())),
            wait: DEFAULT_RECREDENTIAL_WAIT,
        };
        (channel, CredentialPusher { tx })
    }

    /// A channel whose credential never changes.
    pub fn fixed(credential: Credential) -> Self {
        let (channel, _pusher) = Self::new(credential, Arc::new(NoRecredential));
        channel
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// How long [`Self::recredential`] waits for a pushed credential.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn current(&self) -> Credential {
        self.rx.borrow().clone()
    }

    /// Replaces `stale` with a fresh credential.
    ///
    /// If another call chain already obtained a replacement, that one is
    /// returned without asking the provider again.
    pub async fn recredential(
        &self,
        stale: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Credential> {
        let _lane = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
            guard = self.refresh_lane.lock() => guard,
        };

        let mut rx = self.rx.clone();
        let latest = rx.borrow_and_update().clone();
        if &latest != stale {
            return Ok(latest);
        }

        self.hook
            .request_recredential(stale)
            .await
            .map_err(|error| match error {
                RemoteError::CredentialExhausted(_) | RemoteError::Cancelled => error,
                other => RemoteError::CredentialExhausted(other.to_string()),
            })?;

        let wait_for_push = async {
            loop {
                let latest = rx.borrow_and_update().clone();
                if &latest != stale {
                    return Ok(latest);
                }
                if rx.changed().await.is_err() {
                    return Err(RemoteError::CredentialExhausted(
                        "credential provider went away".to_string(),
                    ));
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemoteError::Cancelled),
            pushed = tokio::time::timeout(self.wait, wait_for_push) => match pushed {
                Ok(result) => result,
                Err(_) => Err(RemoteError::CredentialExhausted(format!(
                    "no credential pushed within {}s",
                    self.wait.as_secs()
                ))),
            },
        }
    }
}
