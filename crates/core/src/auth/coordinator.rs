//! Single-flight token refresh with request replay
//!
//! The first request to see a 401 starts a refresh on a detached task; every
//! other request that hits a 401 while that refresh is in flight waits on the
//! same outcome. When the refresh succeeds the new credential is stored and
//! each waiter is replayed once, transport calls starting in arrival order.
//! When it fails the session is cleared, the expiry hook fires once and
//! every waiter fails with an expired-session error. A 401 that arrives
//! once the session is already gone fails the same way without another
//! refresh or hook call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clinicdesk_domain::constants::AUTHORIZATION_HEADER;
use clinicdesk_domain::Credential;
use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, info_span, warn, Instrument};

use super::ports::{RefreshError, SessionExpiredHook, SessionStore, TokenRefresher};
use crate::client::ports::{Transport, TransportError, TransportRequest, TransportResponse};

/// Outcome of auth recovery for one request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthRecoveryError {
    /// The session could not be renewed
    #[error("Authentication expired: {reason}")]
    Expired { reason: String },

    /// The refresh worked but the replayed request got no response
    #[error(transparent)]
    Replay(#[from] TransportError),
}

type ReplayResult = Result<TransportResponse, AuthRecoveryError>;

const NO_SESSION: &str = "No active session";

/// Where a 401 goes once the pending lock is released
enum Route {
    /// A newer credential exists; replay with it
    Direct(Credential, TransportRequest),
    /// Waiting on the in-flight refresh
    Queued,
    /// Nothing to refresh
    SignedOut,
}

struct Waiter {
    request: TransportRequest,
    reply: oneshot::Sender<ReplayResult>,
}

/// The in-flight refresh and the requests queued behind it
#[derive(Default)]
struct PendingRefresh {
    waiters: Vec<Waiter>,
}

struct CoordinatorInner {
    transport: Arc<dyn Transport>,
    refresher: Arc<dyn TokenRefresher>,
    session: Arc<dyn SessionStore>,
    hook: Arc<dyn SessionExpiredHook>,
    pending: Mutex<Option<PendingRefresh>>,
    refreshes: AtomicU64,
}

/// Coordinates token renewal across concurrent requests
///
/// Cheap to clone; clones share the pending refresh.
#[derive(Clone)]
pub struct AuthRefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for AuthRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("refreshes", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

impl AuthRefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn TokenRefresher>,
        session: Arc<dyn SessionStore>,
        hook: Arc<dyn SessionExpiredHook>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                transport,
                refresher,
                session,
                hook,
                pending: Mutex::new(None),
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Number of refresh calls started so far
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::Relaxed)
    }

    /// Recover a request that was answered with 401
    ///
    /// `sent_with` is the access token the request carried. If the session
    /// already holds a different token, a refresh finished after the request
    /// left and it is replayed right away with the current token.
    ///
    /// Callers must invoke this at most once per logical request.
    pub async fn recover(
        &self,
        request: TransportRequest,
        sent_with: Option<&str>,
    ) -> ReplayResult {
        let (reply, outcome) = oneshot::channel();

        let route = {
            let mut pending = self.inner.pending.lock();
            let current = self.inner.session.credential();
            let refreshed_since = current
                .as_ref()
                .is_some_and(|credential| Some(credential.access_token.as_str()) != sent_with);

            if refreshed_since {
                current.map_or(Route::SignedOut, |credential| Route::Direct(credential, request))
            } else if let Some(refresh) = pending.as_mut() {
                debug!(queued = refresh.waiters.len(), "Joining in-flight token refresh");
                refresh.waiters.push(Waiter { request, reply });
                Route::Queued
            } else if let Some(credential) = current {
                *pending = Some(PendingRefresh { waiters: vec![Waiter { request, reply }] });
                self.spawn_refresh(credential.refresh_token);
                Route::Queued
            } else {
                Route::SignedOut
            }
        };

        match route {
            Route::Direct(credential, request) => {
                debug!("Credential changed since the request was sent, replaying directly");
                let replay = authorize(request, &credential);
                self.inner.transport.send(replay).await.map_err(AuthRecoveryError::from)
            }
            // The session already ended and the hook already ran
            Route::SignedOut => {
                debug!("No session to renew");
                Err(AuthRecoveryError::Expired { reason: NO_SESSION.to_string() })
            }
            Route::Queued => outcome.await.unwrap_or_else(|_| {
                Err(AuthRecoveryError::Expired { reason: "token refresh was aborted".to_string() })
            }),
        }
    }

    fn spawn_refresh(&self, refresh_token: Option<String>) {
        let inner = Arc::clone(&self.inner);
        let attempt = inner.refreshes.fetch_add(1, Ordering::Relaxed) + 1;

        tokio::spawn(
            async move { inner.drive(refresh_token).await }
                .instrument(info_span!("auth_refresh", attempt)),
        );
    }
}

impl CoordinatorInner {
    async fn drive(&self, refresh_token: Option<String>) {
        let result = match refresh_token {
            Some(token) => self.refresher.refresh(&token).await,
            None => Err(RefreshError::MissingRefreshToken),
        };

        match result {
            Ok(credential) => self.complete(credential).await,
            Err(error) => self.expire(&error),
        }
    }

    async fn complete(&self, credential: Credential) {
        let waiters = {
            let mut pending = self.pending.lock();
            self.session.set_credential(credential.clone());
            pending.take().map(|refresh| refresh.waiters).unwrap_or_default()
        };
        info!(replays = waiters.len(), "Token refreshed, replaying queued requests");

        // join_all polls in order, so transport calls start in arrival order
        let transport = &self.transport;
        join_all(waiters.into_iter().map(|Waiter { request, reply }| {
            let replay = authorize(request, &credential);
            async move {
                let result = transport.send(replay).await.map_err(AuthRecoveryError::from);
                // The caller may have given up; nothing to deliver then
                let _ = reply.send(result);
            }
        }))
        .await;
    }

    fn expire(&self, error: &RefreshError) {
        let waiters = {
            let mut pending = self.pending.lock();
            self.session.clear_credential();
            pending.take().map(|refresh| refresh.waiters).unwrap_or_default()
        };
        warn!(%error, failed = waiters.len(), "Token refresh failed, session expired");

        self.hook.on_session_expired();

        let reason = error.to_string();
        for waiter in waiters {
            let _ = waiter.reply.send(Err(AuthRecoveryError::Expired { reason: reason.clone() }));
        }
    }
}

fn authorize(mut request: TransportRequest, credential: &Credential) -> TransportRequest {
    request.headers.retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION_HEADER));
    request.headers.insert(AUTHORIZATION_HEADER.to_string(), credential.bearer());
    request
}
