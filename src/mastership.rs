//! Mastership arbitration
//!
//! The controller grants write access to one client at a time. The arbiter
//! tracks whether this client holds it and provides [`MastershipArbiter::scoped`]
//! for sequences that must run entirely under mastership.
//!
//! A scope whose future is dropped part way (a timeout, a cancelled select
//! branch) still gives mastership back: the release is sent from a background
//! task on the current runtime.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::resources;
use crate::session::Session;
use crate::{Result, RwsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MastershipState {
    Released,
    Held,
}

#[derive(Debug)]
pub struct MastershipArbiter {
    state: Arc<Mutex<MastershipState>>,
}

impl Default for MastershipArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl MastershipArbiter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MastershipState::Released)),
        }
    }

    pub async fn state(&self) -> MastershipState {
        *self.state.lock().await
    }

    /// Acquire mastership. Does nothing if already held.
    pub async fn request(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock().await;
        acquire(&mut state, session).await
    }

    /// Release mastership. Local state is Released afterwards even if the
    /// controller call failed; the failure is still returned.
    pub async fn release(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock().await;
        relinquish(&mut state, session).await
    }

    /// Run `op` while holding mastership, releasing on every exit path.
    ///
    /// The state lock is held for the whole sequence, so concurrent scoped
    /// writers on one client are serialized rather than interleaved.
    pub async fn scoped<T, F, Fut>(&self, session: &Session, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = self.state.lock().await;
        acquire(&mut state, session).await?;
        let guard = ReleaseOnDrop {
            state: Arc::clone(&self.state),
            session: Some(session.clone()),
        };

        let outcome = op().await;
        let released = relinquish(&mut state, session).await;
        guard.disarm();

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release)) => Err(release),
            (Err(operation), Ok(())) => Err(operation),
            (Err(operation), Err(release)) => Err(RwsError::MastershipReleaseFailed {
                operation: Box::new(operation),
                release: Box::new(release),
            }),
        }
    }
}

/// Sends the release from a spawned task if a scope is dropped before it
/// could release on its own.
struct ReleaseOnDrop {
    state: Arc<Mutex<MastershipState>>,
    session: Option<Session>,
}

impl ReleaseOnDrop {
    fn disarm(mut self) {
        self.session = None;
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let state = Arc::clone(&self.state);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Mastership scope cancelled, releasing in background");
                handle.spawn(async move {
                    // Another scope may have run (and released) in between.
                    let mut state = state.lock().await;
                    if *state == MastershipState::Held {
                        let _ = relinquish(&mut state, &session).await;
                    }
                });
            }
            Err(_) => warn!("Mastership scope cancelled outside a runtime, release not sent"),
        }
    }
}

async fn acquire(state: &mut MastershipState, session: &Session) -> Result<()> {
    if *state == MastershipState::Held {
        debug!("Mastership already held");
        return Ok(());
    }

    match session.execute(&resources::mastership_request()).await {
        Ok(_) => {
            *state = MastershipState::Held;
            info!("Mastership acquired");
            Ok(())
        }
        Err(RwsError::MastershipRequired { .. }) => {
            warn!("Mastership request denied by controller");
            Err(RwsError::MastershipDenied("mastership is held by another client".to_string()))
        }
        Err(RwsError::Transport { status: 409, body }) => {
            warn!("Mastership request denied by controller");
            Err(RwsError::MastershipDenied(body))
        }
        Err(e) => Err(e),
    }
}

async fn relinquish(state: &mut MastershipState, session: &Session) -> Result<()> {
    let result = session.execute(&resources::mastership_release()).await;
    *state = MastershipState::Released;
    match result {
        Ok(_) => {
            info!("Mastership released");
            Ok(())
        }
        Err(e) => {
            warn!("Mastership release failed: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_for(server: &MockServer) -> Session {
        Session::builder(&server.uri(), "Default User", "robotics").build().unwrap()
    }

    async fn mount(server: &MockServer, route: &str, status: u16, times: u64) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_request_is_idempotent_when_held() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 204, 1).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        arbiter.request(&session).await.unwrap();
        arbiter.request(&session).await.unwrap();
        assert_eq!(arbiter.state().await, MastershipState::Held);
    }

    #[tokio::test]
    async fn test_denied_request_is_distinct_error() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 403, 1).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        let err = arbiter.request(&session).await.unwrap_err();
        assert!(err.is_mastership_denial(), "got {:?}", err);
        assert_eq!(arbiter.state().await, MastershipState::Released);
    }

    #[tokio::test]
    async fn test_scoped_releases_after_success() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 204, 1).await;
        mount(&server, "/rw/mastership/release", 204, 1).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        let value = arbiter.scoped(&session, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(arbiter.state().await, MastershipState::Released);
    }

    #[tokio::test]
    async fn test_scoped_releases_after_failure() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 204, 1).await;
        mount(&server, "/rw/mastership/release", 204, 1).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        let err = arbiter
            .scoped(&session, || async {
                Err::<(), _>(RwsError::Transport { status: 400, body: "bad".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RwsError::Transport { status: 400, .. }));
        assert_eq!(arbiter.state().await, MastershipState::Released);
    }

    #[tokio::test]
    async fn test_release_failure_after_operation_failure_reports_both() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 204, 1).await;
        mount(&server, "/rw/mastership/release", 500, 1).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        let err = arbiter
            .scoped(&session, || async {
                Err::<(), _>(RwsError::Transport { status: 400, body: "bad".into() })
            })
            .await
            .unwrap_err();
        match err {
            RwsError::MastershipReleaseFailed { operation, release } => {
                assert!(matches!(*operation, RwsError::Transport { status: 400, .. }));
                assert!(matches!(*release, RwsError::Transport { status: 500, .. }));
            }
            other => panic!("expected combined error, got {:?}", other),
        }
        assert_eq!(arbiter.state().await, MastershipState::Released);
    }

    #[tokio::test]
    async fn test_release_failure_after_success_is_reported() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 204, 1).await;
        mount(&server, "/rw/mastership/release", 500, 1).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        let err = arbiter.scoped(&session, || async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, RwsError::Transport { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_scope_releases_in_background() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 204, 1).await;
        mount(&server, "/rw/mastership/release", 204, 1).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        let scope = arbiter.scoped(&session, || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(100), scope).await.is_err());

        for _ in 0..50 {
            if arbiter.state().await == MastershipState::Released {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(arbiter.state().await, MastershipState::Released);
        let released = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/rw/mastership/release")
            .count();
        assert_eq!(released, 1);
    }

    #[tokio::test]
    async fn test_denied_scope_never_runs_operation() {
        let server = MockServer::start().await;
        mount(&server, "/rw/mastership/request", 403, 1).await;
        mount(&server, "/rw/mastership/release", 204, 0).await;

        let session = session_for(&server);
        let arbiter = MastershipArbiter::new();
        let ran = std::sync::atomic::AtomicBool::new(false);
        let err = arbiter
            .scoped(&session, || async {
                ran.store(true, std::sync::atomic::Ordering::Relaxed);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_mastership_denial());
        assert!(!ran.load(std::sync::atomic::Ordering::Relaxed));
    }
}
