//! Periodic credential refresh
//!
//! A refresh cycle is a small state machine:
//!
//! ```text
//! Ready -> Draining -> Full -> Refreshing -> Ready
//! ```
//!
//! - Draining: the gate is closed; the manager waits (notification-driven)
//!   until every checked-out session has come back.
//! - Full: all N sessions are idle; the manager takes them out of the pool.
//! - Refreshing: each session gets a new credential from the
//!   [`CredentialSource`]. Nobody else can hold a session at this point.
//! - Ready: sessions are back, gate open. Every acquisition admitted after
//!   this sees the new credentials.
//!
//! If any session cannot be refreshed the cycle stops, the sessions go back
//! to the pool with the gate left closed, and the error is delivered once on
//! the fatal channel. Running without a valid credential is not supported.
//!
//! Two tasks run in the background: the refresh scheduler (fixed interval,
//! late ticks beyond the misfire grace are skipped) and a stop monitor that
//! watches the stop flag and shuts both tasks down between cycles.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use catalog_auth::Credential;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::pool::SessionPool;
use crate::session::Session;

/// Boxed future returned by [`CredentialSource::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + Send + 'a>>;

/// Produces a fresh credential for an idle session.
///
/// Implementations own their retry policy. An `Err` means retries are
/// already exhausted and is treated as fatal by the manager.
///
/// Uses `Pin<Box<dyn Future>>` so the manager can hold `Arc<dyn CredentialSource>`.
pub trait CredentialSource: Send + Sync {
    fn refresh<'a>(&'a self, session: &'a Session) -> RefreshFuture<'a>;
}

/// Where the current refresh cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Ready,
    Draining,
    Full,
    Refreshing,
}

impl RefreshPhase {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshPhase::Ready => "ready",
            RefreshPhase::Draining => "draining",
            RefreshPhase::Full => "full",
            RefreshPhase::Refreshing => "refreshing",
        }
    }
}

/// Timing of the background tasks.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSchedule {
    /// Time between refresh cycles
    pub interval: Duration,
    /// A tick later than this is skipped instead of run
    pub misfire_grace: Duration,
    /// How often the stop flag is checked
    pub monitor_interval: Duration,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(500),
            misfire_grace: Duration::from_secs(50),
            monitor_interval: Duration::from_secs(20),
        }
    }
}

/// Drives refresh cycles over a shared pool.
pub struct AuthLifecycleManager {
    pool: Arc<SessionPool>,
    source: Arc<dyn CredentialSource>,
    phase: watch::Sender<RefreshPhase>,
}

impl AuthLifecycleManager {
    pub fn new(pool: Arc<SessionPool>, source: Arc<dyn CredentialSource>) -> Self {
        let (phase, _) = watch::channel(RefreshPhase::Ready);
        Self {
            pool,
            source,
            phase,
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: RefreshPhase) {
        debug!(phase = phase.label(), "refresh phase");
        self.phase.send_replace(phase);
    }

    /// Run one full refresh cycle. Returns the number of sessions refreshed.
    pub async fn run_cycle(&self) -> Result<usize> {
        info!("refresh cycle triggered");
        self.enter(RefreshPhase::Draining);
        self.pool.close_gate();
        if !self.pool.is_full() {
            info!(
                checked_out = self.pool.checked_out(),
                capacity = self.pool.capacity(),
                "session pool not full, waiting for in-flight requests"
            );
        }
        self.pool.wait_until_full().await?;

        self.enter(RefreshPhase::Full);
        let mut sessions = self.pool.take_all();

        self.enter(RefreshPhase::Refreshing);
        let mut failure = None;
        for session in &mut sessions {
            if let Err(e) = self.refresh_session(session).await {
                failure = Some(e);
                break;
            }
        }

        let count = sessions.len();
        self.pool.restore(sessions);
        if let Some(e) = failure {
            metrics::counter!("catalog_refresh_total", "outcome" => "failed").increment(1);
            return Err(e);
        }

        self.pool.open_gate();
        self.enter(RefreshPhase::Ready);
        metrics::counter!("catalog_refresh_total", "outcome" => "ok").increment(1);
        info!(sessions = count, "refreshed credentials for all sessions");
        Ok(count)
    }

    async fn refresh_session(&self, session: &mut Session) -> Result<()> {
        let credential = self.source.refresh(session).await?;
        session.replace_credential(credential)?;
        debug!(session_id = session.id(), "session credential replaced");
        Ok(())
    }

    /// Start the refresh scheduler and its stop monitor.
    pub fn spawn(self, schedule: RefreshSchedule) -> RefreshHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = oneshot::channel();

        info!(
            interval_secs = schedule.interval.as_secs(),
            misfire_grace_secs = schedule.misfire_grace.as_secs(),
            "starting credential refresh scheduler"
        );
        let refresh_task = tokio::spawn(refresh_loop(self, schedule, shutdown_rx, fatal_tx));
        let monitor_task = tokio::spawn(monitor_loop(
            stop.clone(),
            schedule.monitor_interval,
            shutdown_tx,
        ));

        RefreshHandle {
            stop,
            refresh_task,
            monitor_task,
            fatal: Some(fatal_rx),
        }
    }
}

async fn refresh_loop(
    manager: AuthLifecycleManager,
    schedule: RefreshSchedule,
    mut shutdown: watch::Receiver<bool>,
    fatal: oneshot::Sender<Error>,
) {
    let mut ticker = tokio::time::interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the immediate first tick; credentials were just acquired
    ticker.tick().await;

    loop {
        let scheduled = tokio::select! {
            scheduled = ticker.tick() => scheduled,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let lateness = Instant::now().saturating_duration_since(scheduled);
        if lateness > schedule.misfire_grace {
            warn!(
                late_ms = lateness.as_millis() as u64,
                "refresh tick missed its window, skipping"
            );
            continue;
        }

        if let Err(e) = manager.run_cycle().await {
            error!(error = %e, "credential refresh failed, cannot continue without valid credentials");
            let _ = fatal.send(e);
            return;
        }
    }
    info!("credential refresh scheduler stopped");
}

async fn monitor_loop(stop: Arc<AtomicBool>, every: Duration, shutdown: watch::Sender<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if stop.load(Ordering::Acquire) {
            let _ = shutdown.send(true);
            info!("stop requested, refresh monitor exiting");
            return;
        }
    }
}

/// Handle to the background refresh tasks.
pub struct RefreshHandle {
    stop: Arc<AtomicBool>,
    refresh_task: JoinHandle<()>,
    monitor_task: JoinHandle<()>,
    fatal: Option<oneshot::Receiver<Error>>,
}

impl RefreshHandle {
    /// Ask both tasks to stop. Takes effect at the monitor's next check,
    /// never in the middle of a refresh cycle.
    pub fn stop(&self) {
        info!("stopping credential refresh scheduler");
        self.stop.store(true, Ordering::Release);
    }

    /// Receiver that yields the error if a refresh cycle fails. Resolves to
    /// `Err(RecvError)` if the scheduler ends normally.
    pub fn take_fatal(&mut self) -> Option<oneshot::Receiver<Error>> {
        self.fatal.take()
    }

    /// Wait for both tasks to finish.
    pub async fn join(self) {
        if let Err(e) = self.refresh_task.await {
            warn!(error = %e, "refresh task ended abnormally");
        }
        if let Err(e) = self.monitor_task.await {
            warn!(error = %e, "refresh monitor ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Issues `at_{session}_{generation}` tokens and records pool state at
    /// each call.
    struct RecordingSource {
        pool: Mutex<Option<Arc<SessionPool>>>,
        generation: AtomicUsize,
        calls: AtomicUsize,
        seen_available: Mutex<Vec<usize>>,
        fail_on_call: Option<usize>,
    }

    impl RecordingSource {
        fn new(fail_on_call: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                pool: Mutex::new(None),
                generation: AtomicUsize::new(1),
                calls: AtomicUsize::new(0),
                seen_available: Mutex::new(Vec::new()),
                fail_on_call,
            })
        }

        fn attach(&self, pool: Arc<SessionPool>) {
            *self.pool.lock().unwrap() = Some(pool);
        }
    }

    impl CredentialSource for RecordingSource {
        fn refresh<'a>(&'a self, session: &'a Session) -> RefreshFuture<'a> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(pool) = self.pool.lock().unwrap().as_ref() {
                    self.seen_available.lock().unwrap().push(pool.available());
                    assert_eq!(pool.gate(), crate::Gate::Closed);
                }
                if self.fail_on_call == Some(call) {
                    return Err(Error::RefreshExhausted {
                        session_id: session.id(),
                        reason: "auth endpoint returned 500".into(),
                    });
                }
                let generation = self.generation.load(Ordering::SeqCst);
                Ok(Credential::new(
                    "Bearer",
                    format!("at_{}_{}", session.id(), generation),
                ))
            })
        }
    }

    fn test_pool(n: usize) -> Arc<SessionPool> {
        let sessions = (0..n)
            .map(|id| {
                Session::new(id, reqwest::Client::new(), Credential::new("Bearer", format!("at_{id}_0")))
                    .unwrap()
            })
            .collect();
        Arc::new(SessionPool::new(sessions).unwrap())
    }

    #[tokio::test]
    async fn cycle_refreshes_every_session_and_reopens_gate() {
        let pool = test_pool(3);
        let source = RecordingSource::new(None);
        source.attach(pool.clone());
        let manager = AuthLifecycleManager::new(pool.clone(), source.clone());

        let refreshed = manager.run_cycle().await.unwrap();
        assert_eq!(refreshed, 3);
        assert_eq!(manager.phase(), RefreshPhase::Ready);
        assert_eq!(pool.gate(), crate::Gate::Open);
        assert!(pool.is_full());

        // Refresh only ran while the manager held every session
        assert_eq!(*source.seen_available.lock().unwrap(), vec![0, 0, 0]);

        for _ in 0..3 {
            let session = pool.checkout().await.unwrap();
            assert!(session.credential().access_token().ends_with("_1"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_waits_for_checked_out_sessions() {
        let pool = test_pool(2);
        let source = RecordingSource::new(None);
        let manager = Arc::new(AuthLifecycleManager::new(pool.clone(), source.clone()));
        let mut phases = manager.subscribe();

        let held = pool.acquire().await.unwrap();
        let cycle = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run_cycle().await })
        };

        phases.wait_for(|p| *p == RefreshPhase::Draining).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!cycle.is_finished(), "refresh must wait for the held session");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        // The holder's credential is untouched while it holds the session
        assert_eq!(held.credential().access_token(), "at_0_0");
        pool.release(held);

        assert_eq!(cycle.await.unwrap().unwrap(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_gate_closed_and_sessions_home() {
        let pool = test_pool(3);
        let source = RecordingSource::new(Some(2));
        let manager = AuthLifecycleManager::new(pool.clone(), source.clone());

        let err = manager.run_cycle().await.unwrap_err();
        assert!(matches!(err, Error::RefreshExhausted { .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(pool.gate(), crate::Gate::Closed);
        assert!(pool.is_full(), "sessions must return to the pool on failure");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn churn_never_observes_credential_change_while_held() {
        let pool = test_pool(4);
        let source = RecordingSource::new(None);
        source.attach(pool.clone());
        let manager = Arc::new(AuthLifecycleManager::new(pool.clone(), source.clone()));

        let mut workers = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            workers.push(tokio::spawn(async move {
                for _ in 0..40 {
                    let session = pool.checkout().await.unwrap();
                    let before = session.credential().access_token().to_string();
                    tokio::time::sleep(Duration::from_micros(200)).await;
                    assert_eq!(session.credential().access_token(), before);
                }
            }));
        }

        for generation in 2..5 {
            source.generation.store(generation, Ordering::SeqCst);
            manager.run_cycle().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        for worker in workers {
            worker.await.unwrap();
        }
        assert!(pool.is_full());
        assert!(
            source.seen_available.lock().unwrap().iter().all(|n| *n == 0),
            "no refresh may run while any session is outside the manager's hands"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_runs_cycles_on_interval_and_stops_via_monitor() {
        let pool = test_pool(2);
        let source = RecordingSource::new(None);
        let manager = AuthLifecycleManager::new(pool.clone(), source.clone());

        let schedule = RefreshSchedule {
            interval: Duration::from_secs(500),
            misfire_grace: Duration::from_secs(50),
            monitor_interval: Duration::from_secs(20),
        };
        let handle = manager.spawn(schedule);

        tokio::time::sleep(Duration::from_secs(499)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        handle.stop();
        tokio::time::timeout(Duration::from_secs(60), handle.join())
            .await
            .expect("both tasks must stop after the monitor observes the flag");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_signals_fatal_exactly_once() {
        let pool = test_pool(2);
        let source = RecordingSource::new(Some(1));
        let manager = AuthLifecycleManager::new(pool.clone(), source.clone());

        let mut handle = manager.spawn(RefreshSchedule {
            interval: Duration::from_secs(10),
            misfire_grace: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(1),
        });
        let fatal = handle.take_fatal().unwrap();
        assert!(handle.take_fatal().is_none());

        let err = fatal.await.expect("fatal signal must be delivered");
        assert!(matches!(err, Error::RefreshExhausted { session_id: 0, .. }));

        // The scheduler does not keep retrying after a fatal failure
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        handle.stop();
        handle.join().await;
    }
}
