//! Gated session pool
//!
//! The pool owns exactly N sessions for its whole lifetime. The available
//! queue, the ids of checked-out sessions, the gate flag and the shutdown
//! flag sit behind one mutex so that "gate open" and "session handed out" are decided together:
//! no acquire can return a session once the gate has been observed closed.
//!
//! Waiters (blocked `acquire` calls and the refresh manager waiting for the
//! pool to become full) are woken through a single `Notify` whenever the
//! state changes. Each waiter registers interest before inspecting the state,
//! so a release that lands between the check and the await is never missed.

use std::collections::{HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::Session;

/// Admission gate for `acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    Closed,
}

#[derive(Debug)]
struct PoolState {
    available: VecDeque<Session>,
    checked_out: HashSet<usize>,
    gate: Gate,
    closed: bool,
}

/// Fixed-capacity pool of sessions with a refresh gate.
#[derive(Debug)]
pub struct SessionPool {
    capacity: usize,
    state: Mutex<PoolState>,
    changed: Notify,
}

impl SessionPool {
    /// Build a pool from fully initialized sessions. The gate starts open.
    pub fn new(sessions: Vec<Session>) -> Result<Self> {
        if sessions.is_empty() {
            return Err(Error::Empty);
        }
        let mut ids = HashSet::with_capacity(sessions.len());
        for session in &sessions {
            if !ids.insert(session.id()) {
                return Err(Error::DuplicateSession(session.id()));
            }
        }
        let capacity = sessions.len();
        info!(capacity, "session pool initialized");
        metrics::gauge!("session_pool_available").set(capacity as f64);
        Ok(Self {
            capacity,
            state: Mutex::new(PoolState {
                available: sessions.into(),
                checked_out: HashSet::new(),
                gate: Gate::Open,
                closed: false,
            }),
            changed: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a session, waiting while the gate is closed or none is idle.
    ///
    /// Fails only after [`close`](Self::close).
    pub async fn acquire(&self) -> Result<Session> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                if state.gate == Gate::Open {
                    if let Some(session) = state.available.pop_front() {
                        state.checked_out.insert(session.id());
                        metrics::gauge!("session_pool_available").set(state.available.len() as f64);
                        return Ok(session);
                    }
                }
            }

            notified.await;
        }
    }

    /// Like [`acquire`](Self::acquire), but the session returns to the pool
    /// when the guard drops, whatever happens to the caller.
    pub async fn checkout(&self) -> Result<PooledSession<'_>> {
        let session = self.acquire().await?;
        Ok(PooledSession {
            pool: self,
            session: Some(session),
        })
    }

    /// Return a session to the available set.
    ///
    /// Only a session this pool handed out and has not taken back is
    /// accepted. Anything else (a double release, or a session the pool never
    /// issued) is logged and dropped, so the pool keeps its original sessions.
    pub fn release(&self, session: Session) {
        {
            let mut state = self.lock();
            if !state.checked_out.remove(&session.id()) {
                let queued = state.available.iter().any(|s| s.id() == session.id());
                warn!(
                    session_id = session.id(),
                    queued,
                    capacity = self.capacity,
                    "released session is not checked out, dropping it"
                );
                return;
            }
            state.available.push_back(session);
            metrics::gauge!("session_pool_available").set(state.available.len() as f64);
        }
        self.changed.notify_waiters();
    }

    /// Stop admitting new acquisitions. Checked-out sessions are not recalled.
    pub fn close_gate(&self) {
        self.lock().gate = Gate::Closed;
        debug!("session pool gate closed");
    }

    /// Admit acquisitions again and wake every blocked caller.
    pub fn open_gate(&self) {
        self.lock().gate = Gate::Open;
        debug!("session pool gate opened");
        self.changed.notify_waiters();
    }

    pub fn gate(&self) -> Gate {
        self.lock().gate
    }

    /// True when every session is idle in the pool.
    pub fn is_full(&self) -> bool {
        self.lock().available.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions idle in the pool right now.
    pub fn available(&self) -> usize {
        self.lock().available.len()
    }

    /// Sessions currently held outside the pool.
    pub fn checked_out(&self) -> usize {
        self.lock().checked_out.len()
    }

    /// Shut the pool down; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.lock().closed = true;
        info!("session pool closed");
        self.changed.notify_waiters();
    }

    /// Wait until all sessions are idle, without polling.
    pub(crate) async fn wait_until_full(&self) -> Result<()> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                if state.available.len() == self.capacity {
                    return Ok(());
                }
                debug!(
                    available = state.available.len(),
                    capacity = self.capacity,
                    "waiting for checked-out sessions"
                );
            }

            notified.await;
        }
    }

    /// Take every idle session at once. Used by the refresh manager after
    /// observing the pool full with the gate closed.
    pub(crate) fn take_all(&self) -> Vec<Session> {
        let mut state = self.lock();
        let sessions: Vec<Session> = state.available.drain(..).collect();
        state.checked_out.extend(sessions.iter().map(Session::id));
        metrics::gauge!("session_pool_available").set(0.0);
        sessions
    }

    /// Put back sessions taken with [`take_all`](Self::take_all).
    pub(crate) fn restore(&self, sessions: Vec<Session>) {
        for session in sessions {
            self.release(session);
        }
    }
}

/// A checked-out session that returns itself to the pool on drop.
pub struct PooledSession<'a> {
    pool: &'a SessionPool,
    session: Option<Session>,
}

impl Deref for PooledSession<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        // Only `Drop` takes the session out
        match &self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        match &mut self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}
