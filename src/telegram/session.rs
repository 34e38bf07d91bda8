//! Session table: one entry per (chat, user) conversation
//!
//! Two lock levels: the table mutex protects which sessions exist, each
//! session's async mutex protects its contents. The table mutex is never held
//! across an `.await`.

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::storage::Actor;
use crate::telegram::handlers::Handler;
use crate::telegram::types::{CommandScope, SessionId};

/// Contents of a session, only touched by the holder of its lock
#[derive(Default)]
pub struct SessionState {
    /// `None` when no conversation is active
    pub handler: Option<Handler>,
    /// Actor seen on the most recent update, used for the idle command menu
    pub last_actor: Option<Actor>,
    pub last_update_time: Option<DateTime<Utc>>,
}

pub struct Session {
    id: SessionId,
    is_private: bool,
    /// Updates reserved on this session and not yet processed
    pending: AtomicUsize,
    state: Arc<AsyncMutex<SessionState>>,
}

impl Session {
    fn new(id: SessionId, is_private: bool) -> Self {
        Self {
            id,
            is_private,
            pending: AtomicUsize::new(0),
            state: Arc::new(AsyncMutex::new(SessionState::default())),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn scope(&self) -> CommandScope {
        CommandScope::for_session(self.id, self.is_private)
    }

    pub(crate) fn finish_one(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

type LockFuture = Pin<Box<dyn Future<Output = OwnedMutexGuard<SessionState>> + Send>>;

/// A queued place on a session's lock, taken while the table lock was held
pub(crate) struct Reservation {
    session: Arc<Session>,
    lock: LockFuture,
    ready: Option<OwnedMutexGuard<SessionState>>,
}

impl Reservation {
    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Wait for our turn on the session lock
    pub(crate) async fn acquire(self) -> (Arc<Session>, OwnedMutexGuard<SessionState>) {
        let guard = match self.ready {
            Some(guard) => guard,
            None => self.lock.await,
        };
        (self.session, guard)
    }
}

#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        // Map operations cannot leave the table half-updated
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Get or create the session and queue on its lock.
    ///
    /// Queueing happens under the table lock, so reservations for one session
    /// are granted in the order `reserve` was called. Returns `None` when the
    /// session already has `max_pending` updates waiting.
    pub(crate) fn reserve(&self, id: SessionId, is_private: bool, max_pending: usize) -> Option<Reservation> {
        let mut sessions = self.lock();
        let session = Arc::clone(
            sessions
                .entry(id)
                .or_insert_with(|| Arc::new(Session::new(id, is_private))),
        );

        if session.pending.load(Ordering::SeqCst) >= max_pending {
            return None;
        }
        session.pending.fetch_add(1, Ordering::SeqCst);

        let mut lock: LockFuture = Box::pin(Arc::clone(&session.state).lock_owned());
        // A single poll joins the lock's FIFO queue; coop budgeting must not skip it
        let ready = tokio::task::unconstrained(&mut lock).now_or_never();

        Some(Reservation { session, lock, ready })
    }

    /// Remove the session if it is idle: unlocked and without a handler.
    ///
    /// A failed `try_lock` means another update holds or awaits the lock; that
    /// update runs its own cleanup afterwards.
    pub(crate) fn cleanup(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.lock();
        let Ok(state) = session.state.try_lock() else {
            return false;
        };
        if state.handler.is_some() {
            return false;
        }
        match sessions.get(&session.id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(&session.id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::handlers::PublicChat;

    fn id(chat_id: i64, user_id: u64) -> SessionId {
        SessionId { chat_id, user_id }
    }

    #[tokio::test]
    async fn first_reservation_is_granted_immediately() {
        let table = SessionTable::new();
        let reservation = table.reserve(id(1, 1), true, 8).unwrap();
        assert!(reservation.ready.is_some());
        assert!(table.contains(id(1, 1)));

        let (session, guard) = reservation.acquire().await;
        session.finish_one();
        drop(guard);
        assert!(table.cleanup(&session));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn reservations_are_granted_in_order() {
        let table = SessionTable::new();
        let first = table.reserve(id(1, 1), true, 8).unwrap();
        let second = table.reserve(id(1, 1), true, 8).unwrap();
        let third = table.reserve(id(1, 1), true, 8).unwrap();
        assert!(second.ready.is_none());

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        // Spawn in reverse so task start order cannot explain the result
        for (n, reservation) in [(3, third), (2, second)] {
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let (session, _guard) = reservation.acquire().await;
                order.lock().unwrap().push(n);
                session.finish_one();
            }));
        }
        tokio::task::yield_now().await;

        let (session, guard) = first.acquire().await;
        order.lock().unwrap().push(1);
        session.finish_one();
        drop(guard);

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn cleanup_keeps_busy_and_active_sessions() {
        let table = SessionTable::new();
        let first = table.reserve(id(5, 5), false, 8).unwrap();
        let (session, mut guard) = first.acquire().await;

        // Locked: another task is still working on it
        assert!(!table.cleanup(&session));

        guard.handler = Some(Handler::Public(PublicChat));
        drop(guard);
        assert!(!table.cleanup(&session));
        assert!(table.contains(id(5, 5)));

        session.state.lock().await.handler = None;
        assert!(table.cleanup(&session));
        assert!(!table.contains(id(5, 5)));
    }

    #[tokio::test]
    async fn pending_cap_rejects_extra_updates() {
        let table = SessionTable::new();
        let held = table.reserve(id(9, 9), true, 2).unwrap();
        let queued = table.reserve(id(9, 9), true, 2).unwrap();
        assert!(table.reserve(id(9, 9), true, 2).is_none());

        let (session, guard) = held.acquire().await;
        session.finish_one();
        drop(guard);
        let (session, guard) = queued.acquire().await;
        session.finish_one();
        drop(guard);
        assert!(table.reserve(id(9, 9), true, 2).is_some());
    }
}
