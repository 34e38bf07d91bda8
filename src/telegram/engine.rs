//! Conversation engine: routes updates into per-session handlers
//!
//! Every update runs in its own task. Updates of one session are processed
//! strictly in dispatch order; different sessions run in parallel. Slow work
//! (database, chat API, lookups) only ever happens under the session's own
//! lock.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::storage::Actor;
use crate::telegram::handlers::{BotContext, Handler, HandlerError, Transition};
use crate::telegram::session::{Session, SessionState, SessionTable};
use crate::telegram::types::{CommandScope, IncomingUpdate, SessionId};

/// A handler that keeps entering new states without waiting for input is a bug
const MAX_CHAINED_ENTRIES: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_inflight_updates: usize,
    pub max_pending_per_session: usize,
}

impl EngineLimits {
    pub fn from_env() -> Self {
        Self {
            max_inflight_updates: *config::sessions::MAX_INFLIGHT_UPDATES,
            max_pending_per_session: *config::sessions::MAX_PENDING_PER_SESSION,
        }
    }
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_inflight_updates: 64,
            max_pending_per_session: 8,
        }
    }
}

/// One update's claim on a session and on the in-flight limit.
///
/// Released on drop, so an update whose processing panicked still frees its
/// pending slot and lets an idle session be removed.
struct UpdateSlot<'a> {
    sessions: &'a SessionTable,
    session: Arc<Session>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for UpdateSlot<'_> {
    fn drop(&mut self) {
        self.session.finish_one();
        self.sessions.cleanup(&self.session);
    }
}

pub struct ConversationEngine {
    ctx: BotContext,
    sessions: SessionTable,
    inflight: Arc<Semaphore>,
    max_inflight: usize,
    max_pending_per_session: usize,
    tracker: TaskTracker,
}

impl ConversationEngine {
    pub fn new(ctx: BotContext, limits: EngineLimits) -> Arc<Self> {
        let max_inflight = limits.max_inflight_updates.max(1);
        Arc::new(Self {
            ctx,
            sessions: SessionTable::new(),
            inflight: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
            max_pending_per_session: limits.max_pending_per_session.max(1),
            tracker: TaskTracker::new(),
        })
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Number of sessions with an active conversation or an update in flight
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, id: SessionId) -> bool {
        self.sessions.contains(id)
    }

    /// Updates dispatched and not yet fully processed
    pub fn in_flight_updates(&self) -> usize {
        self.max_inflight.saturating_sub(self.inflight.available_permits())
    }

    /// Queue an update for processing.
    ///
    /// Waits only for a global in-flight slot; processing happens in a spawned
    /// task. Updates of the same session are processed in the order of
    /// `dispatch` calls.
    pub async fn dispatch(self: &Arc<Self>, update: IncomingUpdate) {
        let permit = match Arc::clone(&self.inflight).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                log::warn!("Engine is shut down, dropping update {}", update.update_id);
                return;
            }
        };

        let id = update.session_id();
        let Some(reservation) =
            self.sessions
                .reserve(id, update.chat_type.is_private(), self.max_pending_per_session)
        else {
            log::warn!(
                "Dropping update {} for chat {} user {}: too many pending updates",
                update.update_id,
                id.chat_id,
                id.user_id
            );
            return;
        };
        log::debug!(
            "Dispatching update {} to chat {} user {}",
            update.update_id,
            id.chat_id,
            id.user_id
        );

        let engine = Arc::clone(self);
        self.tracker.spawn(async move {
            // Declared before the lock guard so it runs after the lock is released
            let _slot = UpdateSlot {
                sessions: &engine.sessions,
                session: Arc::clone(reservation.session()),
                _permit: permit,
            };
            let (session, mut state) = reservation.acquire().await;
            engine.process(&session, &mut state, &update).await;
        });
    }

    /// Stop accepting work and wait for every in-flight update to finish
    pub async fn shutdown(&self) {
        self.inflight.close();
        self.tracker.close();
        self.tracker.wait().await;
        log::info!("Conversation engine drained, {} sessions left", self.sessions.len());
    }

    /// Publish the idle private-chat menu for every private chat
    pub async fn publish_default_commands(&self) -> AppResult<()> {
        let commands = Handler::entry(true, None).commands();
        self.ctx.api.set_commands(CommandScope::AllPrivateChats, &commands).await
    }

    async fn process(&self, session: &Session, state: &mut SessionState, update: &IncomingUpdate) {
        state.last_update_time = Some(Utc::now());

        if let Err(err) = self.run_handlers(session, state, update).await {
            state.handler = None;
            log::error!(
                "Failed to handle update id {} (chat {}, user {}): {}",
                update.update_id,
                update.chat_id,
                update.user.id,
                err
            );
            if session.is_private() {
                self.ctx
                    .reply(
                        update,
                        format!("Что-то пошло не так, отправьте код {} администратору", update.update_id),
                    )
                    .await;
            }
        }

        self.publish_commands(session, state).await;
    }

    async fn run_handlers(
        &self,
        session: &Session,
        state: &mut SessionState,
        update: &IncomingUpdate,
    ) -> Result<(), HandlerError> {
        let actor = self.resolve_actor(update)?;
        state.last_actor = Some(actor.clone());

        let (mut handler, fresh) = match state.handler.take() {
            Some(handler) => (handler, false),
            None => (Handler::entry(session.is_private(), Some(&actor)), true),
        };

        let mut transition = handler.handle_update(&self.ctx, update, &actor).await?;
        // A brand-new conversation gets initialized even if it stays put
        if fresh && transition == Transition::Stay {
            transition = Transition::Entered;
        }

        let mut entries = 0;
        while transition == Transition::Entered {
            entries += 1;
            if entries > MAX_CHAINED_ENTRIES {
                return Err(AppError::Validation(format!(
                    "handler {} entered {} states in a row",
                    handler.name(),
                    entries
                ))
                .into());
            }
            transition = handler.initial_handle(&self.ctx, update, &actor).await?;
        }

        // The entry state is rebuilt from `last_actor` whenever it is needed
        if transition == Transition::Stay && handler.is_idle() {
            transition = Transition::Finish;
        }

        if transition == Transition::Stay {
            log::debug!("Update {} leaves session in state {}", update.update_id, handler.name());
            state.handler = Some(handler);
        } else {
            log::debug!("Update {} finished conversation {}", update.update_id, handler.name());
        }
        Ok(())
    }

    fn resolve_actor(&self, update: &IncomingUpdate) -> AppResult<Actor> {
        let perms = &self.ctx.perms;
        let actor = perms.resolve_or_create(&update.user)?;
        if !update.chat_type.is_private() {
            perms.mark_seen(actor.id, update.chat_id)?;
        }
        perms.refresh_computed_flags(actor.id, false)
    }

    async fn publish_commands(&self, session: &Session, state: &SessionState) {
        let commands = match &state.handler {
            Some(handler) => handler.commands(),
            None => Handler::entry(session.is_private(), state.last_actor.as_ref()).commands(),
        };
        let scope = session.scope();
        let result = if commands.is_empty() {
            self.ctx.api.delete_commands(scope).await
        } else {
            self.ctx.api.set_commands(scope, &commands).await
        };
        if let Err(e) = result {
            log::warn!("Failed to publish commands for {:?}: {}", scope, e);
        }
    }
}
