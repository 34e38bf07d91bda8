//! Common test utilities
//!
//! An in-process environment around a real engine and a temporary database,
//! with the chat platform and the game-server services replaced by recorders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use uuid::Uuid;

use subchat_sentry::minecraft::{LookupError, MinecraftLogin, PasswordSink, PlayerLookup};
use subchat_sentry::storage::{self, Actor, DbPool, TgUserInfo};
use subchat_sentry::telegram::api::ChatApi;
use subchat_sentry::telegram::types::{parse_command, BotCommandSpec, ChatType, CommandScope, IncomingUpdate};
use subchat_sentry::{AppError, AppResult, BotContext, ConversationEngine, EngineLimits, PermsConfig, PermsEngine};

pub const BOT_USERNAME: &str = "sentry_bot";
pub const ADMIN_TAG: &str = "admin";

/// One outbound call made through [`ChatApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Message { chat_id: i64, text: String },
    Reaction { chat_id: i64, message_id: i32, emoji: String },
    SetCommands { scope: CommandScope, commands: Vec<String> },
    DeleteCommands { scope: CommandScope },
}

/// [`ChatApi`] that records every call.
///
/// Messages and reactions can be held at a gate to keep an update in flight,
/// or slowed down to widen race windows.
#[derive(Default)]
pub struct RecordingChatApi {
    calls: Mutex<Vec<ApiCall>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    waiting: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    panicking: AtomicBool,
}

impl RecordingChatApi {
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn messages(&self, chat_id: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Message { chat_id: id, text } if id == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_message(&self, chat_id: i64) -> Option<String> {
        self.messages(chat_id).pop()
    }

    pub fn reactions(&self, chat_id: i64) -> Vec<(i32, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Reaction {
                    chat_id: id,
                    message_id,
                    emoji,
                } if id == chat_id => Some((message_id, emoji)),
                _ => None,
            })
            .collect()
    }

    /// Every command set published for `scope`, oldest first; a deletion is an empty set
    pub fn command_history(&self, scope: CommandScope) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::SetCommands { scope: s, commands } if s == scope => Some(commands),
                ApiCall::DeleteCommands { scope: s } if s == scope => Some(Vec::new()),
                _ => None,
            })
            .collect()
    }

    pub fn last_commands(&self, scope: CommandScope) -> Option<Vec<String>> {
        self.command_history(scope).pop()
    }

    /// Block messages and reactions until released
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held calls through
    pub fn release(&self, n: usize) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(n);
        }
    }

    /// Calls currently blocked at the gate
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Make message sends panic, as a handler bug would
    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }

    async fn pass_gate(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.unwrap().forget();
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatApi for RecordingChatApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> AppResult<()> {
        assert!(!self.panicking.load(Ordering::SeqCst), "send_message panicked on purpose");
        self.pass_gate().await;
        self.record(ApiCall::Message {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn set_reaction(&self, chat_id: i64, message_id: i32, emoji: &str) -> AppResult<()> {
        self.pass_gate().await;
        self.record(ApiCall::Reaction {
            chat_id,
            message_id,
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn set_commands(&self, scope: CommandScope, commands: &[BotCommandSpec]) -> AppResult<()> {
        self.record(ApiCall::SetCommands {
            scope,
            commands: commands.iter().map(|spec| spec.command.to_string()).collect(),
        });
        Ok(())
    }

    async fn delete_commands(&self, scope: CommandScope) -> AppResult<()> {
        self.record(ApiCall::DeleteCommands { scope });
        Ok(())
    }
}

/// Licensed players known to the fake profile API
#[derive(Default)]
pub struct FakeLookup {
    licensed: Mutex<HashMap<String, Uuid>>,
    unavailable: AtomicBool,
}

impl FakeLookup {
    pub fn add_licensed(&self, login: &str, uuid: Uuid) {
        self.licensed.lock().unwrap().insert(login.to_lowercase(), uuid);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlayerLookup for FakeLookup {
    async fn online_uuid(&self, login: &MinecraftLogin) -> Result<Uuid, LookupError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LookupError::Malformed("profile API is down".to_string()));
        }
        self.licensed
            .lock()
            .unwrap()
            .get(&login.as_str().to_lowercase())
            .copied()
            .ok_or_else(|| LookupError::NoSuchPlayer(login.to_string()))
    }
}

/// Records passwords delivered to the game server
#[derive(Default)]
pub struct FakePasswords {
    delivered: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl FakePasswords {
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PasswordSink for FakePasswords {
    async fn set_password(&self, login: &MinecraftLogin, password: &str) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Validation("overseer rejected the password".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((login.to_string(), password.to_string()));
        Ok(())
    }
}

/// A running engine over a temporary database
pub struct TestEnv {
    _dir: TempDir,
    pub pool: Arc<DbPool>,
    pub perms: Arc<PermsEngine>,
    pub api: Arc<RecordingChatApi>,
    pub lookup: Arc<FakeLookup>,
    pub passwords: Arc<FakePasswords>,
    pub engine: Arc<ConversationEngine>,
    next_update_id: AtomicU32,
    next_message_id: AtomicU32,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_limits(EngineLimits::default())
    }

    pub fn with_limits(limits: EngineLimits) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        let pool = Arc::new(storage::create_pool(path.to_str().unwrap()).unwrap());
        let perms = Arc::new(PermsEngine::new(
            Arc::clone(&pool),
            PermsConfig {
                default_login_limit: 2,
                admin_tags: vec![ADMIN_TAG.to_string()],
            },
        ));
        let api = Arc::new(RecordingChatApi::default());
        let lookup = Arc::new(FakeLookup::default());
        let passwords = Arc::new(FakePasswords::default());

        let ctx = BotContext {
            api: api.clone(),
            perms: Arc::clone(&perms),
            lookup: lookup.clone(),
            passwords: passwords.clone(),
            bot_username: Some(BOT_USERNAME.to_string()),
        };
        let engine = ConversationEngine::new(ctx, limits);

        Self {
            _dir: dir,
            pool,
            perms,
            api,
            lookup,
            passwords,
            engine,
            next_update_id: AtomicU32::new(1000),
            next_message_id: AtomicU32::new(1),
        }
    }

    pub fn user(id: u64, username: &str) -> TgUserInfo {
        TgUserInfo {
            id,
            username: Some(username.to_string()),
            first_name: username.to_string(),
            last_name: None,
        }
    }

    fn update(&self, chat_id: i64, chat_type: ChatType, user: &TgUserInfo, text: &str) -> IncomingUpdate {
        IncomingUpdate {
            update_id: self.next_update_id.fetch_add(1, Ordering::SeqCst),
            chat_id,
            chat_type,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) as i32,
            user: user.clone(),
            text: text.to_string(),
            command: parse_command(text, Some(BOT_USERNAME)),
        }
    }

    /// Private chats share their id with the user
    pub fn private_update(&self, user: &TgUserInfo, text: &str) -> IncomingUpdate {
        self.update(user.id as i64, ChatType::Private, user, text)
    }

    pub fn group_update(&self, chat_id: i64, user: &TgUserInfo, text: &str) -> IncomingUpdate {
        self.update(chat_id, ChatType::Supergroup, user, text)
    }

    /// Register the user and mark them accepted
    pub fn accept(&self, user: &TgUserInfo) -> Actor {
        let actor = self.perms.resolve_or_create(user).unwrap();
        let conn = storage::get_connection(&self.pool).unwrap();
        storage::actors::set_accepted(&conn, actor.id, true).unwrap();
        self.perms.get_actor(actor.id).unwrap()
    }

    pub fn actor_of(&self, user: &TgUserInfo) -> Actor {
        self.perms.find_actor_by_tg_user(user.id).unwrap().unwrap()
    }

    pub async fn send(&self, update: IncomingUpdate) {
        self.engine.dispatch(update).await;
    }

    /// Send in a private chat and wait for processing to finish
    pub async fn say(&self, user: &TgUserInfo, text: &str) -> IncomingUpdate {
        let update = self.private_update(user, text);
        self.send(update.clone()).await;
        self.wait_idle().await;
        update
    }

    /// Wait until no update is in flight
    pub async fn wait_idle(&self) {
        wait_until(|| self.engine.in_flight_updates() == 0).await;
    }
}

/// Poll `condition` until it holds; panics after five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn private_scope(user: &TgUserInfo) -> CommandScope {
    CommandScope::Chat { chat_id: user.id as i64 }
}

pub fn commands(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
