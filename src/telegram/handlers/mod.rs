//! Conversation handlers
//!
//! A handler is one step of a multi-turn conversation. The active variant is
//! the conversation state: handlers change state by replacing themselves in
//! place and reporting [`Transition::Entered`], after which the engine runs
//! `initial_handle` on the new state.
//!
//! Private chats are driven by [`CommonWrapper`] around a [`Step`]; group chats
//! by the stateless [`PublicChat`].

mod accounts;
mod admin;
mod common;
mod menu;
mod public;

pub use accounts::{AddLogin, MyLogins, NewPassword, RemoveLogin};
pub use admin::{ListUsers, UserAction, UserActionKind, UserRef};
pub use common::CommonWrapper;
pub use menu::{PrivateMenu, Step};
pub use public::PublicChat;

use std::sync::Arc;
use thiserror::Error;

use crate::core::error::AppError;
use crate::minecraft::{PasswordSink, PlayerLookup};
use crate::perms::{PermsEngine, PermsError};
use crate::storage::Actor;
use crate::telegram::api::ChatApi;
use crate::telegram::types::{BotCommandSpec, IncomingUpdate};

/// What a handler wants to happen after processing an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Transition {
    /// Keep the current state for the next update
    Stay,
    /// The handler switched to a new state that has not been initialized yet
    Entered,
    /// The conversation is over
    Finish,
}

#[derive(Error, Debug)]
pub enum HandlerError {
    /// The step does not understand this command; empty when a command was required
    #[error("unknown command /{0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Unexpected(#[from] AppError),
}

impl HandlerError {
    pub fn unknown(update: &IncomingUpdate) -> Self {
        HandlerError::UnknownCommand(update.command.clone().unwrap_or_default())
    }
}

/// Refusals that a handler did not answer itself are unexpected at this point
impl From<PermsError> for HandlerError {
    fn from(err: PermsError) -> Self {
        match err {
            PermsError::Storage(err) => HandlerError::Unexpected(err),
            other => HandlerError::Unexpected(AppError::Validation(other.to_string())),
        }
    }
}

pub type HandlerResult = Result<Transition, HandlerError>;

/// Services available to every handler
#[derive(Clone)]
pub struct BotContext {
    pub api: Arc<dyn ChatApi>,
    pub perms: Arc<PermsEngine>,
    pub lookup: Arc<dyn PlayerLookup>,
    pub passwords: Arc<dyn PasswordSink>,
    pub bot_username: Option<String>,
}

impl BotContext {
    /// Send a text reply to the update's chat; delivery failures are logged
    pub async fn reply(&self, update: &IncomingUpdate, text: impl AsRef<str>) {
        if let Err(e) = self.api.send_message(update.chat_id, text.as_ref()).await {
            log::warn!(
                "Failed to send reply to chat {} (update {}): {}",
                update.chat_id,
                update.update_id,
                e
            );
        }
    }

    /// React to the update's message; delivery failures are logged
    pub async fn react(&self, update: &IncomingUpdate, emoji: &str) {
        if let Err(e) = self.api.set_reaction(update.chat_id, update.message_id, emoji).await {
            log::warn!(
                "Failed to set reaction '{}' in chat {} (update {}): {}",
                emoji,
                update.chat_id,
                update.update_id,
                e
            );
        }
    }

    /// `/imhere@bot` when the bot username is known
    pub fn imhere_command(&self) -> String {
        match &self.bot_username {
            Some(username) => format!("/imhere@{}", username),
            None => "/imhere".to_string(),
        }
    }

    pub fn not_accepted_hint(&self) -> String {
        format!(
            "Вы ещё не подтверждены. Напишите {} в чате сообщества или попросите администратора одобрить вас",
            self.imhere_command()
        )
    }
}

/// Top-level conversation state of a session
pub enum Handler {
    Private(CommonWrapper),
    Public(PublicChat),
}

impl Handler {
    /// Handler a session starts from when it has no active conversation
    pub fn entry(is_private: bool, actor: Option<&Actor>) -> Self {
        if is_private {
            Handler::Private(CommonWrapper::new(Step::Menu(PrivateMenu::new(actor))))
        } else {
            Handler::Public(PublicChat)
        }
    }

    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match self {
            Handler::Private(wrapper) => wrapper.initial_handle(ctx, update, actor).await,
            Handler::Public(public) => public.initial_handle(ctx, update, actor).await,
        }
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match self {
            Handler::Private(wrapper) => wrapper.handle_update(ctx, update, actor).await,
            Handler::Public(public) => public.handle_update(ctx, update, actor).await,
        }
    }

    pub fn commands(&self) -> Vec<BotCommandSpec> {
        match self {
            Handler::Private(wrapper) => wrapper.commands(),
            Handler::Public(public) => public.commands(),
        }
    }

    pub fn help_description(&self) -> String {
        match self {
            Handler::Private(wrapper) => wrapper.help_description(),
            Handler::Public(public) => public.help_description(),
        }
    }

    /// True when the handler is back at the state a fresh session starts from
    pub fn is_idle(&self) -> bool {
        match self {
            Handler::Private(wrapper) => matches!(wrapper.inner(), Step::Menu(_)),
            Handler::Public(_) => true,
        }
    }

    /// Short state name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Handler::Private(wrapper) => wrapper.inner().name(),
            Handler::Public(_) => "public",
        }
    }
}

/// Render a command list the way help messages show it
pub(crate) fn format_commands(commands: &[BotCommandSpec]) -> String {
    let mut text = String::from("Доступные команды:");
    for spec in commands {
        text.push_str(&format!("\n/{} - {}", spec.command, spec.description));
    }
    text
}
