//! Outbound chat client used by conversation handlers and the engine

use async_trait::async_trait;
use std::future::IntoFuture;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, BotCommandScope, MessageId, ReactionType, Recipient};
use teloxide::RequestError;

use crate::core::error::{AppError, AppResult};
use crate::telegram::types::{BotCommandSpec, CommandScope};

/// Everything the conversation engine needs from the chat platform
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> AppResult<()>;

    async fn set_reaction(&self, chat_id: i64, message_id: i32, emoji: &str) -> AppResult<()>;

    async fn set_commands(&self, scope: CommandScope, commands: &[BotCommandSpec]) -> AppResult<()>;

    async fn delete_commands(&self, scope: CommandScope) -> AppResult<()>;
}

impl From<CommandScope> for BotCommandScope {
    fn from(scope: CommandScope) -> Self {
        match scope {
            CommandScope::AllPrivateChats => BotCommandScope::AllPrivateChats,
            CommandScope::Chat { chat_id } => BotCommandScope::Chat {
                chat_id: Recipient::Id(ChatId(chat_id)),
            },
            CommandScope::ChatMember { chat_id, user_id } => BotCommandScope::ChatMember {
                chat_id: Recipient::Id(ChatId(chat_id)),
                user_id: UserId(user_id),
            },
        }
    }
}

/// [`ChatApi`] over a teloxide [`Bot`]; every call is bounded by `timeout`
pub struct TelegramApi {
    bot: Bot,
    timeout: Duration,
}

impl TelegramApi {
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self { bot, timeout }
    }

    async fn call<R, T>(&self, method: &'static str, request: R) -> AppResult<T>
    where
        R: IntoFuture<Output = Result<T, RequestError>>,
    {
        match tokio::time::timeout(self.timeout, request.into_future()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AppError::Timeout(format!("{} after {:?}", method, self.timeout))),
        }
    }
}

#[async_trait]
impl ChatApi for TelegramApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> AppResult<()> {
        self.call("sendMessage", self.bot.send_message(ChatId(chat_id), text.to_string()))
            .await
            .map(|_| ())
    }

    async fn set_reaction(&self, chat_id: i64, message_id: i32, emoji: &str) -> AppResult<()> {
        let request = self
            .bot
            .set_message_reaction(ChatId(chat_id), MessageId(message_id))
            .reaction(vec![ReactionType::Emoji {
                emoji: emoji.to_string(),
            }]);
        self.call("setMessageReaction", request).await.map(|_| ())
    }

    async fn set_commands(&self, scope: CommandScope, commands: &[BotCommandSpec]) -> AppResult<()> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|spec| BotCommand::new(spec.command, spec.description))
            .collect();
        let request = self.bot.set_my_commands(commands).scope(scope.into());
        self.call("setMyCommands", request).await.map(|_| ())
    }

    async fn delete_commands(&self, scope: CommandScope) -> AppResult<()> {
        let request = self.bot.delete_my_commands().scope(scope.into());
        self.call("deleteMyCommands", request).await.map(|_| ())
    }
}
