//! Platform-neutral view of incoming updates and of the command surface

use teloxide::types::{Message, Update, UpdateKind};

use crate::storage::actors::TgUserInfo;

/// Identity of a conversation: one user inside one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    pub chat_id: i64,
    pub user_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatType {
    pub fn is_private(self) -> bool {
        matches!(self, ChatType::Private)
    }

    fn of(message: &Message) -> Self {
        let chat = &message.chat;
        if chat.is_private() {
            ChatType::Private
        } else if chat.is_supergroup() {
            ChatType::Supergroup
        } else if chat.is_channel() {
            ChatType::Channel
        } else {
            ChatType::Group
        }
    }
}

/// A text message from a user, with the leading bot command already split off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub update_id: u32,
    pub chat_id: i64,
    pub chat_type: ChatType,
    pub message_id: i32,
    pub user: TgUserInfo,
    pub text: String,
    /// Command name without the slash and the `@bot` suffix
    pub command: Option<String>,
}

impl IncomingUpdate {
    pub fn session_id(&self) -> SessionId {
        SessionId {
            chat_id: self.chat_id,
            user_id: self.user.id,
        }
    }

    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }

    /// Convert a teloxide update; anything but a message with a sender is skipped
    pub fn from_update(update: &Update, bot_username: Option<&str>) -> Option<Self> {
        let UpdateKind::Message(message) = &update.kind else {
            return None;
        };
        let from = message.from.as_ref()?;
        let text = message.text().or_else(|| message.caption()).unwrap_or_default();

        Some(Self {
            update_id: update.id.0,
            chat_id: message.chat.id.0,
            chat_type: ChatType::of(message),
            message_id: message.id.0,
            user: TgUserInfo {
                id: from.id.0,
                username: from.username.clone(),
                first_name: from.first_name.clone(),
                last_name: from.last_name.clone(),
            },
            text: text.to_string(),
            command: parse_command(text, bot_username),
        })
    }
}

/// Extract the command from a message starting with `/`.
///
/// `/cmd@other_bot` is ignored when our own username is known, so commands
/// meant for another bot in the same group are treated as plain text.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<String> {
    let first = text.trim_start().split_whitespace().next()?;
    let body = first.strip_prefix('/')?;
    let (name, target) = match body.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (body, None),
    };
    if name.is_empty() {
        return None;
    }
    if let (Some(target), Some(ours)) = (target, bot_username) {
        if !target.eq_ignore_ascii_case(ours) {
            return None;
        }
    }
    Some(name.to_lowercase())
}

/// One entry of the command menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotCommandSpec {
    pub command: &'static str,
    pub description: &'static str,
}

impl BotCommandSpec {
    pub const fn new(command: &'static str, description: &'static str) -> Self {
        Self { command, description }
    }
}

/// Where a command menu is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandScope {
    AllPrivateChats,
    Chat { chat_id: i64 },
    ChatMember { chat_id: i64, user_id: u64 },
}

impl CommandScope {
    /// Private chats get a chat-wide menu, groups a per-member one
    pub fn for_session(id: SessionId, is_private: bool) -> Self {
        if is_private {
            CommandScope::Chat { chat_id: id.chat_id }
        } else {
            CommandScope::ChatMember {
                chat_id: id.chat_id,
                user_id: id.user_id,
            }
        }
    }
}
