//! Admin-only steps: approving, rejecting and banning users, listing users

use super::accounts::describe_account;
use super::{BotContext, HandlerError, HandlerResult, Transition};
use crate::perms::PermsError;
use crate::storage::Actor;
use crate::telegram::types::{BotCommandSpec, IncomingUpdate};

const CONFIRM: BotCommandSpec = BotCommandSpec::new("confirm", "Подтвердить действие");

/// Telegram messages are capped at 4096 characters
const MAX_MESSAGE_CHARS: usize = 3500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserActionKind {
    Approve,
    Reject,
    Ban,
}

impl UserActionKind {
    pub fn name(self) -> &'static str {
        match self {
            UserActionKind::Approve => "approve_user",
            UserActionKind::Reject => "reject_user",
            UserActionKind::Ban => "ban_user",
        }
    }

    fn question(self) -> &'static str {
        match self {
            UserActionKind::Approve => "Одобрить пользователя?",
            UserActionKind::Reject => "Отклонить пользователя?",
            UserActionKind::Ban => "Заблокировать пользователя?",
        }
    }

    fn done(self) -> &'static str {
        match self {
            UserActionKind::Approve => "Пользователь одобрен",
            UserActionKind::Reject => "Пользователь отклонен",
            UserActionKind::Ban => "Пользователь заблокирован",
        }
    }
}

/// How an admin refers to a user: `@username` or a numeric Telegram id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Username(String),
    TelegramId(u64),
}

impl UserRef {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(username) = text.strip_prefix('@') {
            let valid = !username.is_empty() && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            return valid.then(|| UserRef::Username(username.to_string()));
        }
        text.parse().ok().map(UserRef::TelegramId)
    }
}

pub(crate) fn describe_actor(actor: &Actor) -> String {
    let yes_no = |flag: bool| if flag { "да" } else { "нет" };
    let mut lines = vec![format!("Пользователь #{}", actor.id)];
    for tg in &actor.tg_users {
        lines.push(format!("Telegram: {} [id {}]", tg.display_name(), tg.id));
    }
    lines.push(format!(
        "Одобрен: {}, админ: {}, заблокирован: {}",
        yes_no(actor.accepted),
        yes_no(actor.is_admin),
        yes_no(actor.banned)
    ));
    if actor.minecraft_accounts.is_empty() {
        lines.push("Аккаунты: нет".to_string());
    } else {
        let accounts: Vec<String> = actor.minecraft_accounts.iter().map(describe_account).collect();
        lines.push(format!("Аккаунты: {}", accounts.join(", ")));
    }
    lines.join("\n")
}

/// Pick a user, show them, then apply the action after `/confirm`
pub struct UserAction {
    kind: UserActionKind,
    target: Option<Actor>,
}

impl UserAction {
    pub fn new(kind: UserActionKind) -> Self {
        Self { kind, target: None }
    }

    pub fn kind(&self) -> UserActionKind {
        self.kind
    }

    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate) -> HandlerResult {
        let text = match &self.target {
            None => "Введите id пользователя в виде числа или юзернейм начиная с @".to_string(),
            Some(target) => format!("{}\n\n{} /confirm /abort", describe_actor(target), self.kind.question()),
        };
        ctx.reply(update, text).await;
        Ok(Transition::Stay)
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        let Some(target_id) = self.target.as_ref().map(|target| target.id) else {
            return self.select_target(ctx, update).await;
        };

        if update.command.as_deref() != Some("confirm") {
            ctx.reply(update, "Отправьте /confirm или /abort").await;
            return Ok(Transition::Stay);
        }

        ctx.react(update, "👍").await;
        let result = match self.kind {
            UserActionKind::Approve => ctx.perms.admin_verify(actor, target_id),
            UserActionKind::Reject => ctx.perms.admin_reject(actor, target_id),
            UserActionKind::Ban => ctx.perms.admin_ban(actor, target_id, "заблокирован администратором"),
        };

        match result {
            Ok(updated) => {
                ctx.reply(update, format!("{}\n\n{}", self.kind.done(), describe_actor(&updated)))
                    .await;
            }
            Err(PermsError::AdminPermissionDenied(reason)) => {
                log::warn!("Admin action {} refused: {}", self.kind.name(), reason);
                ctx.reply(update, "Недостаточно прав для этого действия").await;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Transition::Finish)
    }

    async fn select_target(&mut self, ctx: &BotContext, update: &IncomingUpdate) -> HandlerResult {
        if update.is_command() {
            return Err(HandlerError::unknown(update));
        }
        let found = match UserRef::parse(&update.text) {
            None => {
                ctx.reply(update, "Неверный формат пользователя").await;
                return Ok(Transition::Stay);
            }
            Some(UserRef::Username(username)) => ctx.perms.find_actor_by_tg_username(&username)?,
            Some(UserRef::TelegramId(id)) => ctx.perms.find_actor_by_tg_user(id)?,
        };

        match found {
            Some(target) => {
                self.target = Some(target);
                Ok(Transition::Entered)
            }
            None => {
                ctx.reply(update, "Пользователь не найден").await;
                Ok(Transition::Stay)
            }
        }
    }

    pub fn commands(&self) -> Vec<BotCommandSpec> {
        if self.target.is_some() {
            vec![CONFIRM]
        } else {
            Vec::new()
        }
    }

    pub fn help_description(&self) -> String {
        match &self.target {
            None => "Отправьте id пользователя или юзернейм начиная с @".to_string(),
            Some(target) => format!("{}\n\n{}", describe_actor(target), self.kind.question()),
        }
    }
}

/// Sends the list of all known users, then finishes
#[derive(Debug, Default)]
pub struct ListUsers;

impl ListUsers {
    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate) -> HandlerResult {
        let actors = ctx.perms.list_actors()?;
        if actors.is_empty() {
            ctx.reply(update, "Пользователей нет").await;
            return Ok(Transition::Finish);
        }

        let header = format!("Пользователей: {}", actors.len());
        for message in pack_messages(header, actors.iter().map(describe_actor)) {
            ctx.reply(update, message).await;
        }
        Ok(Transition::Finish)
    }
}

/// Leaves room for a list header in the same message
const MAX_ENTRY_CHARS: usize = MAX_MESSAGE_CHARS - 100;

fn truncate_entry(entry: String) -> String {
    if entry.chars().count() <= MAX_ENTRY_CHARS {
        return entry;
    }
    let mut trimmed: String = entry.chars().take(MAX_ENTRY_CHARS - 20).collect();
    trimmed.push_str("\n... (обрезано)");
    trimmed
}

/// Joins entries into as few messages as fit under [`MAX_MESSAGE_CHARS`]
fn pack_messages(header: String, entries: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut messages = Vec::new();
    let mut chunk = header;
    for entry in entries {
        let entry = truncate_entry(entry);
        if !chunk.is_empty() && chunk.chars().count() + entry.chars().count() + 2 > MAX_MESSAGE_CHARS {
            messages.push(std::mem::take(&mut chunk));
        }
        if !chunk.is_empty() {
            chunk.push_str("\n\n");
        }
        chunk.push_str(&entry);
    }
    if !chunk.is_empty() {
        messages.push(chunk);
    }
    messages
}
