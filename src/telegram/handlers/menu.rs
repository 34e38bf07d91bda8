use super::{AddLogin, BotContext, HandlerError, HandlerResult, ListUsers, MyLogins, NewPassword, RemoveLogin};
use super::{Transition, UserAction, UserActionKind};
use crate::storage::Actor;
use crate::telegram::types::{BotCommandSpec, IncomingUpdate};

const MY_LOGINS: BotCommandSpec = BotCommandSpec::new("my_logins", "Список ваших аккаунтов");
const ADD_LOGIN: BotCommandSpec = BotCommandSpec::new("add_login", "Зарегистрировать аккаунт на сервере");
const REMOVE_LOGIN: BotCommandSpec = BotCommandSpec::new("remove_login", "Удалить аккаунт с сервера");
const NEW_PASSWORD: BotCommandSpec = BotCommandSpec::new("newpassword", "Сгенерировать новый пароль для аккаунта");
const APPROVE_USER: BotCommandSpec = BotCommandSpec::new("approve_user", "Одобрить пользователя");
const REJECT_USER: BotCommandSpec = BotCommandSpec::new("reject_user", "Отклонить пользователя");
const BAN_USER: BotCommandSpec = BotCommandSpec::new("ban_user", "Заблокировать пользователя");
const LIST_USERS: BotCommandSpec = BotCommandSpec::new("list_users", "Список пользователей");

/// The private-chat conversation steps
pub enum Step {
    Menu(PrivateMenu),
    MyLogins(MyLogins),
    AddLogin(AddLogin),
    RemoveLogin(RemoveLogin),
    NewPassword(NewPassword),
    UserAction(UserAction),
    ListUsers(ListUsers),
}

impl Step {
    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match self {
            Step::Menu(menu) => menu.initial_handle(actor),
            Step::MyLogins(step) => step.initial_handle(ctx, update, actor).await,
            Step::AddLogin(step) => step.initial_handle(ctx, update, actor).await,
            Step::RemoveLogin(step) => step.initial_handle(ctx, update, actor).await,
            Step::NewPassword(step) => step.initial_handle(ctx, update, actor).await,
            Step::UserAction(step) => step.initial_handle(ctx, update).await,
            Step::ListUsers(step) => step.initial_handle(ctx, update).await,
        }
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match self {
            Step::Menu(menu) => {
                let next = menu.select(update, actor)?;
                *self = next;
                Ok(Transition::Entered)
            }
            Step::MyLogins(_) | Step::ListUsers(_) => Ok(Transition::Finish),
            Step::AddLogin(step) => step.handle_update(ctx, update, actor).await,
            Step::RemoveLogin(step) => step.handle_update(ctx, update, actor).await,
            Step::NewPassword(step) => step.handle_update(ctx, update, actor).await,
            Step::UserAction(step) => step.handle_update(ctx, update, actor).await,
        }
    }

    pub fn commands(&self) -> Vec<BotCommandSpec> {
        match self {
            Step::Menu(menu) => menu.commands(),
            Step::AddLogin(step) => step.commands(),
            Step::UserAction(step) => step.commands(),
            Step::MyLogins(_) | Step::RemoveLogin(_) | Step::NewPassword(_) | Step::ListUsers(_) => Vec::new(),
        }
    }

    pub fn help_description(&self) -> String {
        match self {
            Step::Menu(_) => "Главное меню".to_string(),
            Step::MyLogins(_) => "Список ваших аккаунтов".to_string(),
            Step::AddLogin(step) => step.help_description(),
            Step::RemoveLogin(_) => "Удаление аккаунта: отправьте ник аккаунта, который нужно удалить".to_string(),
            Step::NewPassword(_) => "Новый пароль: отправьте ник аккаунта, для которого нужен пароль".to_string(),
            Step::UserAction(step) => step.help_description(),
            Step::ListUsers(_) => "Список пользователей".to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Menu(_) => "menu",
            Step::MyLogins(_) => "my_logins",
            Step::AddLogin(_) => "add_login",
            Step::RemoveLogin(_) => "remove_login",
            Step::NewPassword(_) => "new_password",
            Step::UserAction(step) => step.kind().name(),
            Step::ListUsers(_) => "list_users",
        }
    }
}

/// Main menu of a private chat; admin commands are listed only for admins
pub struct PrivateMenu {
    show_admin: bool,
}

impl PrivateMenu {
    pub fn new(actor: Option<&Actor>) -> Self {
        Self {
            show_admin: actor.is_some_and(|actor| actor.is_admin),
        }
    }

    fn initial_handle(&mut self, actor: &Actor) -> HandlerResult {
        self.show_admin = actor.is_admin;
        Ok(Transition::Stay)
    }

    fn select(&mut self, update: &IncomingUpdate, actor: &Actor) -> Result<Step, HandlerError> {
        self.show_admin = actor.is_admin;
        let admin = actor.is_admin;
        let step = match update.command.as_deref().unwrap_or_default() {
            "my_logins" => Step::MyLogins(MyLogins),
            "add_login" => Step::AddLogin(AddLogin::default()),
            "remove_login" => Step::RemoveLogin(RemoveLogin),
            "newpassword" => Step::NewPassword(NewPassword),
            "approve_user" if admin => Step::UserAction(UserAction::new(UserActionKind::Approve)),
            "reject_user" if admin => Step::UserAction(UserAction::new(UserActionKind::Reject)),
            "ban_user" if admin => Step::UserAction(UserAction::new(UserActionKind::Ban)),
            "list_users" if admin => Step::ListUsers(ListUsers),
            _ => return Err(HandlerError::unknown(update)),
        };
        Ok(step)
    }

    fn commands(&self) -> Vec<BotCommandSpec> {
        let mut commands = vec![MY_LOGINS, ADD_LOGIN, REMOVE_LOGIN, NEW_PASSWORD];
        if self.show_admin {
            commands.extend([APPROVE_USER, REJECT_USER, BAN_USER, LIST_USERS]);
        }
        commands
    }
}
