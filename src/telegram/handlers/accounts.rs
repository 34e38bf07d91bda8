//! Steps that manage the actor's own Minecraft accounts

use uuid::Uuid;

use super::{BotContext, HandlerError, HandlerResult, Transition};
use crate::minecraft::{LookupError, MinecraftLogin};
use crate::perms::PermsError;
use crate::storage::{Actor, MinecraftAccount};
use crate::telegram::types::{BotCommandSpec, IncomingUpdate};

const OFFICIAL: BotCommandSpec = BotCommandSpec::new("official", "Официальный аккаунт");
const CRACKED: BotCommandSpec = BotCommandSpec::new("cracked", "Нет официального аккаунта");

const INVALID_LOGIN: &str =
    "Аккаунт содержит недопустимые символы или слишком короткий или длинный, введите другой";
const NO_ACCOUNTS: &str = "У вас нет зарегистрированных аккаунтов";

pub(crate) fn describe_account(account: &MinecraftAccount) -> String {
    let kind = if account.is_online {
        "официальный"
    } else {
        "без лицензии"
    };
    format!("{} ({})", account.login, kind)
}

fn list_accounts(accounts: &[MinecraftAccount]) -> String {
    accounts
        .iter()
        .map(|account| format!("• {}", describe_account(account)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn limit_exceeded_text(current: usize, max: usize) -> String {
    format!(
        "Превышен лимит аккаунтов ({}/{}), удалите один из аккаунтов командой /remove_login",
        current, max
    )
}

/// Lists the actor's accounts and login limit, then finishes
#[derive(Debug, Default)]
pub struct MyLogins;

impl MyLogins {
    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        let mut text = if actor.minecraft_accounts.is_empty() {
            NO_ACCOUNTS.to_string()
        } else {
            format!("Ваши аккаунты:\n{}", list_accounts(&actor.minecraft_accounts))
        };

        let limit = match ctx.perms.login_limit(actor) {
            Some(limit) => limit.to_string(),
            None => "∞".to_string(),
        };
        text.push_str(&format!(
            "\n\nЛимит аккаунтов: {}/{}",
            actor.minecraft_accounts.len(),
            limit
        ));

        if !actor.accepted {
            text.push_str("\n\n");
            text.push_str(&ctx.not_accepted_hint());
        }

        ctx.reply(update, text).await;
        Ok(Transition::Finish)
    }
}

#[derive(Debug, Clone)]
struct PendingLogin {
    login: MinecraftLogin,
    /// UUID of the licensed account with this name, if the lookup found one
    online_id: Option<Uuid>,
}

/// Registers a new account: asks for a name, then whether it is licensed
#[derive(Debug, Default)]
pub struct AddLogin {
    pending: Option<PendingLogin>,
}

impl AddLogin {
    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match ctx.perms.check_add_login(actor) {
            Ok(()) => {
                ctx.reply(update, "Введите ник аккаунта Minecraft").await;
                Ok(Transition::Stay)
            }
            Err(PermsError::NotAccepted(_)) => {
                ctx.reply(update, ctx.not_accepted_hint()).await;
                Ok(Transition::Finish)
            }
            Err(PermsError::ExceededMaxLogins { current, max }) => {
                ctx.reply(update, limit_exceeded_text(current, max)).await;
                Ok(Transition::Finish)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match &self.pending {
            None => self.process_login(ctx, update, actor).await,
            Some(pending) => {
                let PendingLogin { login, online_id } = pending.clone();
                match update.command.as_deref() {
                    Some("official") => self.finish_adding(ctx, update, actor, login, true, online_id).await,
                    Some("cracked") => self.finish_adding(ctx, update, actor, login, false, None).await,
                    _ => {
                        ctx.reply(update, "Отправьте /official или /cracked").await;
                        Ok(Transition::Stay)
                    }
                }
            }
        }
    }

    async fn process_login(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        if update.is_command() {
            return Err(HandlerError::unknown(update));
        }
        let Ok(login) = MinecraftLogin::parse(&update.text) else {
            ctx.reply(update, INVALID_LOGIN).await;
            return Ok(Transition::Stay);
        };

        if let Some(account) = ctx.perms.find_account(&login)? {
            match account.actor_id {
                Some(owner) if owner == actor.id => {
                    ctx.reply(update, "Вы уже зарегистрировали этот аккаунт").await;
                    return Ok(Transition::Finish);
                }
                Some(_) => {
                    ctx.reply(update, format!("Аккаунт {} уже занят, введите другой", login))
                        .await;
                    return Ok(Transition::Stay);
                }
                None => {}
            }
        }

        match ctx.lookup.online_uuid(&login).await {
            Ok(uuid) => {
                ctx.reply(
                    update,
                    format!(
                        "Найден официальный аккаунт {}. Если он принадлежит вам, отправьте /official, иначе /cracked",
                        login
                    ),
                )
                .await;
                self.pending = Some(PendingLogin {
                    login,
                    online_id: Some(uuid),
                });
                Ok(Transition::Stay)
            }
            Err(LookupError::NoSuchPlayer(_)) => self.finish_adding(ctx, update, actor, login, false, None).await,
            Err(err) => {
                log::warn!("Mojang lookup for {} failed: {}", login, err);
                ctx.reply(
                    update,
                    format!(
                        "Не получилось проверить аккаунт {}. Отправьте /official, если у вас есть лицензия, иначе /cracked",
                        login
                    ),
                )
                .await;
                self.pending = Some(PendingLogin { login, online_id: None });
                Ok(Transition::Stay)
            }
        }
    }

    async fn finish_adding(
        &mut self,
        ctx: &BotContext,
        update: &IncomingUpdate,
        actor: &Actor,
        login: MinecraftLogin,
        is_online: bool,
        online_id: Option<Uuid>,
    ) -> HandlerResult {
        let player_id = if is_online {
            match online_id {
                Some(id) => id,
                None => {
                    ctx.reply(
                        update,
                        "Не удалось получить ID официального аккаунта, попробуйте позже или отправьте /cracked",
                    )
                    .await;
                    return Ok(Transition::Stay);
                }
            }
        } else {
            login.offline_uuid()
        };

        match ctx.perms.assign_login(actor, &login, is_online, player_id) {
            Ok(()) => {}
            Err(PermsError::LoginTaken(_)) => {
                self.pending = None;
                ctx.reply(update, format!("Аккаунт {} уже занят, введите другой", login))
                    .await;
                return Ok(Transition::Stay);
            }
            Err(PermsError::ExceededMaxLogins { current, max }) => {
                ctx.reply(update, limit_exceeded_text(current, max)).await;
                return Ok(Transition::Finish);
            }
            Err(PermsError::NotAccepted(_)) => {
                ctx.reply(update, ctx.not_accepted_hint()).await;
                return Ok(Transition::Finish);
            }
            Err(err) => return Err(err.into()),
        }

        ctx.reply(update, format!("Аккаунт {} добавлен", login)).await;
        if !is_online {
            let actor = ctx.perms.get_actor(actor.id)?;
            let password = issue_password(ctx, &actor, &login).await?;
            ctx.reply(
                update,
                format!(
                    "Пароль для аккаунта {}: {}\nНовый пароль можно получить командой /newpassword",
                    login, password
                ),
            )
            .await;
        }
        Ok(Transition::Finish)
    }

    pub fn commands(&self) -> Vec<BotCommandSpec> {
        if self.pending.is_some() {
            vec![OFFICIAL, CRACKED]
        } else {
            Vec::new()
        }
    }

    pub fn help_description(&self) -> String {
        match &self.pending {
            Some(pending) => format!(
                "Регистрация аккаунта {}: отправьте /official, если у вас есть лицензия, иначе /cracked",
                pending.login
            ),
            None => "Регистрация аккаунта: отправьте ник аккаунта Minecraft".to_string(),
        }
    }
}

/// Generate a password, check it is allowed and deliver it to the server
async fn issue_password(ctx: &BotContext, actor: &Actor, login: &MinecraftLogin) -> Result<String, HandlerError> {
    let password = ctx.perms.generate_password();
    ctx.perms.check_set_password(actor, login, &password)?;
    ctx.passwords.set_password(login, &password).await?;
    Ok(password)
}

/// Detaches one of the actor's accounts
#[derive(Debug, Default)]
pub struct RemoveLogin;

impl RemoveLogin {
    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        if actor.minecraft_accounts.is_empty() {
            ctx.reply(update, NO_ACCOUNTS).await;
            return Ok(Transition::Finish);
        }
        ctx.reply(
            update,
            format!(
                "Какой аккаунт удалить?\n{}",
                list_accounts(&actor.minecraft_accounts)
            ),
        )
        .await;
        Ok(Transition::Stay)
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        if update.is_command() {
            return Err(HandlerError::unknown(update));
        }
        let Ok(login) = MinecraftLogin::parse(&update.text) else {
            ctx.reply(update, INVALID_LOGIN).await;
            return Ok(Transition::Stay);
        };

        match ctx.perms.revoke_login(actor.id, &login) {
            Ok(()) => {
                ctx.reply(update, format!("Аккаунт {} удален", login)).await;
            }
            Err(PermsError::NotYourLogin { .. }) => {
                let owned_by_someone = ctx
                    .perms
                    .find_account(&login)?
                    .is_some_and(|account| account.actor_id.is_some());
                let text = if owned_by_someone {
                    "Этот аккаунт не принадлежит вам"
                } else {
                    "Аккаунт не найден"
                };
                ctx.reply(update, text).await;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Transition::Finish)
    }
}

/// Issues a fresh password for one of the actor's offline accounts
#[derive(Debug, Default)]
pub struct NewPassword;

impl NewPassword {
    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        if actor.minecraft_accounts.is_empty() {
            ctx.reply(update, NO_ACCOUNTS).await;
            return Ok(Transition::Finish);
        }
        ctx.reply(
            update,
            format!(
                "Для какого аккаунта сгенерировать новый пароль?\n{}",
                list_accounts(&actor.minecraft_accounts)
            ),
        )
        .await;
        Ok(Transition::Stay)
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        if update.is_command() {
            return Err(HandlerError::unknown(update));
        }
        let Ok(entered) = MinecraftLogin::parse(&update.text) else {
            ctx.reply(update, INVALID_LOGIN).await;
            return Ok(Transition::Stay);
        };

        let Some(account) = actor
            .minecraft_accounts
            .iter()
            .find(|account| account.login.eq_ignore_ascii_case(entered.as_str()))
        else {
            ctx.reply(update, "Этот аккаунт не принадлежит вам, введите другой").await;
            return Ok(Transition::Stay);
        };

        if account.is_online {
            ctx.reply(update, "Для официального аккаунта пароль не нужен").await;
            return Ok(Transition::Finish);
        }

        let login = MinecraftLogin::parse(&account.login)?;
        let password = issue_password(ctx, actor, &login).await?;
        ctx.reply(update, format!("Новый пароль для аккаунта {}: {}", login, password))
            .await;
        Ok(Transition::Finish)
    }
}
