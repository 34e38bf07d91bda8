use super::{format_commands, BotContext, HandlerError, HandlerResult, Step, Transition};
use crate::storage::Actor;
use crate::telegram::types::{BotCommandSpec, IncomingUpdate};

const HELP: BotCommandSpec = BotCommandSpec::new("help", "Показать список команд");
const ABORT: BotCommandSpec = BotCommandSpec::new("abort", "Вернуться в главное меню");

/// Adds `/start`, `/help` and `/abort` to every private step and answers
/// commands the step does not know.
pub struct CommonWrapper {
    inner: Step,
}

impl CommonWrapper {
    pub fn new(inner: Step) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Step {
        &self.inner
    }

    pub async fn initial_handle(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        self.inner.initial_handle(ctx, update, actor).await
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match update.command.as_deref() {
            Some("start") | Some("help") => {
                ctx.reply(update, self.help_description()).await;
                return Ok(Transition::Stay);
            }
            Some("abort") => {
                ctx.reply(update, "Ок").await;
                return Ok(Transition::Finish);
            }
            _ => {}
        }

        match self.inner.handle_update(ctx, update, actor).await {
            Err(HandlerError::UnknownCommand(command)) => {
                let head = if command.is_empty() {
                    "Требуется команда".to_string()
                } else {
                    format!("Неизвестная команда /{}", command)
                };
                ctx.reply(update, format!("{}\n\n{}", head, format_commands(&self.commands())))
                    .await;
                Ok(Transition::Stay)
            }
            other => other,
        }
    }

    pub fn commands(&self) -> Vec<BotCommandSpec> {
        let mut commands = vec![HELP, ABORT];
        commands.extend(self.inner.commands());
        commands
    }

    pub fn help_description(&self) -> String {
        format!("{}\n\n{}", self.inner.help_description(), format_commands(&self.commands()))
    }
}
