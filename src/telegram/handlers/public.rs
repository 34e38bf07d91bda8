use super::{BotContext, HandlerResult, Transition};
use crate::perms::PermsError;
use crate::storage::Actor;
use crate::telegram::types::{BotCommandSpec, IncomingUpdate};

/// Group-chat handler: answers with reactions and never keeps state
#[derive(Debug, Default)]
pub struct PublicChat;

impl PublicChat {
    pub async fn initial_handle(&mut self, _ctx: &BotContext, _update: &IncomingUpdate, _actor: &Actor) -> HandlerResult {
        Ok(Transition::Finish)
    }

    pub async fn handle_update(&mut self, ctx: &BotContext, update: &IncomingUpdate, actor: &Actor) -> HandlerResult {
        match update.command.as_deref() {
            Some("imhere") => ctx.react(update, "👀").await,
            Some("approve") => {
                let emoji = match ctx.perms.approve_chat(actor, update.chat_id) {
                    Ok(()) => "👍",
                    Err(PermsError::AdminPermissionDenied(_)) => "🗿",
                    Err(err) => {
                        log::error!(
                            "Failed to approve chat {} (update {}): {}",
                            update.chat_id,
                            update.update_id,
                            err
                        );
                        "🙉"
                    }
                };
                ctx.react(update, emoji).await;
            }
            _ => {}
        }
        Ok(Transition::Finish)
    }

    pub fn commands(&self) -> Vec<BotCommandSpec> {
        Vec::new()
    }

    pub fn help_description(&self) -> String {
        String::new()
    }
}
