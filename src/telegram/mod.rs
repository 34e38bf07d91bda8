pub mod api;
pub mod bot;
pub mod engine;
pub mod handlers;
pub mod session;
pub mod types;

pub use api::{ChatApi, TelegramApi};
pub use bot::{create_bot, resolve_bot_username, run_polling};
pub use engine::{ConversationEngine, EngineLimits};
pub use handlers::{BotContext, Handler, HandlerError, Transition};
pub use session::SessionTable;
pub use types::{BotCommandSpec, ChatType, CommandScope, IncomingUpdate, SessionId};
