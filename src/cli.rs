use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "subchat-sentry")]
#[command(author, version, about = "Telegram bot for self-service Minecraft account registration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot with long polling (default)
    Run,

    /// Publish the default private-chat command menu and exit
    InitCommands,

    /// Apply database migrations and exit
    Migrate,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
