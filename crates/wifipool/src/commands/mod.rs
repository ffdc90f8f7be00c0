//! Command dispatch: bridges CLI args -> controller operations -> output.

pub mod config_cmd;
pub mod connection;
pub mod discover;
pub mod poll;
pub mod setup;
pub mod switch;

use wifipool_core::{MemoryHost, PoolController};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an account-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    controller: &PoolController,
    host: &MemoryHost,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Test => connection::handle(controller, global).await,
        Command::Discover => discover::handle(controller, global).await,
        Command::Setup => setup::handle_setup(controller, global).await,
        Command::Status => setup::handle_status(controller, global),
        Command::Poll => poll::handle_poll(controller, host, global).await,
        Command::Watch(args) => poll::handle_watch(controller, args, global).await,
        Command::Flow(args) => poll::handle_flow(controller, args, global).await,
        Command::Switch(args) => switch::handle(controller, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "handled without an account".into(),
        }),
    }
}
