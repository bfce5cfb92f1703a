mod hosts;
mod render;
mod session;
mod stacks;

use stack_model::SequenceKind;

use crate::cli::Command;
use crate::config::Settings;
use crate::runtime::ConsoleHandle;

use session::Session;

/// Runs one CLI command against the console runtime. `Ok(false)` means the
/// command ran but reported a failure.
pub(crate) async fn run(
    command: Command,
    settings: &Settings,
    handle: &ConsoleHandle,
) -> anyhow::Result<bool> {
    let mut session = Session::new(handle);
    match command {
        Command::Discover { json, watch } => stacks::discover(&mut session, json, watch).await,
        Command::Status { stack, watch } => stacks::status(&mut session, &stack, watch).await,
        Command::Up { stack } => {
            stacks::run_stack_sequence(&mut session, settings, SequenceKind::Up, &stack).await
        }
        Command::Down { stack } => {
            stacks::run_stack_sequence(&mut session, settings, SequenceKind::Down, &stack).await
        }
        Command::Pull { stack } => {
            stacks::run_stack_sequence(&mut session, settings, SequenceKind::Pull, &stack).await
        }
        Command::Refresh { stack } => {
            stacks::run_stack_sequence(&mut session, settings, SequenceKind::Refresh, &stack).await
        }
        Command::Prune { host } => stacks::prune(&mut session, settings, &host).await,
        Command::Hosts(command) => hosts::run(&mut session, settings, command).await,
    }
}
