use std::io::{BufRead, Write};

use serde_json::{Map, Value};
use tracing::warn;
use workdesk_agent::TurnOutcome;
use workdesk_core::config::{AppConfig, LoadOptions};
use workdesk_core::errors::ApplicationError;

use crate::bootstrap::build_runtime;
use crate::commands::{current_thread_runtime, CommandResult};

const CONFIRM_WORDS: &[&str] = &["confirm", "yes", "y"];
const EXIT_WORDS: &[&str] = &["exit", "quit"];

#[derive(Clone, Debug)]
pub struct ChatArgs {
    pub user: String,
    pub session: String,
    pub dry_run: bool,
}

/// A destructive request the assistant asked the user to approve.
///
/// Held only by this client loop; approving re-sends the same tool and
/// parameters with the confirmation flag.
struct PendingConfirmation {
    tool: String,
    params: Value,
}

pub fn run<R: BufRead, W: Write>(
    options: &LoadOptions,
    args: &ChatArgs,
    input: R,
    mut output: W,
) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let agent = match runtime.block_on(build_runtime(&config, args.dry_run)) {
        Ok(agent) => agent,
        Err(error) => return CommandResult::failure("chat", "bootstrap", error.to_string(), 4),
    };

    let mut pending: Option<PendingConfirmation> = None;
    let mut turns = 0usize;

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => return CommandResult::failure("chat", "io", error.to_string(), 1),
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let lowered = text.to_ascii_lowercase();
        if EXIT_WORDS.contains(&lowered.as_str()) {
            break;
        }

        let reply = if CONFIRM_WORDS.contains(&lowered.as_str()) {
            match pending.take() {
                Some(request) => {
                    let turn = runtime.block_on(agent.handle_confirmation(
                        &args.user,
                        &args.session,
                        &request.tool,
                        request.params,
                    ));
                    settle(turn, &mut pending)
                }
                None => "Nothing is waiting for confirmation.".to_string(),
            }
        } else {
            let turn = runtime.block_on(agent.handle_message(&args.user, &args.session, text));
            settle(turn, &mut pending)
        };
        turns += 1;

        if let Err(error) = writeln!(output, "{reply}") {
            return CommandResult::failure("chat", "io", error.to_string(), 1);
        }
    }

    CommandResult::success("chat", format!("session `{}` ended after {turns} turns", args.session))
}

fn settle(
    turn: Result<TurnOutcome, ApplicationError>,
    pending: &mut Option<PendingConfirmation>,
) -> String {
    match turn {
        Ok(outcome) => {
            *pending = pending_from(&outcome);
            match pending {
                Some(_) => format!("{} (type `confirm` to proceed)", outcome.reply),
                None => outcome.reply,
            }
        }
        Err(error) => {
            warn!(event_name = "cli.chat.turn_failed", error = %error, "chat turn failed");
            *pending = None;
            let interface = error.into_interface("cli-chat");
            format!("Something went wrong handling that message. {}", interface.user_message())
        }
    }
}

fn pending_from(outcome: &TurnOutcome) -> Option<PendingConfirmation> {
    let result = outcome.result.as_ref()?;
    if !result.requires_confirmation {
        return None;
    }
    let tool = outcome.tool.clone()?;
    let params = outcome
        .intent
        .entities
        .iter()
        .filter(|(key, _)| key.as_str() != "confirmed")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<Map<_, _>>();
    Some(PendingConfirmation { tool, params: Value::Object(params) })
}
