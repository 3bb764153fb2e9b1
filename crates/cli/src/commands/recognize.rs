use workdesk_agent::IntentRecognizer;
use workdesk_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

pub fn run(options: &LoadOptions, text: &str) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "recognize",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let recognizer = match IntentRecognizer::new(config.intent) {
        Ok(recognizer) => recognizer,
        Err(error) => return CommandResult::failure("recognize", "intent_rules", error.to_string(), 4),
    };

    let intent = recognizer.recognize(text);
    let message = match (&intent.suggested_tool, intent.ambiguous) {
        (Some(tool), false) => format!("{} -> {tool}", intent.intent.as_str()),
        _ => intent.clarification.clone().unwrap_or_else(|| intent.intent.as_str().to_string()),
    };
    CommandResult::success_with_data("recognize", message, &intent)
}
