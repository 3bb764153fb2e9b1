pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use workdesk_agent::intent::{Intensity, UseCase};
use workdesk_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "workdesk",
    about = "Workdesk operator CLI",
    long_about = "Classify requests, inspect tools and configuration, and chat with the workspace assistant.",
    after_help = "Examples:\n  workdesk recognize \"start ws-abc123\"\n  workdesk recommend --gpu\n  workdesk chat --user alice --dry-run\n  workdesk doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a workdesk.toml file (must exist when given)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Classify a message and print the recognized intent as JSON")]
    Recognize {
        #[arg(required = true, num_args = 1.., help = "Message text")]
        text: Vec<String>,
    },
    #[command(about = "Recommend workspace bundles for a workload")]
    Recommend {
        #[arg(long, help = "Workload needs a GPU")]
        gpu: bool,
        #[arg(long, help = "Workload includes machine learning or heavy compute")]
        ml: bool,
        #[arg(long, value_enum)]
        intensity: Option<IntensityArg>,
        #[arg(long, value_enum)]
        use_case: Option<UseCaseArg>,
    },
    #[command(about = "List registered tools with their categories and parameter schemas")]
    Tools,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, provider readiness, and store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending SQLite store migrations")]
    Migrate,
    #[command(about = "Chat with the assistant over stdin; type `confirm` to approve a pending action")]
    Chat {
        #[arg(long, default_value = "local")]
        user: String,
        #[arg(long, default_value = "cli")]
        session: String,
        #[arg(long, help = "Use the in-process dry-run provider instead of the HTTP provider")]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IntensityArg {
    Low,
    Medium,
    High,
}

impl From<IntensityArg> for Intensity {
    fn from(value: IntensityArg) -> Self {
        match value {
            IntensityArg::Low => Intensity::Low,
            IntensityArg::Medium => Intensity::Medium,
            IntensityArg::High => Intensity::High,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UseCaseArg {
    Development,
    Design,
    Office,
    DataAnalysis,
}

impl From<UseCaseArg> for UseCase {
    fn from(value: UseCaseArg) -> Self {
        match value {
            UseCaseArg::Development => UseCase::Development,
            UseCaseArg::Design => UseCase::Design,
            UseCaseArg::Office => UseCase::Office,
            UseCaseArg::DataAnalysis => UseCase::DataAnalysis,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    if let Ok(config) = AppConfig::load(options.clone()) {
        logging::init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Recognize { text } => commands::recognize::run(&options, &text.join(" ")),
        Command::Recommend { gpu, ml, intensity, use_case } => {
            commands::recommend::run(commands::recommend::RecommendArgs {
                gpu,
                ml,
                intensity: intensity.map(Into::into),
                use_case: use_case.map(Into::into),
            })
        }
        Command::Tools => commands::tools::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(&options, json) }
        }
        Command::Migrate => commands::migrate::run(&options),
        Command::Chat { user, session, dry_run } => {
            let args = commands::chat::ChatArgs { user, session, dry_run };
            commands::chat::run(&options, &args, io::stdin().lock(), io::stdout())
        }
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
