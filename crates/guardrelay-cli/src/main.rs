mod render;
mod theme;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use guardrelay_core::config::{Settings, default_config_path};
use guardrelay_core::context::ContextMode;
use guardrelay_core::logging::{self, LogConfig};
use guardrelay_core::{ChatSession, Pipeline, UnreachablePolicy};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::theme as t;

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "guardrelay",
    version,
    about = "Chat with an LLM through a threat-scanning security gateway"
)]
struct Cli {
    /// Settings file (default: ~/.guardrelay/config.toml)
    #[arg(long, short, value_name = "PATH", env = "GUARDRELAY_CONFIG")]
    config: Option<PathBuf>,
    /// Security gateway scan endpoint
    #[arg(long, value_name = "URL")]
    gateway_url: Option<String>,
    /// Backend model name
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,
    /// What to send upstream each turn (single-message, full-history)
    #[arg(long, value_name = "MODE")]
    context_mode: Option<ContextMode>,
    /// Withhold messages when the gateway cannot be reached
    #[arg(long)]
    fail_closed: bool,
    /// Send one message and exit instead of starting a chat
    #[arg(long, short, value_name = "TEXT")]
    message: Option<String>,
    /// Debug logging on stderr
    #[arg(long, short)]
    verbose: bool,
    /// Disable coloured output
    #[arg(long)]
    no_color: bool,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(url) = &self.gateway_url {
            settings.gateway.url = Some(url.clone());
        }
        if let Some(model) = &self.model {
            settings.backend.model = model.clone();
        }
        if let Some(mode) = self.context_mode {
            settings.pipeline.context_mode = mode;
        }
        if self.fail_closed {
            settings.gateway.on_unreachable = UnreachablePolicy::FailClosed;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut settings = Settings::load(Some(path.as_path()))
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    settings
        .apply_process_env()
        .context("invalid value in environment")?;
    cli.apply_overrides(&mut settings);
    settings.validate().context("invalid configuration")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    t::init_color(cli.no_color);
    logging::init(if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::from_env()
    });

    let settings = load_settings(&cli)?;
    let mut pipeline = Pipeline::with_http(
        settings.gateway_config(),
        settings.backend_config(),
        settings.pipeline_options(),
        settings.gateway_timeout(),
        settings.backend_timeout(),
    )
    .context("failed to build HTTP clients")?;
    let mut session = ChatSession::new();

    if let Some(text) = cli.message.as_deref() {
        return Ok(run_once(&pipeline, &mut session, text).await);
    }

    print_banner(&pipeline);
    chat_loop(&mut pipeline, &mut session).await?;
    Ok(ExitCode::SUCCESS)
}

async fn run_once(pipeline: &Pipeline, session: &mut ChatSession, text: &str) -> ExitCode {
    match pipeline.run_turn(session, text).await {
        Ok(outcome) => {
            let replied = outcome.reply().is_some();
            print_lines(&render::last_turn_lines(session));
            if replied {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("{}", t::icon_fail(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

fn print_banner(pipeline: &Pipeline) {
    println!("{}", t::bold("guardrelay"));
    let gateway = pipeline.gateway();
    let gateway_label = if gateway.is_configured() {
        gateway.url.clone().unwrap_or_default()
    } else {
        "not configured (messages are not scanned)".to_string()
    };
    println!("{}", t::label_value("Gateway", &gateway_label));
    println!("{}", t::label_value("Model  ", &pipeline.backend().model));
    println!(
        "{}",
        t::label_value("Context", &pipeline.options().context_mode.to_string())
    );
    println!(
        "{}",
        t::muted("Commands: /clear, /mode <single-message|full-history>, /model <name>, /quit")
    );
}

/// Handle `/model <name>` and return the line to print.
fn switch_model(pipeline: &mut Pipeline, arg: &str) -> String {
    let name = arg.trim();
    if name.is_empty() {
        let current = &pipeline.backend().model;
        let usage = format!("Usage: /model <name> (current: {current})");
        return t::icon_warn(&usage);
    }
    pipeline.set_model(name);
    t::icon_ok(&format!("Model: {name}"))
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn prompt() -> Result<()> {
    print!("{} ", t::accent("you>"));
    std::io::stdout().flush().context("failed to flush stdout")
}

async fn chat_loop(pipeline: &mut Pipeline, session: &mut ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let input = line.trim();
        let (command, arg) = input
            .split_once(char::is_whitespace)
            .unwrap_or((input, ""));
        match command {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_history();
                println!("{}", t::icon_ok("History cleared"));
            }
            "/mode" => match arg.trim().parse::<ContextMode>() {
                Ok(mode) => {
                    pipeline.set_context_mode(mode);
                    println!("{}", t::icon_ok(&format!("Context mode: {mode}")));
                }
                Err(_) => println!(
                    "{}",
                    t::icon_warn("Usage: /mode <single-message|full-history>")
                ),
            },
            "/model" => println!("{}", switch_model(pipeline, arg)),
            _ => {
                let ran = pipeline.run_turn(session, input).await.map(|_| ());
                match ran {
                    Ok(()) => print_lines(&render::last_turn_lines(session)),
                    Err(e) => println!("{}", t::icon_warn(&e.to_string())),
                }
            }
        }
        prompt()?;
    }
    println!();
    Ok(())
}
