use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use channel_plugin::{
    message::{CallbackQuery, ChannelMessage, Participant},
    plugin::LogLevel,
};
use clap::{Args, Parser, Subcommand};
use futures::FutureExt;
use greentic_dialog::{
    channel::{CallbackRegistry, ConsoleChannel},
    config::AppConfig,
    flow::{qa::QaFlowConfig, CompletionHandler, FlowCompletion, FlowEngine, FlowRegistry},
    logger::init_tracing,
    schema::write_schema,
    state::{data_to_json, FlowData},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

const CONSOLE_USER: &str = "console-user";
const CONSOLE_CHAT: &str = "console";

#[derive(Parser, Debug)]
#[command(
    name = "greentic-dialog",
    about = "Multi-step dialogs for greentic channels",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Talk to the loaded flows on this terminal
    Run(RunArgs),

    /// Check that a question flow file loads and builds
    Validate { file: PathBuf },

    /// Emit JSON-Schema for the config and flow file formats
    Schema(SchemaArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of .ygtc / .jgtc flows (overrides the config)
    #[arg(long)]
    flows: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<LogLevel>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(long, default_value = "schemas")]
    out: PathBuf,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(args).await,
        Commands::Validate { file } => {
            let flow = QaFlowConfig::load(&file)?.into_flow(None)?;
            println!("✅ flow `{}` with {} questions is valid.", flow.name(), flow.steps().len());
            Ok(())
        }
        Commands::Schema(args) => {
            write_schema(&args.out)?;
            println!("Schemas written to {}", args.out.display());
            Ok(())
        }
    }
}

fn summary_handler() -> CompletionHandler {
    Arc::new(|done: FlowCompletion| {
        async move {
            info!(user_id = %done.user_id, flow = %done.flow, "collected answers");
            let answers = serde_json::to_string_pretty(&data_to_json(&done.data))?;
            println!("bot> Thanks! `{}` is done:\n{answers}", done.flow);
            Ok::<_, anyhow::Error>(())
        }
        .boxed()
    })
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.log.log_level = level;
    }
    if let Some(dir) = args.flows {
        config.flows_dir = dir;
    }
    let _guard = init_tracing(&config.log)?;

    let mut registry = FlowRegistry::new();
    if config.flows_dir.is_dir() {
        let loaded = registry
            .load_dir(&config.flows_dir, Some(summary_handler()))
            .with_context(|| format!("could not read {}", config.flows_dir.display()))?;
        info!(loaded, dir = %config.flows_dir.display(), "flows loaded");
    } else {
        warn!(dir = %config.flows_dir.display(), "flows directory not found, no flows loaded");
    }

    let console = Arc::new(ConsoleChannel::new());
    let callbacks = CallbackRegistry::new(config.callback_ttl_secs);
    let engine = Arc::new(
        FlowEngine::for_channel(registry, console.clone(), callbacks).with_default_error(config.default_error.clone()),
    );

    println!("Flows: {}. Type /start <flow>, /click <button>, /cancel, /flows or /quit.", engine.flow_names().join(", "));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if !line.is_empty() {
            handle_line(&engine, &console, line).await;
        }
    }
    info!("console closed");
    Ok(())
}

async fn handle_line(engine: &Arc<FlowEngine>, console: &Arc<ConsoleChannel>, line: &str) {
    let (command, arg) = line.split_once(' ').map_or((line, ""), |(c, a)| (c, a.trim()));
    match command {
        "/flows" => println!("bot> {}", engine.flow_names().join(", ")),
        "/start" => {
            let engine = engine.clone();
            let flow = arg.to_string();
            tokio::spawn(async move {
                if let Err(e) = engine.start_flow(CONSOLE_USER, CONSOLE_CHAT, &flow, FlowData::new()).await {
                    println!("bot> cannot start `{flow}`: {e}");
                }
            });
        }
        "/cancel" => {
            let engine = engine.clone();
            tokio::spawn(async move {
                if engine.cancel_flow(CONSOLE_USER).await {
                    println!("bot> cancelled.");
                }
            });
        }
        "/click" => match click_message(console, arg).await {
            Some(msg) => dispatch(engine.clone(), msg),
            None => println!("bot> nothing to click."),
        },
        _ => dispatch(
            engine.clone(),
            ChannelMessage::text(CONSOLE_CHAT, CONSOLE_CHAT, Participant::with_id(CONSOLE_USER), line),
        ),
    }
}

/// A button press on the last message with buttons. `choice` is a button
/// number or label; anything else is sent as a raw token.
async fn click_message(console: &ConsoleChannel, choice: &str) -> Option<ChannelMessage> {
    let last = console.last_message().await?;
    let keyboard = last.keyboard.as_ref()?;
    let token = match choice.parse::<usize>() {
        Ok(n) => keyboard.buttons().nth(n.checked_sub(1)?).map(|b| b.data.clone())?,
        Err(_) => keyboard
            .buttons()
            .find(|b| b.text.eq_ignore_ascii_case(choice))
            .map_or_else(|| choice.to_string(), |b| b.data.clone()),
    };
    let query = CallbackQuery {
        id: uuid::Uuid::new_v4().to_string(),
        token,
        message_id: Some(last.id.clone()),
        message_text: last.text_content().map(str::to_string),
    };
    Some(ChannelMessage::callback(CONSOLE_CHAT, CONSOLE_CHAT, Participant::with_id(CONSOLE_USER), query))
}

fn dispatch(engine: Arc<FlowEngine>, msg: ChannelMessage) {
    tokio::spawn(async move {
        match engine.handle_update(&msg).await {
            Ok(true) => {}
            Ok(false) => println!("bot> you are not in a flow; try /flows and /start <flow>"),
            Err(e) if e.is_handled() => error!(error = %e, "flow update failed"),
            Err(e) => warn!(error = %e, "update ignored"),
        }
    });
}
