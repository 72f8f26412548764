//! ai-agent server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > config/env > RUST_LOG)
//!   4. Init logger once
//!   5. Build the model provider and the DNS tool
//!   6. Build the agent and the router
//!   7. Spawn SIGINT/SIGTERM → shutdown signal watcher
//!   8. Serve until the shutdown token is cancelled

use tokio_util::sync::CancellationToken;
use tracing::info;

use ai_agent::agent::Agent;
use ai_agent::api::{self, AppState};
use ai_agent::error::AppError;
use ai_agent::llm::providers;
use ai_agent::llm::service::LlmService;
use ai_agent::tools::{Tool, ToolBox, dns::DnsTool};
use ai_agent::{config, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level)?;

    info!(
        env = %config.env,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        llm_type = %config.llm.kind,
        model = %config.llm.active_model(),
        base_url = %config.llm.active().map(|p| p.base_url.as_str()).unwrap_or("-"),
        api_key_set = config.llm_api_key.is_some(),
        "config loaded"
    );

    let provider = providers::build(
        &config.llm,
        config.templates.context.max_tokens,
        config.llm_api_key.clone(),
    )
    .map_err(|e| AppError::Llm(e.to_string()))?;
    info!(provider = provider.name(), "model provider ready");

    let llm = LlmService::from_config(provider, &config.llm);

    let dns = DnsTool::from_config(&config.dns).map_err(|e| AppError::Tool(e.to_string()))?;
    let mut agent = Agent::new(llm.clone(), ToolBox::new(), config.agent.max_tool_rounds);
    agent.add_tool(Tool::Dns(dns));
    info!(dns_api = %config.dns.base_url, max_tool_rounds = config.agent.max_tool_rounds, "agent ready");

    // Shared shutdown token; every SSE relay holds a child of it.
    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone());

    let bind = config.server.bind.clone();
    let router = api::build_router(AppState::new(config, llm, agent, shutdown.clone()));
    api::serve(&bind, router, shutdown).await?;

    info!("shutdown complete");
    Ok(())
}

fn spawn_signal_watcher(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("ctrl-c received, initiating shutdown"),
                        _ = term.recv() => info!("SIGTERM received, initiating shutdown"),
                    }
                }
                Err(e) => {
                    tracing::warn!("cannot install SIGTERM handler: {e}");
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("ctrl-c received, initiating shutdown");
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, initiating shutdown");
            }
        }
        token.cancel();
    });
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: ai-agent [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: {})", config::DEFAULT_CONFIG_PATH);
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!();
                println!("Environment:");
                println!("  AI_AGENT_ENV               dev | test | prod, selects config/config-<env>.toml");
                println!("  AI_AGENT_LOG_LEVEL         Overrides log_level from the config file");
                println!("  LLM_API_KEY                Bearer token for the model endpoint");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // -v warn, -vv info, -vvv debug, -vvvv+ trace (payload dumps)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
