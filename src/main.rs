use opsbridge::audit::AuditLogger;
use opsbridge::config::{Config, ConfigError};
use opsbridge::llm::{GenerativeClient, OfflineClient, OpenAIClient};
use opsbridge::{AppResult, OperatorBridge};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn init_logging() {
    // Use RUST_LOG if set, otherwise default to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config, writing the defaults on first run
fn load_config() -> AppResult<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(ConfigError::ReadError(e)) if e.kind() == ErrorKind::NotFound => {
            let config = Config::default_config();
            config.save()?;
            warn!(path = %Config::config_path()?.display(), "wrote default config");
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

fn build_client(config: &Config) -> AppResult<Arc<dyn GenerativeClient>> {
    match config.get_api_key() {
        Some(key) => {
            let client = OpenAIClient::with_model(key, config.llm.model.clone())?;
            info!(model = %client.model(), "generative client ready");
            Ok(Arc::new(client))
        }
        None => {
            warn!(env = %config.llm.api_key_env, "no API key, /patch and advisory mode disabled");
            Ok(Arc::new(OfflineClient::new(config.llm.api_key_env.clone())))
        }
    }
}

/// Split an inbound line into sender and text; `@sender text` overrides the operator
fn split_sender<'a>(line: &'a str, operator: &'a str) -> (&'a str, &'a str) {
    if let Some(rest) = line.strip_prefix('@') {
        let (sender, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        return (sender, text);
    }
    (operator, line)
}

async fn run() -> AppResult<()> {
    let config = load_config()?;

    if config.operator.id.trim().is_empty() {
        eprintln!(
            "Error: operator.id is not set. Edit {} and restart.",
            Config::config_path()?.display()
        );
        std::process::exit(1);
    }

    let audit = match AuditLogger::new(config.operator.id.clone()) {
        Ok(audit) => Some(Arc::new(audit)),
        Err(e) => {
            warn!(error = %e, "audit log disabled");
            None
        }
    };

    let client = build_client(&config)?;
    let mut bridge = OperatorBridge::from_config(&config, client, audit)?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            ctrl_c.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        let (sender, text) = split_sender(line.trim(), &config.operator.id);
        if let Some(reply) = bridge.handle(sender, text, &shutdown).await {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n\n").await?;
            stdout.flush().await?;
        }
    }

    info!("bridge stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        error!(error = %e, "fatal");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
