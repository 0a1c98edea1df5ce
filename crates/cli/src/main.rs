use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use mudvault_store::SharedStore;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mudvault", about = "MudVault Mesh — inter-MUD communication gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Path to `mudvault.toml` (overrides the usual `./` then config-dir search).
    #[arg(long, global = true, env = "MUDVAULT_CONFIG")]
    config: Option<PathBuf>,

    // Gateway arguments (used when no subcommand is given, or with `gateway`).
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is given).
    Gateway,
    /// Bind a MUD name to an API key (out-of-band registration, §4.3).
    Register {
        mud: String,
        api_key: String,
        /// Out-of-band secret required by `auth.registration_secret`.
        #[arg(long, env = "MUDVAULT_REGISTRATION_SECRET")]
        secret: String,
    },
    /// Re-issue a MUD's API key.
    RotateKey {
        mud: String,
        new_api_key: String,
        #[arg(long, env = "MUDVAULT_REGISTRATION_SECRET")]
        secret: String,
    },
    /// Exchange a registered API key for a bearer session token.
    Token { mud: String, api_key: String },
    /// Print the config file path that would be used.
    ConfigPath,
    /// Validate a config file and print structured diagnostics.
    ConfigValidate,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(feature = "tracing")]
    let registry = registry.with(mudvault_metrics::tracing_integration::metrics_layer());

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false))
            .init();
    }
}

fn load_config(cli: &Cli) -> mudvault_config::MudvaultConfig {
    let mut config = match &cli.config {
        Some(path) => mudvault_config::load_config(path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            mudvault_config::MudvaultConfig::default()
        }),
        None => mudvault_config::discover_and_load(),
    };

    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config
}

/// Connect the shared-state backend named by `store.url`, the same
/// selection [`mudvault_gateway::GatewaySupervisor`] makes — admin commands
/// must agree with the running gateway on which store they're editing.
async fn connect_store(config: &mudvault_config::MudvaultConfig) -> anyhow::Result<Arc<dyn SharedStore>> {
    if config.store.url == "memory" {
        anyhow::bail!(
            "store.url is \"memory\"; admin commands need a shared store \
             (set store.url to a redis:// URL to manage a running gateway)"
        );
    }

    #[cfg(feature = "redis")]
    {
        let store = mudvault_store::redis_backend::RedisStore::connect(&config.store.url).await?;
        return Ok(store);
    }

    #[cfg(not(feature = "redis"))]
    {
        anyhow::bail!("admin commands require the `redis` feature");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "mudvault starting");

    match &cli.command {
        None | Some(Commands::Gateway) => {
            let config = load_config(&cli);
            let supervisor = mudvault_gateway::GatewaySupervisor::new(config).await?;
            supervisor.run().await?;
        },
        Some(Commands::Register { mud, api_key, secret }) => {
            let config = load_config(&cli);
            let store = connect_store(&config).await?;
            let auth = mudvault_auth::AuthService::new(
                store,
                std::time::Duration::from_secs(u64::from(config.auth.session_ttl_days) * 24 * 3600),
                config.auth.registration_secret.clone(),
            );
            auth.register(mud, api_key, secret).await?;
            println!("registered {mud}");
        },
        Some(Commands::RotateKey { mud, new_api_key, secret }) => {
            let config = load_config(&cli);
            let store = connect_store(&config).await?;
            let auth = mudvault_auth::AuthService::new(
                store,
                std::time::Duration::from_secs(u64::from(config.auth.session_ttl_days) * 24 * 3600),
                config.auth.registration_secret.clone(),
            );
            auth.rotate_api_key(mud, new_api_key, secret).await?;
            println!("rotated API key for {mud}");
        },
        Some(Commands::Token { mud, api_key }) => {
            let config = load_config(&cli);
            let store = connect_store(&config).await?;
            let auth = mudvault_auth::AuthService::new(
                store,
                std::time::Duration::from_secs(u64::from(config.auth.session_ttl_days) * 24 * 3600),
                config.auth.registration_secret.clone(),
            );
            let issued = auth.issue_token(mud, api_key).await?;
            println!("{}", issued.token);
        },
        Some(Commands::ConfigPath) => {
            println!("{}", mudvault_config::find_or_default_config_path().display());
        },
        Some(Commands::ConfigValidate) => {
            let result = mudvault_config::validate::validate(cli.config.as_deref());
            for diag in &result.diagnostics {
                println!("[{}] {} ({}): {}", diag.severity, diag.path, diag.category, diag.message);
            }
            if result.diagnostics.is_empty() {
                println!("no issues found");
            }
            if result.has_errors() {
                anyhow::bail!("config validation failed");
            }
        },
    }

    Ok(())
}
