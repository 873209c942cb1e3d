use clap::{Parser, ValueEnum};
use memory_mcp_http::{
    AccessConfig, JsonRpcDispatcher, McpHandler, ServerConfig, ServerInfo, serve_stdio,
    start_server,
};
use memory_mcp_tools::{
    MemoryApiClient, MemoryApiConfig, MemoryToolbox,
    client::{DEFAULT_MEMORY_API_URL, DEFAULT_USER_ID},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Which transports to serve. HTTP is always on.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RunMode {
    /// HTTP plus JSON-RPC on stdin/stdout.
    #[value(alias = "mcp")]
    Both,
    /// HTTP only; stdin is left alone.
    HttpOnly,
}

/// MCP server over HTTP with an SSE side channel, backed by the memory API.
#[derive(Parser, Debug)]
#[command(name = "memory_mcp_http")]
#[command(version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Interface to bind.
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    bind_host: IpAddr,

    /// Comma-separated CORS origins. A trailing `*` matches by prefix.
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "https://claude.ai,https://claude.ai/code,http://localhost:*"
    )]
    allowed_origins: Vec<String>,

    /// Comma-separated hosts accepted by DNS-rebinding protection.
    #[arg(
        long,
        env = "ALLOWED_HOSTS",
        value_delimiter = ',',
        default_value = "localhost,127.0.0.1"
    )]
    allowed_hosts: Vec<String>,

    /// Hosts ending with this suffix are always accepted.
    #[arg(long, env = "TRUSTED_HOST_SUFFIX", default_value = "railway.app")]
    trusted_host_suffix: String,

    /// Check the Host header of every request.
    #[arg(
        long,
        env = "ENABLE_DNS_REBINDING_PROTECTION",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    enable_dns_rebinding_protection: bool,

    /// Idle time in milliseconds after which a session expires.
    #[arg(long, env = "SESSION_TIMEOUT", default_value_t = 3_600_000)]
    session_timeout_ms: u64,

    /// Base URL of the memory API.
    #[arg(long, env = "RAILWAY_MEMORY_API_URL", default_value = DEFAULT_MEMORY_API_URL)]
    memory_api_url: String,

    /// User that memories and facts are stored under.
    #[arg(long, env = "DEFAULT_USER_ID", default_value = DEFAULT_USER_ID)]
    default_user_id: String,

    /// Name reported in `initialize`.
    #[arg(long, env = "MCP_SERVER_NAME", default_value = "quinn-zep-mcp-server")]
    server_name: String,

    /// Version reported in `initialize`.
    #[arg(long, env = "MCP_SERVER_VERSION", default_value = "1.0.0")]
    server_version: String,

    /// Also answer JSON-RPC on stdin/stdout unless `http-only`.
    #[arg(long, env = "RUN_MODE", value_enum, default_value_t = RunMode::Both)]
    run_mode: RunMode,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::new(self.bind_host, self.port),
            access: AccessConfig {
                allowed_origins: clean_list(&self.allowed_origins),
                allowed_hosts: clean_list(&self.allowed_hosts),
                trusted_host_suffix: self.trusted_host_suffix.trim().to_string(),
                dns_rebinding_protection: self.enable_dns_rebinding_protection,
            },
            session_timeout: Duration::from_millis(self.session_timeout_ms),
            ..ServerConfig::default()
        }
    }

    fn memory_api_config(&self) -> MemoryApiConfig {
        MemoryApiConfig {
            base_url: self.memory_api_url.clone(),
            default_user_id: self.default_user_id.clone(),
            ..MemoryApiConfig::default()
        }
    }

    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server_name.clone(),
            version: self.server_version.clone(),
        }
    }
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging. stdout belongs to the stdio transport.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.server_config();

    let client = MemoryApiClient::new(args.memory_api_config())?;
    let handler = McpHandler::new(Arc::new(MemoryToolbox::new(client)), args.server_info());
    let dispatcher = JsonRpcDispatcher::new(Arc::new(handler));

    tracing::info!("Starting {} v{} on {}", args.server_name, args.server_version, config.bind_addr);
    tracing::info!("Memory API: {}", args.memory_api_url);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    if args.run_mode == RunMode::Both {
        let stdio_dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = serve_stdio(&stdio_dispatcher, stdin, tokio::io::stdout()).await {
                tracing::error!("stdio transport failed: {}", e);
            }
        });
    }

    start_server(config, dispatcher, shutdown).await?;
    Ok(())
}
