use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the sumcache binary.
#[derive(Debug, Parser)]
#[command(name = "sumcache", version, about = "Memoizing sum service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SUMCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Resolve a single sum against the configured database and print it.
    Sum(SumArgs),
    /// Inspect or clear stored sums.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the SQLite connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the SQLite database file.
    #[arg(long = "database-filename", value_name = "PATH")]
    pub database_filename: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the maximum number of values accepted per sum request.
    #[arg(long = "sums-max-numbers", value_name = "COUNT")]
    pub sums_max_numbers: Option<u64>,

    /// Override the request body limit in bytes.
    #[arg(long = "http-max-body-bytes", value_name = "BYTES")]
    pub http_max_body_bytes: Option<u64>,

    /// Override the rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the rate limit request ceiling.
    #[arg(long = "rate-limit-max-requests", value_name = "COUNT")]
    pub rate_limit_max_requests: Option<u64>,

    /// Allow cross-origin requests from any origin.
    #[arg(
        long = "cors-allow-any-origin",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cors_allow_any_origin: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct SumArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Numbers to add; order does not affect caching.
    #[arg(
        value_name = "NUMBER",
        required = true,
        num_args = 1..,
        allow_negative_numbers = true
    )]
    pub numbers: Vec<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Print every stored sum, most recently used first.
    List(CacheTargetArgs),
    /// Delete every stored sum.
    Clear(CacheTargetArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheTargetArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}
