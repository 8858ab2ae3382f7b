use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use log::{warn, LevelFilter};
use std::collections::HashMap;
use std::time::Duration;

/// Deployment environment the broker is running in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RuntimeEnv {
    Development,
    Staging,
    Production,
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs allowed to receive server responses,
    /// or "*" to allow any origin.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: String,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Seconds of writer idleness before a heartbeat comment is written to a
    /// subscriber stream
    #[arg(long, env, default_value_t = 25)]
    pub heartbeat_interval_secs: u64,

    /// Capacity of each subscriber's send queue. Publishes targeting a full
    /// queue are shed for that subscriber only.
    #[arg(long, env, default_value_t = 256)]
    pub send_queue_capacity: usize,

    /// Service publish credentials as comma-delimited token=service pairs
    #[arg(
        long,
        env,
        value_delimiter = ',',
        default_value = "l5-etl-token=etl,l5-faas-token=function"
    )]
    pub service_tokens: Vec<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::value_parser!(LevelFilter)
    )]
    pub log_level_filter: LevelFilter,

    /// The deployment environment to run as
    #[arg(
        short,
        long,
        env,
        value_enum,
        ignore_case = true,
        default_value = "development"
    )]
    pub runtime_env: RuntimeEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.interface, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// The token-to-service map consumed by the reference service
    /// authenticator. Entries that are not `token=service` pairs are skipped
    /// with a warning.
    pub fn service_token_map(&self) -> HashMap<String, String> {
        let mut tokens = HashMap::new();
        for pair in &self.service_tokens {
            match pair.split_once('=') {
                Some((token, service)) if !token.is_empty() && !service.is_empty() => {
                    tokens.insert(token.trim().to_string(), service.trim().to_string());
                }
                _ => warn!("Skipping malformed service token entry '{pair}'"),
            }
        }
        tokens
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env == RuntimeEnv::Production
    }
}
