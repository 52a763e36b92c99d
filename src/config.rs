//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::state::AppSettings;

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "washwise")]
#[command(about = "Reservation timer service for shared laundry machines")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, env = "WASHWISE_PORT", default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "WASHWISE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Countdown tick period in milliseconds
    #[arg(long, env = "WASHWISE_TICK_MS", default_value = "1000",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Store poll interval in seconds, used when the store cannot push changes
    #[arg(long, env = "WASHWISE_SYNC_INTERVAL", default_value = "5",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub sync_interval: u64,

    /// JSON file with the machine list (defaults to a built-in laundry room)
    #[arg(short, long, env = "WASHWISE_MACHINES")]
    pub machines: Option<PathBuf>,

    /// Reservation durations offered to users, in minutes
    #[arg(long, env = "WASHWISE_PRESETS", value_delimiter = ',', default_value = "30,45,60")]
    pub presets: Vec<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn app_settings(&self) -> AppSettings {
        AppSettings {
            port: self.port,
            host: self.host.clone(),
            presets_minutes: self.presets.clone(),
            tick_period: self.tick_period(),
            sync_interval: Duration::from_secs(self.sync_interval),
        }
    }
}
