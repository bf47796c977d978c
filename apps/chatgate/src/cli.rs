use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "chatgate", version, about = "Quota-gated chat completion proxy")]
pub struct Cli {
    /// TOML settings file; `CHATGATE__*` variables override it.
    #[arg(long, env = "CHATGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "CHATGATE_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "CHATGATE_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "CHATGATE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}
