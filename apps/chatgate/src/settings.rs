use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

use chatgate_core::GateConfig;

use crate::cli::Cli;

const ENV_PREFIX: &str = "CHATGATE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub kv: KvSettings,
    pub events: EventSettings,
    #[serde(flatten)]
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Redis-over-REST ledger and user store. Unset means in-memory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KvSettings {
    pub url: Option<String>,
    pub token: Option<String>,
}

/// Message stream for transaction and file events. Unset means log only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(path.as_path()));
        } else if Path::new("chatgate.toml").exists() {
            builder = builder.add_source(File::with_name("chatgate.toml"));
        }
        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("access.codes")
                    .try_parsing(true),
            )
            .set_override_option("server.host", cli.host.clone())?
            .set_override_option("server.port", cli.port.map(i64::from))?;

        builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }
}
