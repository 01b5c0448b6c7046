use crate::api::UserPubKey;
use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Parser, Debug, Default)]
pub struct Args {
    /// Configuration file, looked up with any supported extension.
    #[arg(short, long, default_value = "parimutuel")]
    pub config: String,
    #[arg(short, long)]
    pub admin: Vec<String>,
    #[arg(short, long)]
    pub port: Option<u16>,
    #[arg(short, long)]
    pub db: Option<String>,
    #[arg(short, long)]
    pub owner: Option<String>,
    /// Run with the in-memory test funding source.
    #[arg(long)]
    pub test: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub port: u16,
    /// SQLite connection string, in-memory if unset.
    pub db: Option<String>,
    pub owner: UserPubKey,
    #[serde(default)]
    pub admins: Vec<UserPubKey>,
    /// env_logger filter directives.
    pub log: String,
    /// Set to run with the in-memory test funding source.
    #[serde(default)]
    pub test: bool,
}
impl Settings {
    /// Defaults, then the config file, then `PARIMUTUEL_*` variables, then the command line.
    pub fn load(args: &Args) -> Result<Self> {
        let admins = if args.admin.is_empty() {
            None
        } else {
            Some(args.admin.clone())
        };
        Config::builder()
            .set_default("port", 8081)?
            .set_default("log", "debug")?
            .add_source(File::with_name(&args.config).required(false))
            .add_source(
                Environment::with_prefix("PARIMUTUEL")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admins"),
            )
            .set_override_option("port", args.port.map(i64::from))?
            .set_override_option("db", args.db.clone())?
            .set_override_option("owner", args.owner.clone())?
            .set_override_option("admins", admins)?
            .set_override_option("test", args.test.then_some(true))?
            .build()
            .with_context(|| format!("couldn't read configuration {}", args.config))?
            .try_deserialize()
            .context("invalid configuration")
    }
}
