//! Configuration management for the Roster server
//!
//! Values come from `conf/application.yml` (or the file given with
//! `--config`), then `roster`-prefixed environment variables, then CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::{Config, Environment};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use roster_cache::RedisConfig;
use roster_common::{
    ChangeChannel, DEFAULT_CONSUMER_GROUP, DEFAULT_GROUP_CHANNEL, DEFAULT_KEY_PREFIX,
    DEFAULT_MEMBERSHIP_CHANNEL, DEFAULT_REFRESH_BACKLOG, DEFAULT_SESSION_POOL_SIZE,
    DEFAULT_USER_CHANNEL,
};
use roster_persistence::{SessionPoolConfig, StorageMode};

use crate::bus::ConsumerSettings;
use crate::startup::LoggingConfig;

const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "roster-server", version, about)]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Storage backend: sql or memory
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<String>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long = "redis-url", env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration using the process arguments.
    pub fn new() -> anyhow::Result<Self> {
        Self::load(Cli::parse())
    }

    pub fn load(args: Cli) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => config::File::from(path.as_path()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut config_builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("roster")
                .separator(".")
                .try_parsing(true),
        );

        if let Some(v) = args.mode {
            config_builder = config_builder.set_override("roster.mode", v)?;
        }
        if let Some(v) = args.database_url {
            config_builder = config_builder.set_override("db.url", v)?;
        }
        if let Some(v) = args.redis_url {
            config_builder = config_builder.set_override("redis.url", v)?;
        }

        let app_config = config_builder
            .build()
            .context("failed to build configuration")?;

        Ok(Configuration { config: app_config })
    }

    // ========================================================================
    // Storage Configuration
    // ========================================================================

    pub fn storage_mode(&self) -> anyhow::Result<StorageMode> {
        match self.config.get_string("roster.mode") {
            Ok(mode) => mode.parse().map_err(anyhow::Error::msg),
            Err(_) => Ok(StorageMode::default()),
        }
    }

    pub fn database_url(&self) -> Option<String> {
        self.config.get_string("db.url").ok()
    }

    /// Whether the roster tables are created at startup when missing
    pub fn auto_create_schema(&self) -> bool {
        self.config
            .get_bool("db.auto_create_schema")
            .unwrap_or(false)
    }

    pub async fn database_connection(&self) -> anyhow::Result<DatabaseConnection> {
        let max_connections = self
            .config
            .get_int("db.pool.max_connections")
            .unwrap_or(16) as u32;
        let min_connections = self
            .config
            .get_int("db.pool.min_connections")
            .unwrap_or(1) as u32;
        let connect_timeout = self
            .config
            .get_int("db.pool.connect_timeout")
            .unwrap_or(30) as u64;
        let acquire_timeout = self
            .config
            .get_int("db.pool.acquire_timeout")
            .unwrap_or(8) as u64;
        let idle_timeout = self.config.get_int("db.pool.idle_timeout").unwrap_or(10) as u64;
        let max_lifetime = self
            .config
            .get_int("db.pool.max_lifetime")
            .unwrap_or(1800) as u64;
        let sqlx_logging = self
            .config
            .get_bool("db.pool.sqlx_logging")
            .unwrap_or(false);

        let url = self
            .database_url()
            .context("db.url is required in sql mode")?;

        let mut opt = ConnectOptions::new(url);

        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .idle_timeout(Duration::from_secs(idle_timeout))
            .max_lifetime(Duration::from_secs(max_lifetime))
            .sqlx_logging(sqlx_logging)
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        tracing::info!(
            max_connections = max_connections,
            min_connections = min_connections,
            connect_timeout = connect_timeout,
            idle_timeout = idle_timeout,
            max_lifetime = max_lifetime,
            sqlx_logging = sqlx_logging,
            "Database connection pool configured"
        );

        let database_connection = Database::connect(opt)
            .await
            .context("connect to database")?;

        Ok(database_connection)
    }

    pub fn session_pool_config(&self) -> SessionPoolConfig {
        let max_sessions = self
            .config
            .get_int("session_pool.max_sessions")
            .unwrap_or(DEFAULT_SESSION_POOL_SIZE as i64)
            .max(1) as usize;
        let acquire_timeout_ms = self
            .config
            .get_int("session_pool.acquire_timeout_ms")
            .unwrap_or(10_000)
            .max(1) as u64;
        SessionPoolConfig {
            max_sessions,
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
        }
    }

    // ========================================================================
    // Redis Configuration
    // ========================================================================

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            url: self
                .config
                .get_string("redis.url")
                .unwrap_or("redis://127.0.0.1:6379".to_string()),
            key_prefix: self
                .config
                .get_string("redis.key_prefix")
                .unwrap_or(DEFAULT_KEY_PREFIX.to_string()),
            refresh_backlog: self
                .config
                .get_int("redis.refresh_backlog")
                .unwrap_or(DEFAULT_REFRESH_BACKLOG as i64)
                .max(1) as usize,
        }
    }

    // ========================================================================
    // Bus Configuration
    // ========================================================================

    pub fn stream_name(&self, channel: ChangeChannel) -> String {
        let (key, default) = match channel {
            ChangeChannel::Group => ("bus.streams.group", DEFAULT_GROUP_CHANNEL),
            ChangeChannel::User => ("bus.streams.user", DEFAULT_USER_CHANNEL),
            ChangeChannel::Membership => ("bus.streams.membership", DEFAULT_MEMBERSHIP_CHANNEL),
        };
        self.config.get_string(key).unwrap_or(default.to_string())
    }

    pub fn consumer_group(&self) -> String {
        self.config
            .get_string("bus.consumer_group")
            .unwrap_or(DEFAULT_CONSUMER_GROUP.to_string())
    }

    /// Consumer name inside the group; stable across restarts so pending
    /// entries are picked up again by the same process.
    pub fn consumer_name(&self) -> String {
        self.config.get_string("bus.consumer_name").unwrap_or_else(|_| {
            let host = hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "localhost".to_string());
            format!("{DEFAULT_CONSUMER_GROUP}-{host}")
        })
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            group: self.consumer_group(),
            consumer: self.consumer_name(),
            batch_size: self.config.get_int("bus.batch_size").unwrap_or(16).max(1) as usize,
            block: Duration::from_millis(
                self.config.get_int("bus.block_ms").unwrap_or(5_000).max(1) as u64,
            ),
            redelivery_interval: Duration::from_millis(
                self.config
                    .get_int("bus.redelivery_interval_ms")
                    .unwrap_or(30_000)
                    .max(1) as u64,
            ),
            discard_malformed: self
                .config
                .get_bool("bus.discard_malformed")
                .unwrap_or(false),
        }
    }

    // ========================================================================
    // Process Configuration
    // ========================================================================

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(
            self.config
                .get_int("roster.shutdown_timeout_ms")
                .unwrap_or(10_000)
                .max(0) as u64,
        )
    }

    /// Logging settings; the `ROSTER_LOG_*` environment variables win over
    /// the config file.
    pub fn logging_config(&self) -> LoggingConfig {
        let from_file = LoggingConfig::from_config(
            self.config.get_string("logs.path").ok(),
            self.config.get_bool("logs.console").unwrap_or(true),
            self.config.get_bool("logs.file").unwrap_or(true),
            self.config
                .get_string("logs.level")
                .unwrap_or("info".to_string()),
        );
        LoggingConfig::from_env_over(from_file)
    }
}
