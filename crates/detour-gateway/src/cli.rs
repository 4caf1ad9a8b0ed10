use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use detour_core::{PathPolicy, TrailingSlash};
use detour_gateway::GatewaySettings;
use detour_matcher::CacheConfig;
use detour_sync::{PropagatorConfig, SyncConfig};
use detour_telemetry::LogFormat;

pub const LISTEN_ADDR_ENV: &str = "DETOUR_LISTEN_ADDR";
pub const STORAGE_BACKEND_ENV: &str = "DETOUR_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "DETOUR_MYSQL_DSN";
pub const LOG_FORMAT_ENV: &str = "DETOUR_LOG_FORMAT";
pub const LOG_FILTER_ENV: &str = "DETOUR_LOG";
pub const CASE_SENSITIVE_ENV: &str = "DETOUR_CASE_SENSITIVE";
pub const TRAILING_SLASH_ENV: &str = "DETOUR_TRAILING_SLASH";
pub const MAX_HOPS_ENV: &str = "DETOUR_MAX_HOPS";
pub const CACHE_CAPACITY_ENV: &str = "DETOUR_CACHE_CAPACITY";
pub const CACHE_TTL_ENV: &str = "DETOUR_CACHE_TTL_SECS";
pub const SYNC_ENABLED_ENV: &str = "DETOUR_SYNC_ENABLED";
pub const MAX_DEPTH_ENV: &str = "DETOUR_MAX_DEPTH";
pub const PLACEHOLDER_PREFIX_ENV: &str = "DETOUR_PLACEHOLDER_PREFIX";
pub const CONCURRENT_JOBS_ENV: &str = "DETOUR_CONCURRENT_JOBS";
pub const JOB_ATTEMPTS_ENV: &str = "DETOUR_JOB_ATTEMPTS";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrailingSlashArg {
    Strip,
    Keep,
}

impl From<TrailingSlashArg> for TrailingSlash {
    fn from(value: TrailingSlashArg) -> Self {
        match value {
            TrailingSlashArg::Strip => TrailingSlash::Strip,
            TrailingSlashArg::Keep => TrailingSlash::Keep,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "detour-gateway")]
pub struct CLI {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    /// `pretty`, `compact` or `json`.
    #[arg(long, env = LOG_FORMAT_ENV, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// An `EnvFilter` directive; falls back to `RUST_LOG`.
    #[arg(long, env = LOG_FILTER_ENV)]
    pub log_filter: Option<String>,

    #[arg(long, env = CASE_SENSITIVE_ENV, default_value_t = false)]
    pub case_sensitive: bool,

    #[arg(
        long,
        env = TRAILING_SLASH_ENV,
        value_enum,
        default_value_t = TrailingSlashArg::Strip
    )]
    pub trailing_slash: TrailingSlashArg,

    #[arg(long, env = MAX_HOPS_ENV, default_value_t = detour_matcher::DEFAULT_MAX_HOPS)]
    pub max_hops: usize,

    #[arg(long, env = CACHE_CAPACITY_ENV, default_value_t = 10_000)]
    pub cache_capacity: u64,

    #[arg(long, env = CACHE_TTL_ENV)]
    pub cache_ttl_secs: Option<u64>,

    #[arg(long, env = SYNC_ENABLED_ENV, default_value_t = true, action = ArgAction::Set)]
    pub sync_enabled: bool,

    #[arg(long, env = MAX_DEPTH_ENV, default_value_t = 32)]
    pub max_depth: usize,

    #[arg(long, env = PLACEHOLDER_PREFIX_ENV, default_value = "new-")]
    pub placeholder_prefix: String,

    #[arg(long, env = CONCURRENT_JOBS_ENV, default_value_t = 4)]
    pub concurrent_jobs: usize,

    #[arg(long, env = JOB_ATTEMPTS_ENV, default_value_t = 3)]
    pub job_attempts: u32,
}

impl CLI {
    pub fn path_policy(&self) -> PathPolicy {
        PathPolicy::builder()
            .case_sensitive(self.case_sensitive)
            .trailing_slash(self.trailing_slash.into())
            .build()
    }

    pub fn settings(&self) -> GatewaySettings {
        let cache = match self.cache_ttl_secs {
            Some(secs) => CacheConfig::builder()
                .max_capacity(self.cache_capacity)
                .ttl(Duration::from_secs(secs))
                .build(),
            None => CacheConfig::builder()
                .max_capacity(self.cache_capacity)
                .build(),
        };

        GatewaySettings::builder()
            .max_hops(self.max_hops)
            .cache(cache)
            .sync(
                SyncConfig::builder()
                    .enabled(self.sync_enabled)
                    .placeholder_prefix(self.placeholder_prefix.clone())
                    .max_depth(self.max_depth)
                    .path_policy(self.path_policy())
                    .build(),
            )
            .propagation(
                PropagatorConfig::builder()
                    .max_concurrent_jobs(self.concurrent_jobs)
                    .max_attempts(self.job_attempts)
                    .build(),
            )
            .build()
    }
}
