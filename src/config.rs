//! Process configuration: read once from the environment, validated eagerly,
//! and passed into every component. Components never read the environment
//! themselves.
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::util::env::{env_opt, env_parse, env_req};

/// Fixed Ichiba item-search endpoint; the response shape is pinned separately
/// via `formatVersion=2` on every request.
pub const RAKUTEN_API_ENDPOINT: &str =
    "https://app.rakuten.co.jp/services/api/IchibaItem/Search/20170706";

/// Keyword used when `SEARCH_KEYWORD` is unset.
pub const DEFAULT_KEYWORD: &str = "ノートパソコン";

#[derive(Debug, Clone)]
pub struct Config {
    /// Sent as `applicationId`; required only by the collector.
    pub api_key: Option<String>,
    pub api_endpoint: String,
    pub bucket: String,
    pub credentials_path: String,
    pub keyword: String,
    pub shop_code: Option<String>,
    pub hits_per_page: u32,
    pub max_pages: u32,
    pub request_delay: Duration,
    pub output_prefix: String,
    pub db: DbSettings,
    pub raw_schema: String,
    pub raw_table: String,
}

#[derive(Debug, Clone)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// Required only by the loader.
    pub password: Option<String>,
    pub ssl_mode: String,
}

impl Config {
    /// Read the full configuration. Storage settings are required by both
    /// jobs; the API key and database password are enforced by the job that
    /// actually needs them ([`Config::require_api_key`] /
    /// [`Config::database_url`]).
    pub fn from_env() -> Result<Self> {
        let bucket = env_req("GCS_BUCKET_NAME")?;
        let credentials_path = env_req("GOOGLE_APPLICATION_CREDENTIALS")?;
        let delay_secs: f64 = env_parse("REQUEST_DELAY", 1.0);
        let request_delay = if delay_secs.is_finite() && delay_secs > 0.0 {
            Duration::from_secs_f64(delay_secs)
        } else {
            Duration::ZERO
        };

        let cfg = Self {
            api_key: env_opt("RAKUTEN_API_KEY"),
            api_endpoint: RAKUTEN_API_ENDPOINT.to_string(),
            bucket,
            credentials_path,
            keyword: env_opt("SEARCH_KEYWORD").unwrap_or_else(|| DEFAULT_KEYWORD.to_string()),
            shop_code: env_opt("SHOP_CODE"),
            hits_per_page: env_parse("HITS_PER_PAGE", 30),
            max_pages: env_parse("MAX_PAGES", 10),
            request_delay,
            output_prefix: env_opt("OUTPUT_PREFIX").unwrap_or_else(|| "raw/search".to_string()),
            db: DbSettings {
                host: env_opt("POSTGRES_HOST").unwrap_or_else(|| "postgres".to_string()),
                port: env_parse("POSTGRES_PORT", 5432u16),
                database: env_opt("POSTGRES_DB").unwrap_or_else(|| "rakuten_data".to_string()),
                user: env_opt("POSTGRES_USER").unwrap_or_else(|| "datauser".to_string()),
                password: env_opt("POSTGRES_PASSWORD"),
                ssl_mode: env_opt("POSTGRES_SSLMODE").unwrap_or_else(|| "prefer".to_string()),
            },
            raw_schema: env_opt("RAW_SCHEMA").unwrap_or_else(|| "public_raw".to_string()),
            raw_table: env_opt("RAW_TABLE").unwrap_or_else(|| "rakuten_products_raw".to_string()),
        };

        // Redacted snapshot; secrets never appear here.
        info!(
            target = "config",
            bucket = %cfg.bucket,
            keyword = %cfg.keyword,
            shop_code = cfg.shop_code.as_deref().unwrap_or("-"),
            hits = cfg.hits_per_page,
            max_pages = cfg.max_pages,
            prefix = %cfg.output_prefix,
            schema = %cfg.raw_schema,
            table = %cfg.raw_table,
            "configuration loaded"
        );
        Ok(cfg)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("missing required env var RAKUTEN_API_KEY")
    }

    /// Compose the Postgres DSN from the `POSTGRES_*` components.
    ///
    /// Built via `url::Url` so credentials with reserved characters stay
    /// percent-encoded rather than corrupting the DSN.
    pub fn database_url(&self) -> Result<String> {
        let password = self
            .db
            .password
            .as_deref()
            .context("missing required env var POSTGRES_PASSWORD")?;

        let mut out = url::Url::parse("postgresql://localhost")
            .context("failed to seed postgres DSN builder")?;
        out.set_username(&self.db.user)
            .map_err(|_| anyhow!("invalid POSTGRES_USER"))?;
        out.set_password(Some(password))
            .map_err(|_| anyhow!("invalid POSTGRES_PASSWORD"))?;
        out.set_host(Some(&self.db.host))
            .with_context(|| format!("invalid POSTGRES_HOST {:?}", self.db.host))?;
        out.set_port(Some(self.db.port))
            .map_err(|_| anyhow!("invalid POSTGRES_PORT"))?;
        out.set_path(&format!("/{}", self.db.database));
        if self.db.ssl_mode != "disable" {
            out.query_pairs_mut()
                .append_pair("sslmode", &self.db.ssl_mode);
        }
        Ok(out.to_string())
    }
}
