//! Thin sqlx pool wrapper shared by everything that talks to the raw sink.
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: keep raw DSNs out of tracing spans (they carry credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(database_url)?;

        // Be explicit when the DSN demands TLS; rustls handles the rest.
        if database_url.contains("sslmode=require") {
            options = options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await?;
        info!("connected to postgres");
        Ok(Self { pool })
    }
}
