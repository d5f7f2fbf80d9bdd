use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connects to `config.database_name` on the server named by
    /// `config.database_url` and applies pending migrations.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let options =
            PgConnectOptions::from_str(&config.database_url)?.database(&config.database_name);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }
}
