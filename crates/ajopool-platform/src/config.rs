use anyhow::{Context, Result};

const DEFAULT_PG_POOL_SIZE: u32 = 10;
const DEFAULT_TICK_INTERVAL_SECS: u64 = 86_400;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub pg_pool_size: u32,
    /// How often the scheduler sweeps open cycles. Daily unless overridden.
    pub tick_interval_secs: u64,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        Self::build(http_addr)
    }

    pub fn worker_from_env() -> Result<Self> {
        Self::build(String::new())
    }

    fn build(http_addr: String) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let pg_pool_size = env_or("PG_POOL_SIZE", DEFAULT_PG_POOL_SIZE)?;
        let tick_interval_secs = env_or("TICK_INTERVAL_SECS", DEFAULT_TICK_INTERVAL_SECS)?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            pg_pool_size,
            tick_interval_secs,
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{name} must be a whole number")),
        Err(_) => Ok(default),
    }
}
