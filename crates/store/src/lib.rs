//! Durable persistence for rules, alerts, notifications, and escalation
//! policies, backed by PostgreSQL via sqlx.
//!
//! The store exclusively owns durable records. Every other component
//! works on transient projections handed out by the typed repos here.

pub mod alerts;
pub mod error;
pub mod filter;
pub mod locks;
pub mod notifications;
pub mod policies;
pub mod rules;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use vigil_core::config::PostgresConfig;

pub use alerts::AlertRepo;
pub use error::StoreError;
pub use locks::AdvisoryLock;
pub use notifications::NotificationRepo;
pub use policies::PolicyRepo;
pub use rules::RuleRepo;

/// Handle bundling the typed repos over one shared pool.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to PostgreSQL and run pending migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let url = config
            .pg_url
            .as_deref()
            .ok_or_else(|| StoreError::Config("PG_URL not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_open_conns)
            .min_connections(config.max_idle_conns)
            .max_lifetime(config.conn_max_lifetime())
            .connect(url)
            .await?;
        info!("PostgreSQL connected");

        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("database migrations applied");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn rules(&self) -> RuleRepo {
        RuleRepo::new(self.pool.clone())
    }

    pub fn alerts(&self) -> AlertRepo {
        AlertRepo::new(self.pool.clone())
    }

    pub fn notifications(&self) -> NotificationRepo {
        NotificationRepo::new(self.pool.clone())
    }

    pub fn policies(&self) -> PolicyRepo {
        PolicyRepo::new(self.pool.clone())
    }

    pub fn advisory(&self) -> AdvisoryLock {
        AdvisoryLock::new(self.pool.clone())
    }
}
