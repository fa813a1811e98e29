use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use crate::{
    clients::{OpenAiBatchClient, OpenAiSettings, ScoringService},
    config::Config,
    lifecycle::{BatchLifecycleManager, LifecycleSettings},
    observability::Telemetry,
    store::{
        JobStore, RecordStore,
        postgres::{PgJobStore, PgRecordStore},
    },
};

/// Wires configuration, telemetry, stores and the scoring client into a
/// lifecycle manager.
pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    manager: Arc<BatchLifecycleManager>,
}

impl ComponentRegistry {
    /// # Errors
    /// Fails when telemetry, the connection pool or the scoring client cannot
    /// be set up. The pool connects lazily, so an unreachable database only
    /// surfaces on the first pass.
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new().context("failed to initialize telemetry")?;

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections())
            .acquire_timeout(config.db_acquire_timeout())
            .test_before_acquire(true)
            .connect_lazy(config.db_dsn())
            .context("failed to configure database connection pool")?;
        let records: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool.clone()));
        let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

        let scoring: Arc<dyn ScoringService> = Arc::new(
            OpenAiBatchClient::new(OpenAiSettings::from_config(&config))
                .context("failed to build scoring service client")?,
        );

        let manager = Arc::new(BatchLifecycleManager::new(
            scoring,
            records,
            jobs,
            LifecycleSettings::from_config(&config),
            telemetry.metrics(),
        ));

        Ok(Self {
            config,
            telemetry,
            manager,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn manager(&self) -> Arc<BatchLifecycleManager> {
        Arc::clone(&self.manager)
    }
}
