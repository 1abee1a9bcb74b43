//! Service wiring for the driver.

use std::sync::Arc;

use anyhow::Context;
use formsync_core::config::SyncOptions;
use formsync_core::sync::{
    FormApiTrait, FormSyncService, FormTableStoreTrait, SyncEntryRepositoryTrait,
};
use formsync_kpi::{ClientConfig, KpiClient};
use formsync_storage_sqlite::db::{self, write_actor::spawn_writer};
use formsync_storage_sqlite::{FormTableRepository, SyncEntryRepository};

pub struct ServiceContext {
    pub sync_service: Arc<FormSyncService>,
    pub entry_repository: Arc<dyn SyncEntryRepositoryTrait>,
}

impl ServiceContext {
    /// Opens (and migrates) the database at `db_path` and builds the KPI
    /// client from the environment.
    pub fn initialize(db_path: &str) -> anyhow::Result<Self> {
        let db_path = db::init_file(db_path)
            .with_context(|| format!("Failed to open database at {db_path}"))?;
        db::run_migrations(&db_path)?;
        let pool = db::create_pool(&db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());

        let client_config = ClientConfig::from_env();
        tracing::debug!("Using form API at {}", client_config.api_base);
        let api: Arc<dyn FormApiTrait> =
            Arc::new(KpiClient::new(&client_config).context("Failed to build HTTP client")?);
        let store: Arc<dyn FormTableStoreTrait> =
            Arc::new(FormTableRepository::new(pool.clone(), writer.clone()));
        let entry_repository: Arc<dyn SyncEntryRepositoryTrait> =
            Arc::new(SyncEntryRepository::new(pool, writer));

        Ok(Self::from_parts(
            api,
            store,
            entry_repository,
            SyncOptions::from_env(),
        ))
    }

    pub fn from_parts(
        api: Arc<dyn FormApiTrait>,
        store: Arc<dyn FormTableStoreTrait>,
        entry_repository: Arc<dyn SyncEntryRepositoryTrait>,
        options: SyncOptions,
    ) -> Self {
        Self {
            sync_service: Arc::new(FormSyncService::new(api, store, options)),
            entry_repository,
        }
    }
}
