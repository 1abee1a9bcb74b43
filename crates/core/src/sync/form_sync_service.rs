//! One synchronization run for one form.
//!
//! Stages: fetch metadata, ensure schema, compute watermark, stream and load,
//! audit. Any fatal error ends the run; batches committed before it stay.

use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::batch_loader::BatchLoader;
use super::drift_auditor::{DriftAuditor, DriftSample};
use super::submission_pager::SubmissionPager;
use super::sync_model::{SyncOutcome, SyncStage};
use super::sync_traits::{FormApiTrait, FormTableStoreTrait};
use crate::config::SyncOptions;
use crate::errors::{Error, Result};
use crate::forms::{extract_schema_from_content, AssetDetail, FormLayouts, FormSpec};
use crate::submissions::prepare_rows;

/// Tracks the current stage of a run and logs the stage a failure happened in.
struct RunContext {
    label: String,
    stage: SyncStage,
    started_at: Instant,
}

impl RunContext {
    fn enter(&mut self, stage: SyncStage) {
        debug!("[sync][{}] -> {}", self.label, stage);
        self.stage = stage;
    }

    fn fail(&mut self, err: Error) -> Error {
        error!(
            "[sync][{}] {} after {} ms: {}",
            self.label,
            self.stage,
            self.started_at.elapsed().as_millis(),
            err
        );
        self.stage = SyncStage::Failed;
        err
    }
}

pub struct FormSyncService {
    api: Arc<dyn FormApiTrait>,
    store: Arc<dyn FormTableStoreTrait>,
    options: SyncOptions,
    table_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FormSyncService {
    pub fn new(
        api: Arc<dyn FormApiTrait>,
        store: Arc<dyn FormTableStoreTrait>,
        options: SyncOptions,
    ) -> Self {
        Self {
            api,
            store,
            options,
            table_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    fn table_lock(&self, table: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .table_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(table.to_string()).or_default().clone()
    }

    /// Runs one sync for `form`. The fetched asset detail is cached on the
    /// form; concurrent runs for the same main table are serialized.
    pub async fn run_once(&self, form: &mut FormSpec) -> Result<SyncOutcome> {
        form.validate()?;
        let lock = self.table_lock(&form.main_table);
        let _guard = lock.lock().await;

        let mut ctx = RunContext {
            label: form.label(),
            stage: SyncStage::FetchMetadata,
            started_at: Instant::now(),
        };
        self.run_stages(form, &mut ctx)
            .await
            .map_err(|e| ctx.fail(e))
    }

    async fn run_stages(&self, form: &mut FormSpec, ctx: &mut RunContext) -> Result<SyncOutcome> {
        ctx.enter(SyncStage::FetchMetadata);
        let detail: AssetDetail = match form.asset_detail.clone() {
            Some(detail) => detail,
            None => {
                let detail = self
                    .api
                    .get_asset_detail(&form.api_token, &form.asset_uid)
                    .await?;
                form.asset_detail = Some(detail.clone());
                detail
            }
        };

        ctx.enter(SyncStage::EnsureSchema);
        let schema = extract_schema_from_content(&detail.content)?;
        let layouts = FormLayouts::build(&form.main_table, &schema);
        self.store.ensure_table(&layouts.main).await?;
        for (_, layout) in &layouts.repeats {
            self.store.ensure_table(layout).await?;
        }

        ctx.enter(SyncStage::ComputeWatermark);
        let watermark = self.store.max_submission_id(&layouts.main.name)?;
        info!("[info][{}] last _id = {}", form.main_table, watermark);

        ctx.enter(SyncStage::StreamAndLoad);
        let data_url = self.api.data_url(&detail, &form.asset_uid);
        info!("[info][{}] data endpoint: {}", form.main_table, data_url);
        let roots = schema.repeat_roots();
        let mut sample = DriftSample::new(self.options.sample_rows);
        let mut loader = BatchLoader::new(self.store.as_ref(), &layouts, self.options.batch_size);
        let mut pager = SubmissionPager::new(
            self.api.as_ref(),
            &form.api_token,
            &ctx.label,
            data_url,
            watermark,
        );
        while let Some(page) = pager.next_page().await? {
            for submission in &page {
                let transformed = prepare_rows(submission, &roots);
                sample.observe(&transformed);
                loader.push(transformed).await?;
            }
        }
        let outcome = loader.finish().await?;
        info!(
            "[done][{}] inserted main={}, repeat={}",
            form.main_table, outcome.inserted_main, outcome.inserted_repeat
        );

        ctx.enter(SyncStage::Audit);
        DriftAuditor::new(self.store.as_ref(), &self.options)
            .audit(&schema, &layouts, &sample)
            .await;

        ctx.enter(SyncStage::Done);
        Ok(outcome)
    }
}
