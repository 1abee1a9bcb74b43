//! Subcommand handlers.

use std::path::Path;

use anyhow::{bail, Context};
use formsync_core::forms::{AssetDetail, FormSpec};
use formsync_core::sync::{
    classify_http_status, NewSyncEntry, SyncEntry, SyncEntryOutcome, SyncOutcome,
};
use formsync_core::Error;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::context::ServiceContext;

/// Totals of one pass over the registered entries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub outcome: SyncOutcome,
}

/// Reads an asset detail snapshot from disk. A file holding only the
/// definition (an object with `survey`, or a bare array) is accepted too.
pub fn load_definition(path: &Path) -> anyhow::Result<AssetDetail> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Definition {} is not valid JSON", path.display()))?;
    let detail = match value {
        Value::Object(ref map) if map.contains_key("content") => serde_json::from_value(value)?,
        content => AssetDetail {
            content,
            ..AssetDetail::default()
        },
    };
    Ok(detail)
}

pub fn form_spec_for(entry: &SyncEntry) -> anyhow::Result<FormSpec> {
    let spec = entry.form_spec();
    match entry.definition_path.as_deref() {
        Some(path) => Ok(spec.with_asset_detail(load_definition(Path::new(path))?)),
        None => Ok(spec),
    }
}

pub fn format_outcome(outcome: &SyncOutcome) -> String {
    format!(
        "Inserted main={}, repeats={}",
        outcome.inserted_main, outcome.inserted_repeat
    )
}

fn log_failure(label: &str, err: &Error) {
    match err {
        Error::Transport {
            status: Some(status),
            ..
        } => error!(
            "[{}] sync failed ({:?}): {}",
            label,
            classify_http_status(*status),
            err
        ),
        _ => error!("[{}] sync failed: {}", label, err),
    }
}

pub async fn add(ctx: &ServiceContext, entry: NewSyncEntry) -> anyhow::Result<()> {
    if let Some(path) = entry.definition_path.as_deref() {
        load_definition(Path::new(path))?;
    }
    let created = ctx.entry_repository.create(entry).await?;
    println!(
        "Registered entry {}: {} -> {}",
        created.id, created.asset_uid, created.main_table
    );
    Ok(())
}

pub fn list(ctx: &ServiceContext) -> anyhow::Result<()> {
    let entries = ctx.entry_repository.list()?;
    if entries.is_empty() {
        println!("No forms registered.");
        return Ok(());
    }
    for entry in entries {
        let last_sync = entry
            .last_sync_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let state = match (&entry.last_sync_at, entry.status) {
            (None, _) => "pending",
            (Some(_), true) => "ok",
            (Some(_), false) => "failed",
        };
        println!(
            "{}\t{}\t{} -> {}\t{}\t{}{}",
            entry.id,
            entry.name,
            entry.asset_uid,
            entry.main_table,
            state,
            last_sync,
            entry
                .last_error
                .map(|e| format!("\t{e}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn remove(ctx: &ServiceContext, id: i32) -> anyhow::Result<()> {
    if !ctx.entry_repository.delete(id).await? {
        bail!("No sync entry with id {id}");
    }
    println!("Removed entry {id}");
    Ok(())
}

/// Runs every selected entry once, in id order, recording each outcome.
/// A failing entry does not stop the pass.
pub async fn sync_pass(ctx: &ServiceContext, only: Option<i32>) -> anyhow::Result<PassSummary> {
    let entries = match only {
        Some(id) => match ctx.entry_repository.get(id)? {
            Some(entry) => vec![entry],
            None => bail!("No sync entry with id {id}"),
        },
        None => ctx.entry_repository.list()?,
    };
    if entries.is_empty() {
        warn!("No forms registered; nothing to sync");
    }

    let mut summary = PassSummary::default();
    for entry in entries {
        let result = match form_spec_for(&entry) {
            Ok(mut spec) => ctx
                .sync_service
                .run_once(&mut spec)
                .await
                .map_err(|err| {
                    log_failure(&spec.label(), &err);
                    err.to_string()
                }),
            Err(err) => {
                error!("[{}] cannot load cached definition: {:#}", entry.name, err);
                Err(format!("{err:#}"))
            }
        };

        let outcome = match result {
            Ok(outcome) => {
                println!("[{}] {}", entry.name, format_outcome(&outcome));
                summary.succeeded += 1;
                summary.outcome.inserted_main += outcome.inserted_main;
                summary.outcome.inserted_repeat += outcome.inserted_repeat;
                SyncEntryOutcome::Succeeded
            }
            Err(message) => {
                summary.failed += 1;
                SyncEntryOutcome::Failed(message)
            }
        };
        if let Err(err) = ctx.entry_repository.record_outcome(entry.id, outcome).await {
            warn!("Failed to record outcome for entry {}: {}", entry.id, err);
        }
    }
    Ok(summary)
}

/// Repeats [`sync_pass`] forever, sleeping `interval_secs` between passes.
pub async fn sync_loop(
    ctx: &ServiceContext,
    only: Option<i32>,
    interval_secs: u64,
) -> anyhow::Result<()> {
    loop {
        let summary = sync_pass(ctx, only).await?;
        info!(
            "Pass finished: {} ok, {} failed, {}; next in {}s",
            summary.succeeded,
            summary.failed,
            format_outcome(&summary.outcome),
            interval_secs
        );
        tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
    }
}

/// One run for a form that is not registered.
pub async fn run_adhoc(ctx: &ServiceContext, mut spec: FormSpec) -> anyhow::Result<SyncOutcome> {
    let outcome = ctx.sync_service.run_once(&mut spec).await.map_err(|err| {
        log_failure(&spec.label(), &err);
        err
    })?;
    println!("{}", format_outcome(&outcome));
    Ok(outcome)
}
