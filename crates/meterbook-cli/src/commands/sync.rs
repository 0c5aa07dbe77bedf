use std::path::Path;

use meterbook_core::sync::{HttpTransport, SyncRun, SyncScheduler};
use meterbook_core::{Error, SyncOutcome, SyncPhase, SyncState, SyncStatus};

use crate::cli::SyncCommands;
use crate::commands::common::{
    anomaly_to_item, format_anomaly_lines, format_sync_timestamp, load_settings, open_store,
    AnomalyItem,
};
use crate::error::CliError;

pub async fn run_sync(
    command: Option<SyncCommands>,
    db_path: &Path,
    settings_path: &Path,
) -> Result<(), CliError> {
    match command.unwrap_or(SyncCommands::Now) {
        SyncCommands::Now => run_sync_now(db_path, settings_path).await,
        SyncCommands::Status { json } => run_sync_status(json, db_path),
        SyncCommands::Join { group } => run_sync_join(&group, db_path, settings_path),
        SyncCommands::Disable => run_sync_disable(db_path),
        SyncCommands::Run => run_sync_loop(db_path, settings_path).await,
        SyncCommands::Anomalies { limit, json } => run_sync_anomalies(limit, json, db_path),
    }
}

/// Scheduler over the configured HTTP endpoint. A device that never joined a
/// group joins the one named in the settings.
fn open_scheduler(
    db_path: &Path,
    settings_path: &Path,
) -> Result<SyncScheduler<HttpTransport>, CliError> {
    let settings = load_settings(settings_path)?;
    let transport = settings
        .http_transport()?
        .ok_or(CliError::SyncNotConfigured)?;
    let store = open_store(db_path)?;
    let scheduler = SyncScheduler::new(store, transport, settings.scheduler_config());

    if let Some(group) = settings.group_id.as_deref() {
        if scheduler.store().sync_state()?.group_id.is_none() {
            tracing::info!("Joining group {} from settings", group);
            join(&scheduler, group)?;
        }
    }
    Ok(scheduler)
}

fn join(scheduler: &SyncScheduler<HttpTransport>, group: &str) -> Result<(), CliError> {
    scheduler.join_group(group)?;
    let endpoint = scheduler.transport().endpoint().to_string();
    scheduler
        .store()
        .update_sync_state(|state| state.endpoint = Some(endpoint))?;
    Ok(())
}

pub async fn run_sync_now(db_path: &Path, settings_path: &Path) -> Result<(), CliError> {
    let scheduler = open_scheduler(db_path, settings_path)?;

    match scheduler.sync_now().await {
        Ok(SyncRun::Completed(report)) => {
            if !report.remote_found {
                println!("Group had no shared snapshot yet; published this device's data");
            }
            println!(
                "Sync completed: {} entries, {} anomalies",
                report.entries,
                report.anomalies.len()
            );
            Ok(())
        }
        Ok(SyncRun::Coalesced) => {
            println!("Sync already in progress");
            Ok(())
        }
        Err(Error::SyncDisabled) => Err(CliError::SyncDisabled),
        Err(error) => Err(error.into()),
    }
}

fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let state = store.sync_state()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    for line in format_sync_state_lines(&state) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_sync_state_lines(state: &SyncState) -> Vec<String> {
    let mut lines = vec![
        format!("device:     {}", state.device_id),
        format!(
            "sync:       {}",
            if state.is_configured() {
                "enabled"
            } else {
                "disabled"
            }
        ),
        format!("group:      {}", state.group_id.as_deref().unwrap_or("-")),
        format!("endpoint:   {}", state.endpoint.as_deref().unwrap_or("-")),
        format!(
            "last sync:  {}",
            format_sync_timestamp(state.last_sync_timestamp)
        ),
    ];

    if !state.devices.is_empty() {
        lines.push("devices:".to_string());
        for (device_id, device) in &state.devices {
            let marker = if *device_id == state.device_id {
                " (this device)"
            } else {
                ""
            };
            lines.push(format!(
                "  {}  last seen {}{marker}",
                device.display_name,
                format_sync_timestamp(device.last_seen)
            ));
        }
    }
    lines
}

fn run_sync_join(group: &str, db_path: &Path, settings_path: &Path) -> Result<(), CliError> {
    let scheduler = open_scheduler(db_path, settings_path)?;
    join(&scheduler, group)?;
    println!("Joined group {}", group.trim());
    Ok(())
}

pub fn run_sync_disable(db_path: &Path) -> Result<(), CliError> {
    open_store(db_path)?.disable_sync()?;
    println!("Sync disabled; local data kept");
    Ok(())
}

async fn run_sync_loop(db_path: &Path, settings_path: &Path) -> Result<(), CliError> {
    let scheduler = open_scheduler(db_path, settings_path)?;
    if !scheduler.store().sync_state()?.is_configured() {
        return Err(CliError::SyncDisabled);
    }

    let mut status = scheduler.subscribe();
    let handle = scheduler.start();
    println!("Syncing in the background; press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if let Some(line) = format_status_line(&current) {
                    println!("{line}");
                }
            }
        }
    }

    handle.shutdown().await;
    println!("Stopped");
    Ok(())
}

/// One line per finished run; `None` while a run is in progress.
pub fn format_status_line(status: &SyncStatus) -> Option<String> {
    match (status.phase, status.last_outcome.as_ref()) {
        (SyncPhase::Idle, Some(SyncOutcome::Synced { at, entries, anomalies })) => Some(format!(
            "{}  synced {entries} entries, {anomalies} anomalies",
            format_sync_timestamp(*at)
        )),
        (SyncPhase::Idle, Some(SyncOutcome::Failed { at, message })) => Some(format!(
            "{}  sync failed: {message}",
            format_sync_timestamp(*at)
        )),
        (SyncPhase::Disabled, _) => Some("sync disabled".to_string()),
        _ => None,
    }
}

fn run_sync_anomalies(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = meterbook_core::db::Database::open(db_path)?;
    let records = db.list_anomalies(limit)?;

    if as_json {
        let json_items = records
            .iter()
            .map(anomaly_to_item)
            .collect::<Vec<AnomalyItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No merge anomalies recorded.");
        return Ok(());
    }

    for line in format_anomaly_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
