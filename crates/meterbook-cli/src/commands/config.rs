use std::path::Path;

use meterbook_core::config::SyncSettings;
use meterbook_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::commands::common::load_settings;
use crate::error::CliError;

const REDACTED: &str = "[REDACTED]";

pub fn run_config(command: ConfigCommands, settings_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { json } => run_config_show(json, settings_path),
        ConfigCommands::Set {
            endpoint,
            group,
            token,
            interval_secs,
            debounce_ms,
        } => {
            let settings = SyncSettings::load(settings_path)?;
            let updated = apply_config_updates(
                settings,
                endpoint,
                group,
                token,
                interval_secs,
                debounce_ms,
            )?;
            updated.save(settings_path)?;
            println!("Saved sync settings to {}", settings_path.display());
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", settings_path.display());
            Ok(())
        }
    }
}

fn run_config_show(as_json: bool, settings_path: &Path) -> Result<(), CliError> {
    let settings = redact(load_settings(settings_path)?);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let scheduler = settings.scheduler_config();
    println!("file:      {}", settings_path.display());
    println!("endpoint:  {}", settings.endpoint.as_deref().unwrap_or("-"));
    println!("group:     {}", settings.group_id.as_deref().unwrap_or("-"));
    println!("token:     {}", settings.token.as_deref().unwrap_or("-"));
    println!("interval:  {}s", scheduler.interval.as_secs());
    println!("debounce:  {}ms", scheduler.debounce.as_millis());
    println!("timeout:   {}s", settings.request_timeout().as_secs());
    Ok(())
}

/// Merge explicit flag values into stored settings and validate the result.
pub fn apply_config_updates(
    settings: SyncSettings,
    endpoint: Option<String>,
    group: Option<String>,
    token: Option<String>,
    interval_secs: Option<u64>,
    debounce_ms: Option<u64>,
) -> Result<SyncSettings, CliError> {
    let updated = SyncSettings {
        endpoint: normalize_text_option(endpoint).or(settings.endpoint),
        group_id: normalize_text_option(group).or(settings.group_id),
        token: normalize_text_option(token).or(settings.token),
        interval_secs: interval_secs.or(settings.interval_secs),
        debounce_ms: debounce_ms.or(settings.debounce_ms),
        request_timeout_secs: settings.request_timeout_secs,
    };
    updated
        .normalized()
        .map_err(|error| CliError::Config(error.to_string()))
}

fn redact(settings: SyncSettings) -> SyncSettings {
    SyncSettings {
        token: settings.token.map(|_| REDACTED.to_string()),
        ..settings
    }
}
