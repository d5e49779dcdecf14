use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::settings::Settings;
use deskdup_capture::config;

const SETTINGS_FILE: &str = "settings.json";

pub fn deskdup_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("DeskDup"))
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            for (k, v) in overlay_obj {
                match base_obj.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        base_obj.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

fn read_json(path: &Path) -> Value {
    match std::fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed {:?}: {}", path, e);
            serde_json::json!({})
        }),
        Err(_) => serde_json::json!({}),
    }
}

pub fn bootstrap_settings_if_missing(dir: &Path) {
    if dir.join(SETTINGS_FILE).exists() {
        return;
    }

    if let Err(e) = persist_settings_to_disk(dir, &Settings::default()) {
        log::warn!("Failed to bootstrap settings.json: {:#}", e);
    }
}

/// Write `settings` over the file in `dir`, keeping keys this version doesn't know
pub fn persist_settings_to_disk(dir: &Path, settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
    let settings_path = dir.join(SETTINGS_FILE);

    let mut existing_value = read_json(&settings_path);
    if !existing_value.is_object() {
        existing_value = serde_json::json!({});
    }
    let new_value = serde_json::to_value(settings).context("Failed to serialize settings")?;
    merge_json(&mut existing_value, new_value);

    let pretty =
        serde_json::to_string_pretty(&existing_value).context("Failed to serialize settings")?;
    std::fs::write(&settings_path, pretty)
        .with_context(|| format!("Failed to write {:?}", settings_path))?;
    Ok(())
}

pub fn load_settings_from_disk(dir: &Path) -> Settings {
    // First-run bootstrap: seed defaults only if missing.
    bootstrap_settings_if_missing(dir);

    let value = read_json(&dir.join(SETTINGS_FILE));

    // Merge onto current defaults so missing keys don't break deserialization.
    let mut merged =
        serde_json::to_value(Settings::default()).unwrap_or_else(|_| serde_json::json!({}));
    merge_json(&mut merged, value);

    let settings: Settings = serde_json::from_value(merged).unwrap_or_else(|e| {
        log::warn!("Invalid settings.json, using defaults: {}", e);
        Settings::default()
    });

    // Keep a normalized, fully-populated settings.json on disk.
    if let Err(e) = persist_settings_to_disk(dir, &settings) {
        log::warn!("Failed to persist normalized settings: {:#}", e);
    }

    settings
}

/// Apply `DESKDUP_*` overrides read through `lookup`
pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(level) = lookup(config::env::LOG_LEVEL_ENV) {
        settings.log_level = level;
    }

    if let Some(raw) = lookup(config::env::OUTPUT_INDEX_ENV) {
        match raw.trim().parse::<u32>() {
            Ok(index) => settings.output_index = index,
            Err(_) => log::warn!(
                "Ignoring {}={:?}: not an output index",
                config::env::OUTPUT_INDEX_ENV,
                raw
            ),
        }
    }
}

/// Settings file plus process environment
pub fn load_effective_settings() -> Settings {
    let mut settings = match deskdup_config_dir() {
        Some(dir) => load_settings_from_disk(&dir),
        None => {
            log::warn!("Could not find config directory, using default settings");
            Settings::default()
        }
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}
