//! Configuration loading and CLI override logic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use redact_utils::{RedactSettings, config::default_settings_path, normalize_path};

use crate::args::RedactArgs;

/// Load redaction settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<RedactSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = RedactSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = RedactSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(RedactSettings::default())
        }
    }
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut RedactSettings, args: &RedactArgs) {
    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(path) = args.face_model.as_deref() {
        settings.models.face_model = Some(path_string(path));
    }
    if let Some(path) = args.person_model.as_deref() {
        settings.models.person_model = Some(path_string(path));
    }

    if let Some(policy) = args.policy_face {
        settings.policy.face = policy;
    }
    if let Some(policy) = args.policy_person {
        settings.policy.person = policy;
    }
    if let Some(policy) = args.policy_plate {
        settings.policy.plate = policy;
    }
    if let Some(scope) = args.selection_scope {
        settings.selection_scope = scope;
    }
    if args.no_plates {
        settings.plates.enabled = false;
    }
    if let Some(scales) = args.scales.as_ref() {
        settings.multiscale.scales = scales.clone();
    }
    if let Some(nms) = args.nms_threshold {
        settings.nms.iou_threshold = nms;
    }

    settings.sanitize();
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
