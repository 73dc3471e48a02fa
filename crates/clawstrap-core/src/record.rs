//! The OpenClaw Installation Record (`~/.openclaw/openclaw.json`).
//!
//! The agent's onboarding step owns this document. The provisioner only adds
//! missing browser keys and forces `browser.headless` on, always through a
//! parsed JSON tree so unrelated keys survive untouched.

use crate::error::AppError;
use serde_json::{json, Map, Value};

pub const DEFAULT_PROFILE: &str = "openclaw";
pub const DEFAULT_CDP_PORT: u16 = 18800;
pub const DEFAULT_DRIVER: &str = "openclaw";
pub const DEFAULT_COLOR: &str = "#FF4500";

/// Apply the headless-VPS browser defaults in place. Returns `true` if anything changed.
pub fn apply_browser_defaults(doc: &mut Value) -> Result<bool, AppError> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| AppError::Record("top level is not a JSON object".into()))?;

    let browser = object_entry(root, "browser")?;
    let mut changed = false;

    changed |= insert_missing(browser, "enabled", Value::Bool(true));
    if browser.get("headless") != Some(&Value::Bool(true)) {
        browser.insert("headless".into(), Value::Bool(true));
        changed = true;
    }
    changed |= insert_missing(browser, "noSandbox", Value::Bool(true));
    changed |= insert_missing(browser, "defaultProfile", Value::from(DEFAULT_PROFILE));

    let profile_name = browser
        .get("defaultProfile")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROFILE)
        .to_string();
    let profiles = object_entry(browser, "profiles")?;
    changed |= insert_missing(
        profiles,
        &profile_name,
        json!({
            "cdpPort": DEFAULT_CDP_PORT,
            "driver": DEFAULT_DRIVER,
            "color": DEFAULT_COLOR,
        }),
    );

    Ok(changed)
}

/// Parse, patch and re-serialize. `None` means the document already holds the defaults.
pub fn patch_document(text: &str) -> Result<Option<String>, AppError> {
    let mut doc: Value = serde_json::from_str(text)?;
    if !apply_browser_defaults(&mut doc)? {
        return Ok(None);
    }
    let mut out = serde_json::to_string_pretty(&doc)?;
    out.push('\n');
    Ok(Some(out))
}

/// Whether `text` already satisfies the browser defaults.
pub fn has_browser_defaults(text: &str) -> Result<bool, AppError> {
    let mut doc: Value = serde_json::from_str(text)?;
    Ok(!apply_browser_defaults(&mut doc)?)
}

/// The handful of fields the summary and `status` command show.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub instance_id: Option<String>,
    pub headless: Option<bool>,
    pub default_profile: Option<String>,
}

pub fn summarize(text: &str) -> Result<RecordSummary, AppError> {
    let doc: Value = serde_json::from_str(text)?;
    let browser = doc.get("browser");
    Ok(RecordSummary {
        instance_id: doc
            .get("instanceId")
            .and_then(Value::as_str)
            .map(str::to_string),
        headless: browser.and_then(|b| b.get("headless")).and_then(Value::as_bool),
        default_profile: browser
            .and_then(|b| b.get("defaultProfile"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn object_entry<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>, AppError> {
    parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| AppError::Record(format!("`{key}` is present but not an object")))
}

fn insert_missing(map: &mut Map<String, Value>, key: &str, value: Value) -> bool {
    if map.contains_key(key) {
        return false;
    }
    map.insert(key.to_string(), value);
    true
}
