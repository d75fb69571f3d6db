//! Config command - show or edit configuration

use super::CommandContext;
use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_FILE};
use crate::controller::ControllerBuild;
use crate::error::{SwcacheError, SwcacheResult};
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;
use toml_edit::DocumentMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Str,
    Bool,
    Int,
    List,
}

const KEYS: &[(&str, ValueKind)] = &[
    ("general.log_format", ValueKind::Str),
    ("general.audit_log", ValueKind::Bool),
    ("origin.url", ValueKind::Str),
    ("origin.script_path", ValueKind::Str),
    ("origin.timeout_secs", ValueKind::Int),
    ("cache.app_prefix", ValueKind::Str),
    ("cache.admin_prefix", ValueKind::Str),
    ("cache.version", ValueKind::Str),
    ("cache.admin_version", ValueKind::Str),
    ("cache.admin_namespace", ValueKind::Str),
    ("cache.main_assets", ValueKind::List),
    ("cache.admin_assets", ValueKind::List),
    ("cache.offline_document", ValueKind::Str),
    ("cache.ramp_step_ms", ValueKind::Int),
    ("cache.ramp_step_percent", ValueKind::Int),
    ("bypass.hostname_suffixes", ValueKind::List),
    ("bypass.api_prefixes", ValueKind::List),
    ("bypass.control_prefixes", ValueKind::List),
    ("lifecycle.poll_interval_secs", ValueKind::Int),
    ("lifecycle.update_grace_secs", ValueKind::Int),
    ("lifecycle.install_tick_ms", ValueKind::Int),
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, cx: &CommandContext) -> SwcacheResult<()> {
    let manager = ConfigManager::with_path(cx.config_path.clone());

    match args.action {
        None | Some(ConfigAction::Show) => println!("{}", toml::to_string_pretty(&cx.config)?),
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(&manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            let path = if local {
                std::env::current_dir()
                    .map_err(|e| SwcacheError::io("getting current directory", e))?
                    .join(LOCAL_CONFIG_FILE)
            } else {
                manager.path().to_path_buf()
            };
            set_value(&path, &key, &value).await?;
            ui::step_ok(
                &UiContext::detect(),
                &format!("Set {} = {} in {}", key, value, path.display()),
            );
        }
    }

    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> SwcacheResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}

/// Set one key in a TOML file, keeping comments and layout. The edited
/// file must still load and yield a valid controller build.
async fn set_value(path: &Path, key: &str, value: &str) -> SwcacheResult<()> {
    let kind = KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, kind)| *kind)
        .ok_or_else(|| {
            let valid: Vec<&str> = KEYS.iter().map(|(k, _)| *k).collect();
            SwcacheError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                valid.join(", ")
            ))
        })?;
    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| SwcacheError::Internal(format!("config key without section: {}", key)))?;

    let content = if path.exists() {
        fs::read_to_string(path)
            .await
            .map_err(|e| SwcacheError::io(format!("reading {}", path.display()), e))?
    } else {
        String::new()
    };
    let mut doc: DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| {
        SwcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let table = doc
        .entry(section)
        .or_insert(toml_edit::table())
        .as_table_mut()
        .ok_or_else(|| SwcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: format!("[{}] is not a table", section),
        })?;
    table[field] = parse_item(kind, value)?;

    let edited = doc.to_string();
    let config: Config = toml::from_str(&edited).map_err(|e| SwcacheError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    ControllerBuild::from_config(&config)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SwcacheError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    fs::write(path, edited)
        .await
        .map_err(|e| SwcacheError::io(format!("writing {}", path.display()), e))
}

fn parse_item(kind: ValueKind, value: &str) -> SwcacheResult<toml_edit::Item> {
    Ok(match kind {
        ValueKind::Str => toml_edit::value(value),
        ValueKind::Bool => toml_edit::value(parse_bool(value)?),
        ValueKind::Int => toml_edit::value(
            value
                .parse::<u32>()
                .map(i64::from)
                .map_err(|_| SwcacheError::User(format!("Invalid number: {}", value)))?,
        ),
        ValueKind::List => {
            let mut items = toml_edit::Array::new();
            for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                items.push(item);
            }
            toml_edit::value(items)
        }
    })
}

fn parse_bool(value: &str) -> SwcacheResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SwcacheError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}
