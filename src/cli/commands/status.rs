//! Status command - stores, registration and debug flag

use super::CommandContext;
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::client::pwa_disabled;
use crate::config::ConfigManager;
use crate::controller::ControllerBuild;
use crate::error::SwcacheResult;
use crate::registration::RegistrationRecord;
use crate::store::{CacheStorage, DiskStorage};
use crate::ui::{self, UiContext};
use console::style;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct StoreRow {
    name: String,
    entries: usize,
    current: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    origin: String,
    pwa_disabled: bool,
    registration: Option<RegistrationRecord>,
    stores: Vec<StoreRow>,
}

/// Execute the status command
pub async fn execute(args: StatusArgs, cx: &CommandContext) -> SwcacheResult<()> {
    let storage = DiskStorage::new(ConfigManager::stores_dir());
    let report = StatusReport {
        origin: cx.config.origin.url.clone(),
        pwa_disabled: pwa_disabled(&cx.prefs()).await?,
        registration: RegistrationRecord::load(&ConfigManager::registration_path()).await?,
        stores: collect_stores(&storage, &cx.build()?).await?,
    };

    match args.format {
        OutputFormat::Table => print_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => {
            for store in &report.stores {
                println!("{}", store.name);
            }
        }
    }
    Ok(())
}

async fn collect_stores(
    storage: &dyn CacheStorage,
    build: &ControllerBuild,
) -> SwcacheResult<Vec<StoreRow>> {
    let mut rows = vec![];
    for name in storage.keys().await? {
        let entries = storage.entries(&name).await?.len();
        rows.push(StoreRow {
            current: build.is_current_store(&name),
            name,
            entries,
        });
    }
    Ok(rows)
}

fn print_table(report: &StatusReport) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "swcache status");

    ui::key_value(&ctx, "Origin", &report.origin);
    ui::key_value_status(
        &ctx,
        "Controller",
        if report.pwa_disabled { "disabled (debug flag)" } else { "enabled" },
        !report.pwa_disabled,
    );
    match &report.registration {
        Some(record) => {
            ui::key_value(&ctx, "Registered", &record.registered_at.format("%Y-%m-%d %H:%M").to_string());
            ui::key_value(&ctx, "Active build", &record.build.fingerprint());
            ui::key_value(&ctx, "Worker", &record.worker_id.to_string());
        }
        None => ui::key_value_status(&ctx, "Registered", "no", false),
    }

    println!();
    if report.stores.is_empty() {
        ui::step_info(&ctx, "No cache stores");
        return;
    }

    println!(
        "{:<32} {:<12} {:>8}",
        style("STORE").bold(),
        style("STATE").bold(),
        style("ENTRIES").bold()
    );
    println!("{}", "-".repeat(54));
    for store in &report.stores {
        let state = if store.current {
            style("current").green()
        } else {
            style("superseded").dim()
        };
        println!("{:<32} {:<12} {:>8}", store.name, state, store.entries);
    }
    println!();
    println!("{} store(s)", report.stores.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::net::Response;
    use crate::store::{MemoryStorage, RequestKey};
    use url::Url;

    #[tokio::test]
    async fn stores_are_marked_current_or_superseded() {
        let storage = MemoryStorage::new();
        let url = Url::parse("https://quiz.example.com/index.html").unwrap();
        let doc = Response::new(url.as_str(), 200, "<html>");
        storage
            .put("quiz-app-v1.0.1", &RequestKey::get(&url), &doc)
            .await
            .unwrap();
        storage.open("quiz-app-v1.0.0").await.unwrap();

        let build = ControllerBuild::from_config(&Config::default()).unwrap();
        let rows = collect_stores(&storage, &build).await.unwrap();

        let current = rows.iter().find(|r| r.name == "quiz-app-v1.0.1").unwrap();
        assert!(current.current);
        assert_eq!(current.entries, 1);
        let old = rows.iter().find(|r| r.name == "quiz-app-v1.0.0").unwrap();
        assert!(!old.current);
        assert_eq!(old.entries, 0);
    }
}
