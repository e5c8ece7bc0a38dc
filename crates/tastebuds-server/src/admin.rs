//! Admin commands: database validation and quota bookkeeping.

use std::path::Path;

use chrono::{TimeZone, Utc};
use tastebuds_core::DataPaths;
use tastebuds_store::{Profile, SqliteStore, Tier};
use tracing::info;

/// Result of a validation check.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub db_valid: bool,
    pub db_path: String,
    pub batches: i64,
    pub runs: i64,
    pub pending_runs: i64,
    pub failed_runs: i64,
    pub profiles: i64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Open the database under `data_dir` and collect row counts.
pub fn validate(data_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    let db_dir = data_dir.join("db");
    if !db_dir.join("tastebuds.db").exists() {
        report
            .warnings
            .push(format!("No database yet under {}, creating one", db_dir.display()));
    }

    let store = match SqliteStore::open(&db_dir) {
        Ok(s) => s,
        Err(e) => {
            report.errors.push(format!("Failed to open database: {}", e));
            return report;
        }
    };

    match store.stats() {
        Ok(stats) => {
            report.db_valid = true;
            report.db_path = stats.db_path;
            report.batches = stats.batches;
            report.runs = stats.runs;
            report.pending_runs = stats.pending_runs;
            report.failed_runs = stats.failed_runs;
            report.profiles = stats.profiles;
        }
        Err(e) => report.errors.push(format!("Failed to read stats: {}", e)),
    }

    if report.pending_runs > 0 {
        report.warnings.push(format!(
            "{} runs are pending; they will be marked interrupted on next server start",
            report.pending_runs
        ));
    }

    info!("Validated {}", data_dir.display());
    report
}

/// Print a validation report to stdout.
pub fn print_report(report: &ValidationReport) {
    println!("=== Tastebuds Database Report ===");
    println!();
    println!("Database valid:     {}", if report.db_valid { "YES" } else { "NO" });
    println!("Database path:      {}", report.db_path);
    println!("Batches:            {}", report.batches);
    println!("Runs:               {}", report.runs);
    println!("  pending:          {}", report.pending_runs);
    println!("  failed:           {}", report.failed_runs);
    println!("Profiles:           {}", report.profiles);

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }
}

/// Add credits to an owner. Returns the updated profile.
pub fn grant(data_paths: &DataPaths, owner_id: &str, amount: i64) -> anyhow::Result<Profile> {
    anyhow::ensure!(!owner_id.trim().is_empty(), "owner id must not be empty");
    anyhow::ensure!(amount > 0, "credit amount must be positive");
    let store = SqliteStore::open(&data_paths.db)?;
    store.grant_credits(owner_id, amount)?;
    load_profile(&store, owner_id)
}

/// Move an owner to `tier`. Returns the updated profile.
pub fn set_tier(data_paths: &DataPaths, owner_id: &str, tier: Tier) -> anyhow::Result<Profile> {
    anyhow::ensure!(!owner_id.trim().is_empty(), "owner id must not be empty");
    let store = SqliteStore::open(&data_paths.db)?;
    store.set_tier(owner_id, tier)?;
    load_profile(&store, owner_id)
}

fn load_profile(store: &SqliteStore, owner_id: &str) -> anyhow::Result<Profile> {
    store
        .get_profile(owner_id)?
        .ok_or_else(|| anyhow::anyhow!("profile {} missing after update", owner_id))
}

pub fn print_profile(profile: &Profile) {
    let since = Utc
        .timestamp_millis_opt(profile.created_at)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| profile.created_at.to_string());
    println!("Owner:    {}", profile.owner_id);
    println!("Credits:  {}", profile.credits);
    println!("Tier:     {}", profile.tier.as_str());
    println!("Since:    {}", since);
}
