//! SQLite row store for batches, runs and owner profiles.
//!
//! Every terminal run write is a compare-and-swap on `status = 'pending'`,
//! so the first writer (job or timeout handler) decides the outcome.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::quota::QuotaLedger;
use crate::schema::{PROFILES_SQL, SCHEMA_SQL};
use crate::types::*;
use tastebuds_core::{now_millis, Error, FailureReason, ModelKey, Result};

const RUN_COLUMNS: &str = "id, batch_id, owner_id, flavor, model, run_order, status, failure, error, \
                           created_at, started_at, completed_at";

const BATCH_COLUMNS: &str = "id, owner_id, prompt, flavors_json, models_json, name, created_at";

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

/// SQLite-backed store for all row data.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/tastebuds.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("tastebuds.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let stats = store.stats()?;
        info!(
            "SqliteStore initialized: {} batches, {} runs ({} pending), path={}",
            stats.batches,
            stats.runs,
            stats.pending_runs,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}", PROFILES_SQL, SCHEMA_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Batches
    // ---------------------------------------------------------------

    /// Persist a batch, its planned runs and the credit debit atomically.
    ///
    /// The debit only applies when the balance covers `cost`, and free-tier
    /// owners must hold fewer than `free_project_limit` batches. Otherwise
    /// the transaction rolls back and nothing is written.
    pub fn create_batch(
        &self,
        batch: &NewBatch,
        plan: &[PlannedRun],
        cost: i64,
        free_project_limit: i64,
    ) -> Result<(Batch, Vec<Run>)> {
        let now = now_millis();
        let batch_id = uuid::Uuid::new_v4().to_string();
        let flavors_json = serde_json::to_string(&batch.flavors)?;
        let models_json = serde_json::to_string(&batch.models)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let debited = tx
            .execute(
                "UPDATE profiles SET credits = credits - ?1 WHERE owner_id = ?2 AND credits >= ?1",
                params![cost, batch.owner_id],
            )
            .map_err(db_err)?;
        if debited == 0 {
            let available: i64 = tx
                .query_row(
                    "SELECT credits FROM profiles WHERE owner_id = ?1",
                    params![batch.owner_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?
                .unwrap_or(0);
            return Err(Error::InsufficientCredits {
                needed: cost,
                available,
            });
        }

        let tier: String = tx
            .query_row(
                "SELECT tier FROM profiles WHERE owner_id = ?1",
                params![batch.owner_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
            .unwrap_or_default();
        if Tier::parse(&tier).unwrap_or(Tier::Free) == Tier::Free {
            let existing: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM batches WHERE owner_id = ?1",
                    params![batch.owner_id],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            if existing >= free_project_limit {
                return Err(Error::ProjectLimitReached {
                    limit: free_project_limit,
                });
            }
        }

        tx.execute(
            "INSERT INTO batches (id, owner_id, prompt, flavors_json, models_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![batch_id, batch.owner_id, batch.prompt, flavors_json, models_json, now],
        )
        .map_err(db_err)?;

        let mut runs = Vec::with_capacity(plan.len());
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO runs (id, batch_id, owner_id, flavor, model, run_order, status, created_at, started_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
                )
                .map_err(db_err)?;
            for planned in plan {
                let run_id = uuid::Uuid::new_v4().to_string();
                stmt.execute(params![
                    run_id,
                    batch_id,
                    batch.owner_id,
                    planned.flavor,
                    planned.model.as_str(),
                    planned.order,
                    now
                ])
                .map_err(db_err)?;
                runs.push(Run {
                    id: run_id,
                    batch_id: batch_id.clone(),
                    owner_id: batch.owner_id.clone(),
                    flavor: Some(planned.flavor.clone()),
                    model: Some(planned.model),
                    order: planned.order,
                    status: RunStatus::Pending,
                    failure: None,
                    error: None,
                    created_at: now,
                    started_at: now,
                    completed_at: None,
                });
            }
        }

        tx.commit().map_err(db_err)?;

        debug!(
            "Created batch {} with {} runs, charged {} credits",
            batch_id,
            runs.len(),
            cost
        );

        Ok((
            Batch {
                id: batch_id,
                owner_id: batch.owner_id.clone(),
                prompt: batch.prompt.clone(),
                flavors: batch.flavors.clone(),
                models: batch.models.clone(),
                name: None,
                created_at: now,
            },
            runs,
        ))
    }

    /// Get a batch by ID.
    pub fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM batches WHERE id = ?1", BATCH_COLUMNS);
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let batch = stmt
            .query_row(params![batch_id], Self::row_to_batch)
            .optional()
            .map_err(db_err)?;
        Ok(batch)
    }

    /// All batches of an owner, newest first.
    pub fn list_batches(&self, owner_id: &str) -> Result<Vec<Batch>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM batches WHERE owner_id = ?1 ORDER BY created_at DESC, id",
            BATCH_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![owner_id], Self::row_to_batch)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Set the display name. Returns false if the batch does not exist.
    pub fn set_batch_name(&self, batch_id: &str, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE batches SET name = ?1 WHERE id = ?2",
                params![name, batch_id],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Runs
    // ---------------------------------------------------------------

    /// Get a run that belongs to `batch_id`.
    pub fn get_run(&self, batch_id: &str, run_id: &str) -> Result<Option<Run>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM runs WHERE id = ?1 AND batch_id = ?2",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let run = stmt
            .query_row(params![run_id, batch_id], Self::row_to_run)
            .optional()
            .map_err(db_err)?;
        Ok(run)
    }

    /// All runs of a batch ordered by `order` ascending.
    pub fn list_runs(&self, batch_id: &str) -> Result<Vec<Run>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM runs WHERE batch_id = ?1 ORDER BY run_order ASC",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![batch_id], Self::row_to_run)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Write the terminal state of a pending run.
    ///
    /// Returns false when the run was already terminal (another writer won)
    /// or does not exist.
    pub fn complete_run(&self, run_id: &str, outcome: &RunOutcome, at: i64) -> Result<bool> {
        let (failure, error) = match outcome {
            RunOutcome::Succeeded => (None, None),
            RunOutcome::Failed { reason, message } => (Some(reason.as_str()), Some(message.as_str())),
        };
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE runs SET status = ?1, failure = ?2, error = ?3, completed_at = ?4
                 WHERE id = ?5 AND status = 'pending'",
                params![outcome.status().as_str(), failure, error, at, run_id],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Put a terminal run back into `pending` for another attempt.
    ///
    /// Returns false if the run is still pending or does not exist.
    pub fn restart_run(&self, run_id: &str, at: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE runs SET status = 'pending', failure = NULL, error = NULL,
                     completed_at = NULL, started_at = ?1
                 WHERE id = ?2 AND status != 'pending'",
                params![at, run_id],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Fail every run left pending by a previous process.
    pub fn fail_orphaned_runs(&self, at: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE runs SET status = 'failed', failure = ?1, error = ?2, completed_at = ?3
                 WHERE status = 'pending'",
                params![
                    FailureReason::Interrupted.as_str(),
                    "Server restarted before the run finished",
                    at
                ],
            )
            .map_err(db_err)?;
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Profiles
    // ---------------------------------------------------------------

    pub fn get_profile(&self, owner_id: &str) -> Result<Option<Profile>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT owner_id, credits, tier, created_at FROM profiles WHERE owner_id = ?1",
            )
            .map_err(db_err)?;
        let profile = stmt
            .query_row(params![owner_id], |row| {
                let tier: String = row.get("tier")?;
                Ok(Profile {
                    owner_id: row.get("owner_id")?,
                    credits: row.get("credits")?,
                    tier: Tier::parse(&tier).unwrap_or(Tier::Free),
                    created_at: row.get("created_at")?,
                })
            })
            .optional()
            .map_err(db_err)?;
        Ok(profile)
    }

    /// Add credits, creating a free-tier profile if needed. Returns the new balance.
    pub fn grant_credits(&self, owner_id: &str, amount: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO profiles (owner_id, credits, tier, created_at) VALUES (?1, ?2, 'free', ?3)
             ON CONFLICT(owner_id) DO UPDATE SET credits = credits + excluded.credits",
            params![owner_id, amount, now_millis()],
        )
        .map_err(db_err)?;
        conn.query_row(
            "SELECT credits FROM profiles WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    /// Set the tier, creating a zero-credit profile if needed.
    pub fn set_tier(&self, owner_id: &str, tier: Tier) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO profiles (owner_id, credits, tier, created_at) VALUES (?1, 0, ?2, ?3)
             ON CONFLICT(owner_id) DO UPDATE SET tier = excluded.tier",
            params![owner_id, tier.as_str(), now_millis()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<i64> {
            conn.query_row(sql, [], |row| row.get(0)).map_err(db_err)
        };
        Ok(StoreStats {
            batches: count("SELECT COUNT(*) FROM batches")?,
            runs: count("SELECT COUNT(*) FROM runs")?,
            pending_runs: count("SELECT COUNT(*) FROM runs WHERE status = 'pending'")?,
            failed_runs: count("SELECT COUNT(*) FROM runs WHERE status = 'failed'")?,
            profiles: count("SELECT COUNT(*) FROM profiles")?,
            db_path: self.db_path.display().to_string(),
        })
    }

    // ---------------------------------------------------------------
    // Row mapping
    // ---------------------------------------------------------------

    fn row_to_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<Batch> {
        let flavors_json: String = row.get("flavors_json")?;
        let models_json: String = row.get("models_json")?;
        Ok(Batch {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            prompt: row.get("prompt")?,
            flavors: serde_json::from_str(&flavors_json).unwrap_or_default(),
            models: serde_json::from_str(&models_json).unwrap_or_default(),
            name: row.get("name")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
        let model: Option<String> = row.get("model")?;
        let status: String = row.get("status")?;
        let failure: Option<String> = row.get("failure")?;
        Ok(Run {
            id: row.get("id")?,
            batch_id: row.get("batch_id")?,
            owner_id: row.get("owner_id")?,
            flavor: row.get("flavor")?,
            model: model.and_then(|m| m.parse::<ModelKey>().ok()),
            order: row.get("run_order")?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::Pending),
            failure: failure.as_deref().and_then(FailureReason::parse),
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

impl QuotaLedger for SqliteStore {
    fn credits(&self, owner_id: &str) -> Result<i64> {
        Ok(self.get_profile(owner_id)?.map(|p| p.credits).unwrap_or(0))
    }

    fn tier(&self, owner_id: &str) -> Result<Tier> {
        Ok(self.get_profile(owner_id)?.map(|p| p.tier).unwrap_or(Tier::Free))
    }

    fn count_batches(&self, owner_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM batches WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const UNLIMITED: i64 = i64::MAX;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn new_batch(owner: &str) -> NewBatch {
        NewBatch {
            owner_id: owner.into(),
            prompt: "A landing page for a bakery".into(),
            flavors: vec!["Minimal".into(), "Bold".into()],
            models: vec![ModelKey::OpenAI, ModelKey::Anthropic],
        }
    }

    fn plan() -> Vec<PlannedRun> {
        let mut order = 0;
        let mut out = Vec::new();
        for flavor in ["Minimal", "Bold"] {
            for model in [ModelKey::OpenAI, ModelKey::Anthropic] {
                order += 1;
                out.push(PlannedRun {
                    flavor: flavor.into(),
                    model,
                    order,
                });
            }
        }
        out
    }

    #[test]
    fn test_create_batch_persists_runs_and_debits() {
        let (store, _dir) = test_store();
        store.grant_credits("alice", 10).unwrap();

        let (batch, runs) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();
        assert_eq!(runs.len(), 4);
        assert_eq!(store.credits("alice").unwrap(), 6);

        let stored = store.get_batch(&batch.id).unwrap().unwrap();
        assert_eq!(stored.flavors, vec!["Minimal", "Bold"]);
        assert_eq!(stored.models, vec![ModelKey::OpenAI, ModelKey::Anthropic]);
        assert!(stored.name.is_none());

        let listed = store.list_runs(&batch.id).unwrap();
        let orders: Vec<i64> = listed.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert!(listed.iter().all(|r| r.status == RunStatus::Pending));
        assert!(listed.iter().all(|r| r.finished_at().is_none()));
    }

    #[test]
    fn test_insufficient_credits_writes_nothing() {
        let (store, _dir) = test_store();
        store.grant_credits("bob", 3).unwrap();

        let result = store.create_batch(&new_batch("bob"), &plan(), 4, UNLIMITED);
        assert!(matches!(
            result,
            Err(Error::InsufficientCredits {
                needed: 4,
                available: 3
            })
        ));
        assert_eq!(store.count_batches("bob").unwrap(), 0);
        assert_eq!(store.stats().unwrap().runs, 0);
        assert_eq!(store.credits("bob").unwrap(), 3);
    }

    #[test]
    fn test_free_tier_limit_checked_in_transaction() {
        let (store, _dir) = test_store();
        store.grant_credits("dana", 20).unwrap();

        store.create_batch(&new_batch("dana"), &plan(), 4, 1).unwrap();
        let result = store.create_batch(&new_batch("dana"), &plan(), 4, 1);
        assert!(matches!(result, Err(Error::ProjectLimitReached { limit: 1 })));
        assert_eq!(store.count_batches("dana").unwrap(), 1);
        assert_eq!(store.stats().unwrap().runs, 4);
        assert_eq!(store.credits("dana").unwrap(), 16);

        store.set_tier("dana", Tier::Pro).unwrap();
        store.create_batch(&new_batch("dana"), &plan(), 4, 1).unwrap();
        assert_eq!(store.count_batches("dana").unwrap(), 2);
        assert_eq!(store.credits("dana").unwrap(), 12);
    }

    #[test]
    fn test_unknown_owner_has_no_credits() {
        let (store, _dir) = test_store();
        assert_eq!(store.credits("ghost").unwrap(), 0);
        assert_eq!(store.tier("ghost").unwrap(), Tier::Free);
        assert!(store.create_batch(&new_batch("ghost"), &plan(), 4, UNLIMITED).is_err());
    }

    #[test]
    fn test_complete_run_first_writer_wins() {
        let (store, _dir) = test_store();
        store.grant_credits("alice", 10).unwrap();
        let (batch, runs) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();
        let run_id = &runs[0].id;

        let timeout = RunOutcome::failed(FailureReason::Timeout, "timed out");
        assert!(store.complete_run(run_id, &timeout, 1_000).unwrap());
        assert!(!store.complete_run(run_id, &RunOutcome::Succeeded, 2_000).unwrap());

        let run = store.get_run(&batch.id, run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failure, Some(FailureReason::Timeout));
        assert_eq!(run.finished_at(), Some(1_000));
        assert_eq!(run.failed_at(), run.finished_at());
    }

    #[test]
    fn test_succeeded_run_has_no_failed_at() {
        let (store, _dir) = test_store();
        store.grant_credits("alice", 10).unwrap();
        let (batch, runs) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();

        assert!(store
            .complete_run(&runs[1].id, &RunOutcome::Succeeded, 5_000)
            .unwrap());
        let run = store.get_run(&batch.id, &runs[1].id).unwrap().unwrap();
        assert!(run.succeeded());
        assert_eq!(run.finished_at(), Some(5_000));
        assert_eq!(run.failed_at(), None);
        assert!(run.error.is_none());
    }

    #[test]
    fn test_restart_only_terminal_runs() {
        let (store, _dir) = test_store();
        store.grant_credits("alice", 10).unwrap();
        let (batch, runs) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();
        let run_id = &runs[0].id;

        assert!(!store.restart_run(run_id, 10).unwrap());

        store
            .complete_run(run_id, &RunOutcome::failed(FailureReason::Provider, "502"), 20)
            .unwrap();
        assert!(store.restart_run(run_id, 30).unwrap());

        let run = store.get_run(&batch.id, run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.started_at, 30);
        assert!(run.completed_at.is_none());
        assert!(run.failure.is_none());
    }

    #[test]
    fn test_fail_orphaned_runs() {
        let (store, _dir) = test_store();
        store.grant_credits("alice", 10).unwrap();
        let (batch, runs) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();
        store
            .complete_run(&runs[0].id, &RunOutcome::Succeeded, 1)
            .unwrap();

        assert_eq!(store.fail_orphaned_runs(99).unwrap(), 3);
        let listed = store.list_runs(&batch.id).unwrap();
        assert!(listed[0].succeeded());
        for run in &listed[1..] {
            assert_eq!(run.failure, Some(FailureReason::Interrupted));
            assert_eq!(run.failed_at(), Some(99));
        }
    }

    #[test]
    fn test_get_run_scoped_to_batch() {
        let (store, _dir) = test_store();
        store.grant_credits("alice", 10).unwrap();
        let (_batch, runs) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();
        assert!(store.get_run("other-batch", &runs[0].id).unwrap().is_none());
    }

    #[test]
    fn test_batch_name_and_listing() {
        let (store, _dir) = test_store();
        store.grant_credits("alice", 100).unwrap();
        let (first, _) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();
        let (second, _) = store.create_batch(&new_batch("alice"), &plan(), 4, UNLIMITED).unwrap();

        assert!(store.set_batch_name(&first.id, "Bakery Landing").unwrap());
        assert!(!store.set_batch_name("missing", "x").unwrap());

        let listed = store.list_batches("alice").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|b| b.id == second.id));
        let named = listed.iter().find(|b| b.id == first.id).unwrap();
        assert_eq!(named.name.as_deref(), Some("Bakery Landing"));
        assert_eq!(store.count_batches("alice").unwrap(), 2);
        assert!(store.list_batches("bob").unwrap().is_empty());
    }

    #[test]
    fn test_tier_upsert() {
        let (store, _dir) = test_store();
        store.set_tier("carol", Tier::Pro).unwrap();
        assert_eq!(store.tier("carol").unwrap(), Tier::Pro);
        assert_eq!(store.credits("carol").unwrap(), 0);

        assert_eq!(store.grant_credits("carol", 5).unwrap(), 5);
        assert_eq!(store.tier("carol").unwrap(), Tier::Pro);
    }
}
