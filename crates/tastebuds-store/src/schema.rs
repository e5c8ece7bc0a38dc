//! Database schema SQL.

/// Owner profiles: credit balance and subscription tier.
pub const PROFILES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    owner_id TEXT PRIMARY KEY,
    credits INTEGER NOT NULL DEFAULT 0,
    tier TEXT NOT NULL DEFAULT 'free' CHECK (tier IN ('free', 'pro')),
    created_at INTEGER NOT NULL
);
"#;

/// Batches ("projects") and their runs.
///
/// A run is terminal iff `completed_at` is set; the CHECK keeps `status` and
/// `completed_at` in lockstep so a half-written terminal state cannot exist.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS batches (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    prompt TEXT NOT NULL,
    flavors_json TEXT NOT NULL,
    models_json TEXT NOT NULL,
    name TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_batches_owner ON batches(owner_id, created_at);

CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    batch_id TEXT NOT NULL REFERENCES batches(id) ON DELETE CASCADE,
    owner_id TEXT NOT NULL,
    flavor TEXT,
    model TEXT,
    run_order INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'succeeded', 'failed')),
    failure TEXT,
    error TEXT,
    created_at INTEGER NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    UNIQUE (batch_id, run_order),
    CHECK ((status = 'pending') = (completed_at IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_runs_batch ON runs(batch_id, run_order);
CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
"#;
