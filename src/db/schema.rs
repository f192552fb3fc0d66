//! SQL DDL for initializing the EverWell database.
//! SQLite-first design; every statement is idempotent.

/// SQLite schema with:
/// - `profiles` keyed by a UUID string, `handle` unique case-insensitively
/// - `access_tokens` holding SHA-256 digests of bearer tokens, never the tokens
/// - `measurements` unique per (user, metric, date); dates stored as `YYYY-MM-DD`
/// - `insights_cache.expires_at` as unix seconds so expiry checks compare integers
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    handle TEXT NOT NULL UNIQUE COLLATE NOCASE,
    display_name TEXT NULL,
    email TEXT NULL,
    height_cm REAL NULL,
    birth_date TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS access_tokens (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    last_used_at TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_access_tokens_user ON access_tokens(user_id);

CREATE TABLE IF NOT EXISTS metric_definitions (
    slug TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    unit TEXT NOT NULL,
    min_value REAL NOT NULL,
    max_value REAL NOT NULL,
    decimals INTEGER NOT NULL DEFAULT 0,
    description TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_metric_settings (
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    metric_slug TEXT NOT NULL REFERENCES metric_definitions(slug),
    enabled INTEGER NOT NULL DEFAULT 1,
    target REAL NULL,
    PRIMARY KEY (user_id, metric_slug)
);

CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    metric_slug TEXT NOT NULL REFERENCES metric_definitions(slug),
    date TEXT NOT NULL,
    value REAL NOT NULL,
    note TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, metric_slug, date)
);

CREATE INDEX IF NOT EXISTS idx_measurements_user_date ON measurements(user_id, date);

CREATE TABLE IF NOT EXISTS user_preferences (
    user_id TEXT PRIMARY KEY REFERENCES profiles(id) ON DELETE CASCADE,
    utc_offset_minutes INTEGER NOT NULL DEFAULT 0,
    reminders_enabled INTEGER NOT NULL DEFAULT 0,
    reminder_hour INTEGER NOT NULL DEFAULT 20,
    last_reminder_date TEXT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS derived_features (
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    feature TEXT NOT NULL,
    value REAL NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (user_id, date, feature)
);

CREATE TABLE IF NOT EXISTS ai_insights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    summary TEXT NOT NULL,
    recommendations TEXT NOT NULL, -- JSON array, serialized as text
    model TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ai_insights_user ON ai_insights(user_id, id);

CREATE TABLE IF NOT EXISTS insights_usage (
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    day TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, day)
);

CREATE TABLE IF NOT EXISTS insights_cache (
    cache_key TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    insight_id INTEGER NOT NULL REFERENCES ai_insights(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_insights_cache_expiry ON insights_cache(expires_at);
"#;

/// Built-in metric catalogue: (slug, name, unit, min, max, decimals, description).
pub const METRIC_SEED: &[(&str, &str, &str, f64, f64, i64, &str)] = &[
    ("weight", "Weight", "kg", 20.0, 400.0, 1, "Body weight"),
    ("sleep_hours", "Sleep", "h", 0.0, 24.0, 1, "Hours slept the previous night"),
    ("steps", "Steps", "steps", 0.0, 200_000.0, 0, "Daily step count"),
    ("resting_hr", "Resting heart rate", "bpm", 20.0, 250.0, 0, "Resting heart rate"),
    ("water_ml", "Water", "ml", 0.0, 20_000.0, 0, "Water intake"),
    ("mood", "Mood", "score", 1.0, 10.0, 0, "Self-reported mood from 1 to 10"),
    ("body_fat_pct", "Body fat", "%", 2.0, 75.0, 1, "Body fat percentage"),
];
