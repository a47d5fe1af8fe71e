//! SQL migration definitions for the ImmoRadar database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: websites, discovered_relations",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Candidate and validated sites, one row per canonical domain
CREATE TABLE IF NOT EXISTS websites (
    base_url          TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    confidence_score  INTEGER NOT NULL DEFAULT 0
                      CHECK (confidence_score BETWEEN 0 AND 100),
    discovery_source  TEXT NOT NULL,
    tech_stack        TEXT NOT NULL DEFAULT 'Unknown',
    validation_status TEXT NOT NULL DEFAULT 'pending',
    discovery_depth   INTEGER NOT NULL DEFAULT 0,
    is_active         INTEGER NOT NULL DEFAULT 0,
    crawl_budget      INTEGER NOT NULL DEFAULT 100,
    created_at        TEXT NOT NULL,
    last_validated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_websites_score ON websites(confidence_score);

-- Observed link graph edges (append-only, duplicates allowed)
CREATE TABLE IF NOT EXISTS discovered_relations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    source_domain TEXT NOT NULL,
    target_domain TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relations_source ON discovered_relations(source_domain);
CREATE INDEX IF NOT EXISTS idx_relations_target ON discovered_relations(target_domain);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Discovery run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS discovery_runs (
    id          TEXT PRIMARY KEY,
    query       TEXT,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
