//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding discovered websites,
//! the outbound link graph, and discovery run history.
//!
//! **Access rules:**
//! - `discover` / `seed`: read-write via [`Storage::open`]
//! - `sites` / `relations`: read-only via [`Storage::open_readonly`]
//!
//! Cross-process races between concurrent discovery runs are settled by
//! [`Storage::upsert_website`]: the insert and the merge are each a single
//! statement, and the merge happens in SQL.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use immoradar_shared::{
    DiscoveredRelation, ImmoRadarError, Result, RunId, Website,
};
use libsql::{Connection, Database, params};

/// Columns selected for every `Website` read, in [`row_to_website`] order.
const WEBSITE_COLUMNS: &str = "base_url, name, confidence_score, discovery_source, tech_stack, \
     validation_status, discovery_depth, is_active, crawl_budget, created_at, last_validated_at";

/// Result of an atomic website upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// `true` when the row did not exist before this call.
    pub inserted: bool,
    /// The row as stored after the merge.
    pub website: Website,
}

/// A discovery run history row.
#[derive(Debug, Clone)]
pub struct DiscoveryRunRecord {
    pub id: String,
    pub query: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ImmoRadarError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ImmoRadarError::Storage(format!(
                "database not found at {}; run `immoradar discover` first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ImmoRadarError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ImmoRadarError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Website operations
    // -----------------------------------------------------------------------

    /// Look up a website by its canonical base URL.
    pub async fn find_website(&self, base_url: &str) -> Result<Option<Website>> {
        let sql = format!("SELECT {WEBSITE_COLUMNS} FROM websites WHERE base_url = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![base_url])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_website(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Insert a new website. Fails if the base URL already exists.
    pub async fn insert_website(&self, site: &Website) -> Result<()> {
        self.check_writable()?;
        let sql = format!(
            "INSERT INTO websites ({WEBSITE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    site.base_url.as_str(),
                    site.name.as_str(),
                    i64::from(site.confidence_score.min(100)),
                    site.discovery_source.as_str(),
                    site.tech_stack.as_str(),
                    site.validation_status.as_str(),
                    i64::from(site.discovery_depth),
                    i64::from(site.is_active),
                    i64::from(site.crawl_budget),
                    site.created_at.to_rfc3339(),
                    site.last_validated_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Overwrite every mutable field of an existing website.
    pub async fn save_website(&self, site: &Website) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "UPDATE websites SET
                   name = ?2,
                   confidence_score = ?3,
                   discovery_source = ?4,
                   tech_stack = ?5,
                   validation_status = ?6,
                   discovery_depth = ?7,
                   is_active = ?8,
                   crawl_budget = ?9,
                   last_validated_at = ?10
                 WHERE base_url = ?1",
                params![
                    site.base_url.as_str(),
                    site.name.as_str(),
                    i64::from(site.confidence_score.min(100)),
                    site.discovery_source.as_str(),
                    site.tech_stack.as_str(),
                    site.validation_status.as_str(),
                    i64::from(site.discovery_depth),
                    i64::from(site.is_active),
                    i64::from(site.crawl_budget),
                    site.last_validated_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(storage_err)?;

        if affected == 0 {
            return Err(ImmoRadarError::Storage(format!(
                "no website with base_url {}",
                site.base_url
            )));
        }
        Ok(())
    }

    /// Insert `site`, or merge it into the existing row for the same base URL.
    ///
    /// The merge keeps the higher score and the lower depth, so an existing
    /// record is never downgraded. A `needs_review` row whose merged score
    /// exceeds `valid_threshold` is promoted to `valid`.
    ///
    /// Runs as an `INSERT .. DO NOTHING` followed, only when that produced no
    /// row, by a merging `UPDATE`. Rows are never deleted, so the update
    /// always finds the row the insert collided with.
    pub async fn upsert_website(&self, site: &Website, valid_threshold: u8) -> Result<UpsertOutcome> {
        self.check_writable()?;

        let insert_sql = format!(
            "INSERT INTO websites ({WEBSITE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(base_url) DO NOTHING
             RETURNING {WEBSITE_COLUMNS}"
        );
        let mut rows = self
            .conn
            .query(
                &insert_sql,
                params![
                    site.base_url.as_str(),
                    site.name.as_str(),
                    i64::from(site.confidence_score.min(100)),
                    site.discovery_source.as_str(),
                    site.tech_stack.as_str(),
                    site.validation_status.as_str(),
                    i64::from(site.discovery_depth),
                    i64::from(site.is_active),
                    i64::from(site.crawl_budget),
                    site.created_at.to_rfc3339(),
                    site.last_validated_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(storage_err)?;

        if let Some(row) = rows.next().await.map_err(storage_err)? {
            return Ok(UpsertOutcome {
                inserted: true,
                website: row_to_website(&row)?,
            });
        }
        drop(rows);

        let update_sql = format!(
            "UPDATE websites SET
               confidence_score = MAX(confidence_score, ?2),
               discovery_depth = MIN(discovery_depth, ?3),
               tech_stack = ?4,
               last_validated_at = COALESCE(?5, last_validated_at),
               validation_status = CASE
                 WHEN validation_status = 'needs_review' AND MAX(confidence_score, ?2) > ?6
                 THEN 'valid'
                 ELSE validation_status
               END
             WHERE base_url = ?1
             RETURNING {WEBSITE_COLUMNS}"
        );
        let mut rows = self
            .conn
            .query(
                &update_sql,
                params![
                    site.base_url.as_str(),
                    i64::from(site.confidence_score.min(100)),
                    i64::from(site.discovery_depth),
                    site.tech_stack.as_str(),
                    site.last_validated_at.map(|t| t.to_rfc3339()),
                    i64::from(valid_threshold),
                ],
            )
            .await
            .map_err(storage_err)?;

        let row = rows
            .next()
            .await
            .map_err(storage_err)?
            .ok_or_else(|| ImmoRadarError::Storage("upsert returned no row".into()))?;

        Ok(UpsertOutcome {
            inserted: false,
            website: row_to_website(&row)?,
        })
    }

    /// List websites with a score of at least `min_score`, best first.
    pub async fn list_websites(&self, min_score: u8) -> Result<Vec<Website>> {
        let sql = format!(
            "SELECT {WEBSITE_COLUMNS} FROM websites
             WHERE confidence_score >= ?1
             ORDER BY confidence_score DESC, base_url"
        );
        let mut rows = self
            .conn
            .query(&sql, params![i64::from(min_score)])
            .await
            .map_err(storage_err)?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            sites.push(row_to_website(&row)?);
        }
        Ok(sites)
    }

    // -----------------------------------------------------------------------
    // Relation operations
    // -----------------------------------------------------------------------

    /// Append a link-graph edge. No deduplication.
    pub async fn insert_relation(&self, relation: &DiscoveredRelation) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO discovered_relations
                   (source_domain, target_domain, relation_type, discovered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    relation.source_domain.as_str(),
                    relation.target_domain.as_str(),
                    relation.relation_type.as_str(),
                    relation.discovered_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// All edges recorded from `source_domain`, oldest first.
    pub async fn list_relations_from(&self, source_domain: &str) -> Result<Vec<DiscoveredRelation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source_domain, target_domain, relation_type, discovered_at
                 FROM discovered_relations
                 WHERE source_domain = ?1
                 ORDER BY id",
                params![source_domain],
            )
            .await
            .map_err(storage_err)?;

        let mut relations = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let relation_type: String = row.get(2).map_err(storage_err)?;
            let discovered_at: String = row.get(3).map_err(storage_err)?;
            relations.push(DiscoveredRelation {
                source_domain: row.get(0).map_err(storage_err)?,
                target_domain: row.get(1).map_err(storage_err)?,
                relation_type: relation_type.parse()?,
                discovered_at: parse_timestamp(&discovered_at)?,
            });
        }
        Ok(relations)
    }

    /// Total number of recorded edges.
    pub async fn count_relations(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM discovered_relations", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Discovery run operations
    // -----------------------------------------------------------------------

    /// Record the start of a discovery run.
    pub async fn insert_discovery_run(&self, id: &RunId, query: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO discovery_runs (id, query, started_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), query, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Mark a discovery run finished and attach its stats.
    pub async fn finish_discovery_run(&self, id: &RunId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE discovery_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Fetch a discovery run by ID.
    pub async fn get_discovery_run(&self, id: &RunId) -> Result<Option<DiscoveryRunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, query, started_at, finished_at, stats_json
                 FROM discovery_runs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(DiscoveryRunRecord {
                id: row.get(0).map_err(storage_err)?,
                query: row.get::<String>(1).ok(),
                started_at: row.get(2).map_err(storage_err)?,
                finished_at: row.get::<String>(3).ok(),
                stats_json: row.get::<String>(4).ok(),
            })),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn storage_err(e: libsql::Error) -> ImmoRadarError {
    ImmoRadarError::Storage(e.to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ImmoRadarError::Storage(format!("invalid date: {e}")))
}

fn row_to_website(row: &libsql::Row) -> Result<Website> {
    let score: i64 = row.get(2).map_err(storage_err)?;
    let tech_stack: String = row.get(4).map_err(storage_err)?;
    let status: String = row.get(5).map_err(storage_err)?;
    let depth: i64 = row.get(6).map_err(storage_err)?;
    let is_active: i64 = row.get(7).map_err(storage_err)?;
    let crawl_budget: i64 = row.get(8).map_err(storage_err)?;
    let created_at: String = row.get(9).map_err(storage_err)?;

    Ok(Website {
        base_url: row.get(0).map_err(storage_err)?,
        name: row.get(1).map_err(storage_err)?,
        confidence_score: score.clamp(0, 100) as u8,
        discovery_source: row.get(3).map_err(storage_err)?,
        tech_stack: tech_stack.parse()?,
        validation_status: status.parse()?,
        discovery_depth: depth.max(0) as u32,
        is_active: is_active != 0,
        crawl_budget: crawl_budget.max(0) as u32,
        created_at: parse_timestamp(&created_at)?,
        last_validated_at: row
            .get::<String>(10)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use immoradar_shared::{TechStack, ValidationStatus};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("immoradar_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn site(base_url: &str, score: u8, depth: u32) -> Website {
        Website::discovered(base_url, score, "test", TechStack::Vanilla, depth, 40)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("immoradar_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn website_insert_find_save() {
        let storage = test_storage().await;
        assert!(storage.find_website("https://immo.tn").await.unwrap().is_none());

        let mut record = site("https://immo.tn", 55, 1);
        storage.insert_website(&record).await.unwrap();
        assert!(storage.insert_website(&record).await.is_err());

        let found = storage.find_website("https://immo.tn").await.unwrap().unwrap();
        assert_eq!(found.confidence_score, 55);
        assert_eq!(found.validation_status, ValidationStatus::Valid);
        assert_eq!(found.tech_stack, TechStack::Vanilla);
        assert_eq!(found.crawl_budget, 100);

        record.is_active = true;
        record.confidence_score = 100;
        storage.save_website(&record).await.unwrap();
        let found = storage.find_website("https://immo.tn").await.unwrap().unwrap();
        assert!(found.is_active);
        assert_eq!(found.confidence_score, 100);

        let missing = site("https://nowhere.tn", 10, 0);
        assert!(storage.save_website(&missing).await.is_err());
    }

    #[tokio::test]
    async fn upsert_is_monotone() {
        let storage = test_storage().await;

        let first = storage
            .upsert_website(&site("https://agence.tn", 40, 3), 40)
            .await
            .unwrap();
        assert!(first.inserted);
        assert_eq!(first.website.validation_status, ValidationStatus::NeedsReview);

        // Lower score, deeper: nothing changes.
        let second = storage
            .upsert_website(&site("https://agence.tn", 30, 5), 40)
            .await
            .unwrap();
        assert!(!second.inserted);
        assert_eq!(second.website.confidence_score, 40);
        assert_eq!(second.website.discovery_depth, 3);

        // Higher score, shallower: both move, and the record is promoted.
        let third = storage
            .upsert_website(&site("https://agence.tn", 60, 1), 40)
            .await
            .unwrap();
        assert!(!third.inserted);
        assert_eq!(third.website.confidence_score, 60);
        assert_eq!(third.website.discovery_depth, 1);
        assert_eq!(third.website.validation_status, ValidationStatus::Valid);
    }

    #[tokio::test]
    async fn upsert_reports_update_for_identical_record() {
        let storage = test_storage().await;
        let record = site("https://agence.tn", 45, 2);

        let first = storage.upsert_website(&record, 40).await.unwrap();
        assert!(first.inserted);

        // Same created_at as the stored row: still an update.
        let again = storage.upsert_website(&record, 40).await.unwrap();
        assert!(!again.inserted);
        assert_eq!(again.website.confidence_score, 45);
        assert_eq!(again.website.discovery_depth, 2);
        assert_eq!(storage.list_websites(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_never_demotes_status() {
        let storage = test_storage().await;
        let mut rejected = site("https://spam.tn", 10, 0);
        rejected.validation_status = ValidationStatus::Rejected;
        storage.insert_website(&rejected).await.unwrap();

        let merged = storage
            .upsert_website(&site("https://spam.tn", 90, 0), 40)
            .await
            .unwrap();
        assert_eq!(merged.website.validation_status, ValidationStatus::Rejected);
        assert_eq!(merged.website.confidence_score, 90);
    }

    #[tokio::test]
    async fn list_websites_filters_and_orders() {
        let storage = test_storage().await;
        storage.insert_website(&site("https://a.tn", 20, 0)).await.unwrap();
        storage.insert_website(&site("https://b.tn", 80, 0)).await.unwrap();
        storage.insert_website(&site("https://c.tn", 50, 0)).await.unwrap();

        let all = storage.list_websites(0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].base_url, "https://b.tn");

        let good = storage.list_websites(50).await.unwrap();
        let urls: Vec<_> = good.iter().map(|s| s.base_url.as_str()).collect();
        assert_eq!(urls, vec!["https://b.tn", "https://c.tn"]);
    }

    #[tokio::test]
    async fn relations_are_append_only() {
        let storage = test_storage().await;
        let edge = DiscoveredRelation::outbound("https://a.tn", "https://b.tn");
        storage.insert_relation(&edge).await.unwrap();
        storage.insert_relation(&edge).await.unwrap();
        storage
            .insert_relation(&DiscoveredRelation::outbound("https://b.tn", "https://c.tn"))
            .await
            .unwrap();

        assert_eq!(storage.count_relations().await.unwrap(), 3);
        let from_a = storage.list_relations_from("https://a.tn").await.unwrap();
        assert_eq!(from_a.len(), 2);
        assert_eq!(from_a[0].target_domain, "https://b.tn");
        assert_eq!(from_a[0].relation_type, immoradar_shared::RelationType::Outbound);
    }

    #[tokio::test]
    async fn discovery_run_lifecycle() {
        let storage = test_storage().await;
        let id = RunId::new();
        storage
            .insert_discovery_run(&id, Some("immobilier tunisie"))
            .await
            .unwrap();

        let run = storage.get_discovery_run(&id).await.unwrap().unwrap();
        assert_eq!(run.query.as_deref(), Some("immobilier tunisie"));
        assert!(run.finished_at.is_none());

        storage
            .finish_discovery_run(&id, r#"{"tasks_dispatched":4}"#)
            .await
            .unwrap();
        let run = storage.get_discovery_run(&id).await.unwrap().unwrap();
        assert!(run.finished_at.is_some());
        assert!(run.stats_json.unwrap().contains("tasks_dispatched"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("immoradar_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_website(&site("https://a.tn", 50, 0)).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_websites(0).await.unwrap().len(), 1);
        let result = ro.insert_website(&site("https://b.tn", 50, 0)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("immoradar_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
