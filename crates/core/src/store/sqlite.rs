//! SQLite-backed pipeline store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{
    CreateWebsiteRequest, DiscoveryPolicy, Enrichment, Page, PageCounts, PageFilter,
    PageProgress, PageSelector, PipelineStore, StoreError, TenantScope, VectorStatus, Website,
    WebsiteCounts, WebsiteFilter, WebsiteStatus,
};

const WEBSITE_COLUMNS: &str = "id, organization_id, name, base_url, status, last_crawled_at, \
     processing_started_at, created_at, updated_at";

const PAGE_COLUMNS: &str = "id, organization_id, website_id, url, raw_content, markdown_content, \
     summary, keywords, vector_status, created_at, updated_at";

/// How long a writer waits on a lock held by another connection.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// SQLite-backed store shared by every stage of a runner.
///
/// Several runner processes may open the same database file; cross-process
/// exclusion relies on the lease columns, not on this mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS websites (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                status TEXT NOT NULL,
                last_crawled_at TEXT,
                processing_started_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_websites_organization ON websites(organization_id);
            CREATE INDEX IF NOT EXISTS idx_websites_status ON websites(status);
            CREATE INDEX IF NOT EXISTS idx_websites_created_at ON websites(created_at);

            CREATE TABLE IF NOT EXISTS pages (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                website_id TEXT NOT NULL REFERENCES websites(id),
                url TEXT NOT NULL,
                raw_content TEXT,
                markdown_content TEXT,
                summary TEXT,
                keywords TEXT,
                vector_status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(website_id, url)
            );

            CREATE INDEX IF NOT EXISTS idx_pages_organization ON pages(organization_id);
            CREATE INDEX IF NOT EXISTS idx_pages_vector_status ON pages(vector_status);
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_website(row: &rusqlite::Row) -> rusqlite::Result<Website> {
        let status: String = row.get(4)?;
        Ok(Website {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            name: row.get(2)?,
            base_url: row.get(3)?,
            status: status
                .parse()
                .map_err(|e: String| conversion_error(4, e))?,
            last_crawled_at: parse_optional_ts(row, 5)?,
            processing_started_at: parse_optional_ts(row, 6)?,
            created_at: parse_ts(row, 7)?,
            updated_at: parse_ts(row, 8)?,
        })
    }

    fn row_to_page(row: &rusqlite::Row) -> rusqlite::Result<Page> {
        let keywords_json: Option<String> = row.get(7)?;
        let keywords = match keywords_json {
            Some(json) => Some(
                serde_json::from_str::<Vec<String>>(&json)
                    .map_err(|e| conversion_error(7, e.to_string()))?,
            ),
            None => None,
        };
        let vector_status: String = row.get(8)?;

        Ok(Page {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            website_id: row.get(2)?,
            url: row.get(3)?,
            raw_content: row.get(4)?,
            markdown_content: row.get(5)?,
            summary: row.get(6)?,
            keywords,
            vector_status: vector_status
                .parse()
                .map_err(|e: String| conversion_error(8, e))?,
            created_at: parse_ts(row, 9)?,
            updated_at: parse_ts(row, 10)?,
        })
    }

    fn query_websites(
        conn: &Connection,
        sql: &str,
        params: &[Box<dyn rusqlite::ToSql>],
    ) -> Result<Vec<Website>, StoreError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_website)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn query_pages(
        conn: &Connection,
        sql: &str,
        params: &[Box<dyn rusqlite::ToSql>],
    ) -> Result<Vec<Page>, StoreError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_page)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn fetch_website(conn: &Connection, id: &str) -> Result<Option<Website>, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM websites WHERE id = ?1", WEBSITE_COLUMNS),
            params![id],
            Self::row_to_website,
        )
        .optional()
        .map_err(db_err)
    }

    /// Run a single-row page update, mapping "no row" to `NotFound`.
    fn update_page(
        &self,
        id: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(sql, params).map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::page_not_found(id));
        }
        Ok(())
    }

    fn update_website(
        &self,
        id: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(sql, params).map_err(db_err)?;
        if changed == 0 && Self::fetch_website(&conn, id)?.is_none() {
            return Err(StoreError::website_not_found(id));
        }
        Ok(changed)
    }
}

/// Append `organization_id = ?` when the scope is a single tenant.
fn push_scope(
    scope: &TenantScope,
    column: &str,
    conditions: &mut Vec<String>,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) {
    if let Some(org) = scope.organization_id() {
        conditions.push(format!("{} = ?", column));
        params.push(Box::new(org.to_string()));
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Fixed-width UTC timestamp, so text comparison in SQL is chronological.
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn parse_optional_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e.to_string()))
    })
    .transpose()
}

impl PipelineStore for SqliteStore {
    fn create_website(
        &self,
        scope: &TenantScope,
        request: CreateWebsiteRequest,
    ) -> Result<Website, StoreError> {
        let organization_id = scope
            .organization_id()
            .ok_or(StoreError::TenantRequired)?
            .to_string();

        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = format_ts(Utc::now());

        conn.execute(
            "INSERT INTO websites (id, organization_id, name, base_url, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                organization_id,
                request.name,
                request.base_url,
                WebsiteStatus::Created.as_str(),
                now
            ],
        )
        .map_err(db_err)?;

        Self::fetch_website(&conn, &id)?.ok_or_else(|| StoreError::website_not_found(&id))
    }

    fn get_website(&self, scope: &TenantScope, id: &str) -> Result<Option<Website>, StoreError> {
        let conn = self.conn()?;
        let mut conditions = vec!["id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id.to_string())];
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        let sql = format!(
            "SELECT {} FROM websites {}",
            WEBSITE_COLUMNS,
            where_clause(&conditions)
        );
        Ok(Self::query_websites(&conn, &sql, &params)?.into_iter().next())
    }

    fn list_websites(
        &self,
        scope: &TenantScope,
        filter: &WebsiteFilter,
    ) -> Result<Vec<Website>, StoreError> {
        let conn = self.conn()?;
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            params.push(Box::new(status.as_str()));
        }

        let sql = format!(
            "SELECT {} FROM websites {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            WEBSITE_COLUMNS,
            where_clause(&conditions)
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        Self::query_websites(&conn, &sql, &params)
    }

    fn find_discovery_candidates(
        &self,
        scope: &TenantScope,
        policy: &DiscoveryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<Website>, StoreError> {
        let conn = self.conn()?;
        let mut conditions = vec![
            "(status = 'created' \
              OR (status = 'error' AND (last_crawled_at IS NULL OR last_crawled_at < ?)) \
              OR (status = 'crawling' AND (last_crawled_at IS NULL OR last_crawled_at < ?)))"
                .to_string(),
            "(processing_started_at IS NULL OR processing_started_at < ?)".to_string(),
        ];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(format_ts(now - policy.error_retry_after)),
            Box::new(format_ts(now - policy.stuck_crawl_after)),
            Box::new(format_ts(now - policy.lease_timeout)),
        ];
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        let sql = format!(
            "SELECT {} FROM websites {} ORDER BY created_at ASC, rowid ASC",
            WEBSITE_COLUMNS,
            where_clause(&conditions)
        );
        Self::query_websites(&conn, &sql, &params)
    }

    fn try_acquire_lease(
        &self,
        id: &str,
        now: DateTime<Utc>,
        policy: &DiscoveryPolicy,
    ) -> Result<Option<Website>, StoreError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front so two processes cannot
        // both pass the re-check.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let current =
            Self::fetch_website(&tx, id)?.ok_or_else(|| StoreError::website_not_found(id))?;
        if !current.awaits_discovery(now, policy) {
            return Ok(None);
        }

        let ts = format_ts(now);
        tx.execute(
            "UPDATE websites
             SET status = ?2, last_crawled_at = ?3, processing_started_at = ?3, updated_at = ?3
             WHERE id = ?1",
            params![id, WebsiteStatus::Crawling.as_str(), ts],
        )
        .map_err(db_err)?;

        let leased = Self::fetch_website(&tx, id)?;
        tx.commit().map_err(db_err)?;
        Ok(leased)
    }

    fn release_lease(&self, id: &str) -> Result<(), StoreError> {
        self.update_website(
            id,
            "UPDATE websites SET processing_started_at = NULL WHERE id = ?1",
            &[&id],
        )?;
        Ok(())
    }

    fn mark_website_error(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let ts = format_ts(now);
        self.update_website(
            id,
            "UPDATE websites SET status = ?2, last_crawled_at = ?3, updated_at = ?3 WHERE id = ?1",
            &[&id, &WebsiteStatus::Error.as_str(), &ts],
        )?;
        Ok(())
    }

    fn mark_website_active(
        &self,
        id: &str,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<bool, StoreError> {
        let ts = format_ts(now);
        let lease_cutoff = format_ts(now - lease_timeout);
        let changed = self.update_website(
            id,
            "UPDATE websites SET status = ?2, last_crawled_at = ?3, updated_at = ?3
             WHERE id = ?1 AND status = ?4
               AND (processing_started_at IS NULL OR processing_started_at < ?5)",
            &[
                &id,
                &WebsiteStatus::Active.as_str(),
                &ts,
                &WebsiteStatus::Crawling.as_str(),
                &lease_cutoff,
            ],
        )?;
        Ok(changed > 0)
    }

    fn website_counts(&self, scope: &TenantScope) -> Result<WebsiteCounts, StoreError> {
        let conn = self.conn()?;
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        let sql = format!(
            "SELECT status, COUNT(*) FROM websites {} GROUP BY status",
            where_clause(&conditions)
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?;

        let mut counts = WebsiteCounts::default();
        for row in rows {
            let (status, count) = row.map_err(db_err)?;
            let status: WebsiteStatus = status.parse().map_err(StoreError::Serialization)?;
            counts.set(status, count as u64);
        }
        Ok(counts)
    }

    fn existing_page_urls(&self, website_id: &str) -> Result<HashSet<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT url FROM pages WHERE website_id = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![website_id], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<HashSet<_>>>().map_err(db_err)
    }

    fn insert_pages(&self, website: &Website, urls: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        let now = format_ts(Utc::now());

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO pages
                     (id, organization_id, website_id, url, vector_status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                )
                .map_err(db_err)?;
            for url in urls {
                inserted += stmt
                    .execute(params![
                        uuid::Uuid::new_v4().to_string(),
                        website.organization_id,
                        website.id,
                        url,
                        VectorStatus::Pending.as_str(),
                        now
                    ])
                    .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        Ok(inserted)
    }

    fn get_page(&self, scope: &TenantScope, id: &str) -> Result<Option<Page>, StoreError> {
        let conn = self.conn()?;
        let mut conditions = vec!["id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id.to_string())];
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        let sql = format!(
            "SELECT {} FROM pages {}",
            PAGE_COLUMNS,
            where_clause(&conditions)
        );
        Ok(Self::query_pages(&conn, &sql, &params)?.into_iter().next())
    }

    fn list_pages(
        &self,
        scope: &TenantScope,
        filter: &PageFilter,
    ) -> Result<Vec<Page>, StoreError> {
        let conn = self.conn()?;
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        if let Some(ref website_id) = filter.website_id {
            conditions.push("website_id = ?".to_string());
            params.push(Box::new(website_id.clone()));
        }
        if let Some(status) = filter.vector_status {
            conditions.push("vector_status = ?".to_string());
            params.push(Box::new(status.as_str()));
        }

        let sql = format!(
            "SELECT {} FROM pages {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            PAGE_COLUMNS,
            where_clause(&conditions)
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        Self::query_pages(&conn, &sql, &params)
    }

    fn select_pages(
        &self,
        scope: &TenantScope,
        selector: PageSelector,
        limit: usize,
    ) -> Result<Vec<Page>, StoreError> {
        let conn = self.conn()?;
        // Processing alone is ambiguous; content presence says which stage owns the page.
        let predicate = match selector {
            PageSelector::AwaitingScrape => {
                "vector_status = 'pending' AND (raw_content IS NULL OR raw_content = '')"
            }
            PageSelector::AwaitingEnrichment => {
                "vector_status = 'processing' \
                 AND raw_content IS NOT NULL AND raw_content <> '' \
                 AND (markdown_content IS NULL OR markdown_content = '')"
            }
            PageSelector::AwaitingIngest => {
                "vector_status = 'processing' \
                 AND markdown_content IS NOT NULL AND markdown_content <> ''"
            }
        };
        let mut conditions = vec![predicate.to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        let sql = format!(
            "SELECT {} FROM pages {} ORDER BY created_at ASC, rowid ASC LIMIT ?",
            PAGE_COLUMNS,
            where_clause(&conditions)
        );
        params.push(Box::new(limit as i64));

        Self::query_pages(&conn, &sql, &params)
    }

    fn set_page_status(&self, id: &str, status: VectorStatus) -> Result<(), StoreError> {
        let now = format_ts(Utc::now());
        self.update_page(
            id,
            "UPDATE pages SET vector_status = ?2, updated_at = ?3 WHERE id = ?1",
            &[&id, &status.as_str(), &now],
        )
    }

    fn store_raw_content(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let now = format_ts(Utc::now());
        self.update_page(
            id,
            "UPDATE pages SET raw_content = ?2, updated_at = ?3 WHERE id = ?1",
            &[&id, &content, &now],
        )
    }

    fn store_enrichment(&self, id: &str, enrichment: &Enrichment) -> Result<(), StoreError> {
        let keywords = if enrichment.keywords.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&enrichment.keywords)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            )
        };
        let now = format_ts(Utc::now());
        self.update_page(
            id,
            "UPDATE pages SET markdown_content = ?2, summary = ?3, keywords = ?4, updated_at = ?5
             WHERE id = ?1",
            &[
                &id,
                &enrichment.markdown_content,
                &enrichment.summary,
                &keywords,
                &now,
            ],
        )
    }

    fn page_progress(&self, website_id: &str) -> Result<PageProgress, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN vector_status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN vector_status = 'failed' THEN 1 ELSE 0 END), 0)
             FROM pages WHERE website_id = ?1",
            params![website_id],
            |row| {
                Ok(PageProgress {
                    total: row.get::<_, i64>(0)? as u64,
                    completed: row.get::<_, i64>(1)? as u64,
                    failed: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .map_err(db_err)
    }

    fn page_counts(&self, scope: &TenantScope) -> Result<PageCounts, StoreError> {
        let conn = self.conn()?;
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_scope(scope, "organization_id", &mut conditions, &mut params);

        let sql = format!(
            "SELECT vector_status, COUNT(*) FROM pages {} GROUP BY vector_status",
            where_clause(&conditions)
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?;

        let mut counts = PageCounts::default();
        for row in rows {
            let (status, count) = row.map_err(db_err)?;
            let status: VectorStatus = status.parse().map_err(StoreError::Serialization)?;
            counts.set(status, count as u64);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn tenant(org: &str) -> TenantScope {
        TenantScope::tenant(org)
    }

    fn create_website(store: &SqliteStore, org: &str, name: &str) -> Website {
        store
            .create_website(
                &tenant(org),
                CreateWebsiteRequest {
                    name: name.to_string(),
                    base_url: format!("http://{}.test", name),
                },
            )
            .unwrap()
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn candidate_ids(store: &SqliteStore, now: DateTime<Utc>) -> Vec<String> {
        store
            .find_discovery_candidates(&TenantScope::AllTenants, &DiscoveryPolicy::default(), now)
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect()
    }

    #[test]
    fn test_create_website() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");

        assert!(!website.id.is_empty());
        assert_eq!(website.organization_id, "org-1");
        assert_eq!(website.base_url, "http://alpha.test");
        assert_eq!(website.status, WebsiteStatus::Created);
        assert!(website.last_crawled_at.is_none());
        assert!(website.processing_started_at.is_none());
    }

    #[test]
    fn test_create_website_requires_tenant() {
        let store = create_test_store();
        let result = store.create_website(
            &TenantScope::AllTenants,
            CreateWebsiteRequest {
                name: "alpha".to_string(),
                base_url: "http://alpha.test".to_string(),
            },
        );
        assert!(matches!(result, Err(StoreError::TenantRequired)));
    }

    #[test]
    fn test_tenant_scope_hides_other_tenants() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        create_website(&store, "org-2", "beta");

        assert!(store
            .get_website(&tenant("org-2"), &website.id)
            .unwrap()
            .is_none());
        assert!(store
            .get_website(&tenant("org-1"), &website.id)
            .unwrap()
            .is_some());
        assert!(store
            .get_website(&TenantScope::AllTenants, &website.id)
            .unwrap()
            .is_some());

        let org1 = store
            .list_websites(&tenant("org-1"), &WebsiteFilter::default())
            .unwrap();
        assert_eq!(org1.len(), 1);
        let all = store
            .list_websites(&TenantScope::AllTenants, &WebsiteFilter::default())
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_list_websites_status_filter() {
        let store = create_test_store();
        let a = create_website(&store, "org-1", "alpha");
        create_website(&store, "org-1", "beta");
        store.mark_website_error(&a.id, Utc::now()).unwrap();

        let errored = store
            .list_websites(
                &TenantScope::AllTenants,
                &WebsiteFilter::default().with_status(WebsiteStatus::Error),
            )
            .unwrap();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].id, a.id);
    }

    #[test]
    fn test_discovery_candidates_created_oldest_first() {
        let store = create_test_store();
        let a = create_website(&store, "org-1", "alpha");
        let b = create_website(&store, "org-2", "beta");
        let c = create_website(&store, "org-1", "gamma");

        assert_eq!(candidate_ids(&store, Utc::now()), vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_discovery_candidates_tenant_scoped() {
        let store = create_test_store();
        create_website(&store, "org-1", "alpha");
        let b = create_website(&store, "org-2", "beta");

        let scoped = store
            .find_discovery_candidates(&tenant("org-2"), &DiscoveryPolicy::default(), Utc::now())
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, b.id);
    }

    #[test]
    fn test_discovery_candidates_error_backoff() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let failed_at = Utc::now();
        store.mark_website_error(&website.id, failed_at).unwrap();

        assert!(candidate_ids(&store, failed_at + Duration::minutes(59)).is_empty());
        assert_eq!(
            candidate_ids(&store, failed_at + Duration::minutes(61)),
            vec![website.id]
        );
    }

    #[test]
    fn test_discovery_candidates_reclaim_stuck_crawl() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let started = Utc::now();
        store
            .try_acquire_lease(&website.id, started, &DiscoveryPolicy::default())
            .unwrap()
            .unwrap();

        // Held lease and fresh crawl: not eligible
        assert!(candidate_ids(&store, started + Duration::minutes(10)).is_empty());

        // Released but crawl still fresh: not eligible
        store.release_lease(&website.id).unwrap();
        assert!(candidate_ids(&store, started + Duration::minutes(10)).is_empty());

        // Stuck for over 30 minutes: reclaimed
        assert_eq!(
            candidate_ids(&store, started + Duration::minutes(31)),
            vec![website.id]
        );
    }

    #[test]
    fn test_discovery_candidates_expired_lease_eligible() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let started = Utc::now();
        store
            .try_acquire_lease(&website.id, started, &DiscoveryPolicy::default())
            .unwrap()
            .unwrap();

        assert!(candidate_ids(&store, started + Duration::minutes(29)).is_empty());
        assert_eq!(
            candidate_ids(&store, started + Duration::minutes(31)),
            vec![website.id]
        );
    }

    #[test]
    fn test_discovery_candidates_skip_active() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let now = Utc::now();
        store
            .try_acquire_lease(&website.id, now, &DiscoveryPolicy::default())
            .unwrap();
        store.release_lease(&website.id).unwrap();
        assert!(store
            .mark_website_active(&website.id, now, Duration::minutes(30))
            .unwrap());

        assert!(candidate_ids(&store, now + Duration::days(1)).is_empty());
    }

    #[test]
    fn test_try_acquire_lease() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let now = Utc::now();

        let leased = store
            .try_acquire_lease(&website.id, now, &DiscoveryPolicy::default())
            .unwrap()
            .unwrap();
        assert_eq!(leased.status, WebsiteStatus::Crawling);
        assert!(leased.processing_started_at.is_some());
        assert_eq!(leased.last_crawled_at, leased.processing_started_at);

        // Second holder is refused while the lease is fresh
        let second = store
            .try_acquire_lease(
                &website.id,
                now + Duration::minutes(1),
                &DiscoveryPolicy::default(),
            )
            .unwrap();
        assert!(second.is_none());

        // Expired lease can be taken over
        let takeover = store
            .try_acquire_lease(
                &website.id,
                now + Duration::minutes(31),
                &DiscoveryPolicy::default(),
            )
            .unwrap();
        assert!(takeover.is_some());
    }

    #[test]
    fn test_try_acquire_lease_rechecks_eligibility() {
        let store = create_test_store();
        let policy = DiscoveryPolicy::default();
        let crawled = create_website(&store, "org-1", "alpha");
        let failed = create_website(&store, "org-1", "beta");
        let active = create_website(&store, "org-1", "gamma");
        let now = Utc::now();

        // Read by a runner before anyone else touched the websites
        let stale = candidate_ids(&store, now);
        assert_eq!(stale.len(), 3);

        // Another runner crawls alpha and releases it
        store.try_acquire_lease(&crawled.id, now, &policy).unwrap();
        store.release_lease(&crawled.id).unwrap();

        // beta fails
        store.try_acquire_lease(&failed.id, now, &policy).unwrap();
        store.mark_website_error(&failed.id, now).unwrap();
        store.release_lease(&failed.id).unwrap();

        store.try_acquire_lease(&active.id, now, &policy).unwrap();
        store.release_lease(&active.id).unwrap();
        assert!(store
            .mark_website_active(&active.id, now, policy.lease_timeout)
            .unwrap());

        let later = now + Duration::minutes(1);
        for id in &stale {
            assert!(store
                .try_acquire_lease(id, later, &policy)
                .unwrap()
                .is_none());
        }

        let alpha = store
            .get_website(&TenantScope::AllTenants, &crawled.id)
            .unwrap()
            .unwrap();
        assert!(alpha.processing_started_at.is_none());

        // Error backoff and stuck-crawl windows still reopen the websites
        let retry_at = now + Duration::minutes(61);
        assert!(store.try_acquire_lease(&crawled.id, retry_at, &policy).unwrap().is_some());
        assert!(store.try_acquire_lease(&failed.id, retry_at, &policy).unwrap().is_some());
        assert!(store.try_acquire_lease(&active.id, retry_at, &policy).unwrap().is_none());
    }

    #[test]
    fn test_try_acquire_lease_missing_website() {
        let store = create_test_store();
        let result = store.try_acquire_lease("nope", Utc::now(), &DiscoveryPolicy::default());
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_release_lease() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let now = Utc::now();
        store
            .try_acquire_lease(&website.id, now, &DiscoveryPolicy::default())
            .unwrap();

        store.release_lease(&website.id).unwrap();
        let fetched = store
            .get_website(&TenantScope::AllTenants, &website.id)
            .unwrap()
            .unwrap();
        assert!(fetched.processing_started_at.is_none());
        assert_eq!(fetched.status, WebsiteStatus::Crawling);

        assert!(matches!(
            store.release_lease("nope"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_mark_website_active_requires_crawling_and_no_lease() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let now = Utc::now();
        let lease = Duration::minutes(30);

        // Still Created
        assert!(!store.mark_website_active(&website.id, now, lease).unwrap());

        // Crawling but leased
        store
            .try_acquire_lease(&website.id, now, &DiscoveryPolicy::default())
            .unwrap();
        assert!(!store.mark_website_active(&website.id, now, lease).unwrap());

        store.release_lease(&website.id).unwrap();
        let later = now + Duration::minutes(5);
        assert!(store.mark_website_active(&website.id, later, lease).unwrap());

        let fetched = store
            .get_website(&TenantScope::AllTenants, &website.id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, WebsiteStatus::Active);
        assert!(fetched.last_crawled_at.unwrap() > now);
    }

    #[test]
    fn test_insert_pages_dedups() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");

        let inserted = store
            .insert_pages(&website, &urls(&["/a", "/b", "/a"]))
            .unwrap();
        assert_eq!(inserted, 2);

        let inserted = store.insert_pages(&website, &urls(&["/b", "/c"])).unwrap();
        assert_eq!(inserted, 1);

        let existing = store.existing_page_urls(&website.id).unwrap();
        assert_eq!(existing.len(), 3);
        assert!(existing.contains("/a") && existing.contains("/c"));

        // Same URL under a different website is a different page
        let other = create_website(&store, "org-1", "beta");
        assert_eq!(store.insert_pages(&other, &urls(&["/a"])).unwrap(), 1);
    }

    #[test]
    fn test_inserted_pages_are_pending_and_tenant_owned() {
        let store = create_test_store();
        let website = create_website(&store, "org-7", "alpha");
        store.insert_pages(&website, &urls(&["/a"])).unwrap();

        let pages = store
            .list_pages(&tenant("org-7"), &PageFilter::for_website(&website.id))
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].organization_id, "org-7");
        assert_eq!(pages[0].vector_status, VectorStatus::Pending);
        assert!(pages[0].raw_content.is_none());

        assert!(store
            .get_page(&tenant("org-8"), &pages[0].id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_select_pages_by_content() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        store
            .insert_pages(&website, &urls(&["/scraping", "/scraped", "/enriched", "/new"]))
            .unwrap();
        let pages = store
            .list_pages(&TenantScope::AllTenants, &PageFilter::for_website(&website.id))
            .unwrap();
        let id = |url: &str| pages.iter().find(|p| p.url == url).unwrap().id.clone();

        // Marked Processing but not yet scraped
        store
            .set_page_status(&id("/scraping"), VectorStatus::Processing)
            .unwrap();

        store
            .set_page_status(&id("/scraped"), VectorStatus::Processing)
            .unwrap();
        store.store_raw_content(&id("/scraped"), "<p>hi</p>").unwrap();

        store
            .set_page_status(&id("/enriched"), VectorStatus::Processing)
            .unwrap();
        store.store_raw_content(&id("/enriched"), "raw").unwrap();
        store
            .store_enrichment(
                &id("/enriched"),
                &Enrichment {
                    markdown_content: "# Title".to_string(),
                    summary: Some("summary".to_string()),
                    keywords: vec!["a".to_string()],
                },
            )
            .unwrap();

        let select = |selector| -> Vec<String> {
            store
                .select_pages(&TenantScope::AllTenants, selector, 10)
                .unwrap()
                .into_iter()
                .map(|p| p.url)
                .collect()
        };

        assert_eq!(select(PageSelector::AwaitingScrape), vec!["/new"]);
        assert_eq!(select(PageSelector::AwaitingEnrichment), vec!["/scraped"]);
        assert_eq!(select(PageSelector::AwaitingIngest), vec!["/enriched"]);
    }

    #[test]
    fn test_select_pages_limit_and_order() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let many: Vec<String> = (0..15).map(|i| format!("/p{}", i)).collect();
        store.insert_pages(&website, &many).unwrap();

        let batch = store
            .select_pages(&TenantScope::AllTenants, PageSelector::AwaitingScrape, 10)
            .unwrap();
        assert_eq!(batch.len(), 10);
        assert_eq!(batch[0].url, "/p0");
        assert_eq!(batch[9].url, "/p9");
    }

    #[test]
    fn test_store_enrichment_keywords() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        store.insert_pages(&website, &urls(&["/a", "/b"])).unwrap();
        let pages = store
            .list_pages(&TenantScope::AllTenants, &PageFilter::default())
            .unwrap();

        store
            .store_enrichment(
                &pages[0].id,
                &Enrichment {
                    markdown_content: "md".to_string(),
                    summary: None,
                    keywords: vec!["rust".to_string(), "sqlite".to_string()],
                },
            )
            .unwrap();
        store
            .store_enrichment(
                &pages[1].id,
                &Enrichment {
                    markdown_content: "md".to_string(),
                    summary: None,
                    keywords: vec![],
                },
            )
            .unwrap();

        let first = store
            .get_page(&TenantScope::AllTenants, &pages[0].id)
            .unwrap()
            .unwrap();
        assert_eq!(
            first.keywords,
            Some(vec!["rust".to_string(), "sqlite".to_string()])
        );
        assert_eq!(first.vector_status, VectorStatus::Pending);

        let second = store
            .get_page(&TenantScope::AllTenants, &pages[1].id)
            .unwrap()
            .unwrap();
        assert!(second.keywords.is_none());
    }

    #[test]
    fn test_page_updates_missing_page() {
        let store = create_test_store();
        assert!(matches!(
            store.set_page_status("nope", VectorStatus::Failed),
            Err(StoreError::NotFound { kind: "page", .. })
        ));
        assert!(store.store_raw_content("nope", "x").is_err());
    }

    #[test]
    fn test_page_progress_and_counts() {
        let store = create_test_store();
        let website = create_website(&store, "org-1", "alpha");
        let empty = create_website(&store, "org-2", "beta");
        store
            .insert_pages(&website, &urls(&["/a", "/b", "/c"]))
            .unwrap();
        let pages = store
            .list_pages(&TenantScope::AllTenants, &PageFilter::default())
            .unwrap();
        store
            .set_page_status(&pages[0].id, VectorStatus::Completed)
            .unwrap();
        store
            .set_page_status(&pages[1].id, VectorStatus::Failed)
            .unwrap();

        let progress = store.page_progress(&website.id).unwrap();
        assert_eq!(
            progress,
            PageProgress {
                total: 3,
                completed: 1,
                failed: 1
            }
        );
        assert!(!progress.is_finished());
        assert_eq!(store.page_progress(&empty.id).unwrap(), PageProgress::default());

        let counts = store.page_counts(&TenantScope::AllTenants).unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(store.page_counts(&tenant("org-2")).unwrap(), PageCounts::default());

        let website_counts = store.website_counts(&TenantScope::AllTenants).unwrap();
        assert_eq!(website_counts.created, 2);
        assert_eq!(website_counts.get(WebsiteStatus::Active), 0);
    }

    #[test]
    fn test_lease_race_between_store_instances() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("shared.db");
        let runner_a = SqliteStore::new(&db_path).unwrap();
        let runner_b = SqliteStore::new(&db_path).unwrap();

        let website = create_website(&runner_a, "org-1", "alpha");
        let now = Utc::now();

        // Both runners see the website as eligible
        assert_eq!(candidate_ids(&runner_a, now), vec![website.id.clone()]);
        assert_eq!(candidate_ids(&runner_b, now), vec![website.id.clone()]);

        let policy = DiscoveryPolicy::default();
        assert!(runner_a
            .try_acquire_lease(&website.id, now, &policy)
            .unwrap()
            .is_some());
        assert!(runner_b
            .try_acquire_lease(&website.id, now, &policy)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_file_based_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("sitemind.db");

        let website_id = {
            let store = SqliteStore::new(&db_path).unwrap();
            create_website(&store, "org-1", "alpha").id
        };

        let store = SqliteStore::new(&db_path).unwrap();
        let fetched = store
            .get_website(&TenantScope::AllTenants, &website_id)
            .unwrap();
        assert!(fetched.is_some());
    }
}
