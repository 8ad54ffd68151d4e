// 🗄️ Repository - generic document store behind every read and write
//
// Collaborator contract: create / update / fetch_one / fetch_all / count / destroy
// by (table, query), plus two primitives the engine's invariants depend on:
// - `increment_below`: atomic increment-and-check for quota counters
// - `transact`: a batch of writes committed all-or-nothing
//
// `SqliteRepository` is the bundled implementation: one `documents` table of
// JSON rows, WAL mode, IMMEDIATE transactions for every read-modify-write.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, Connection, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::entities::{CanonicalAccount, CanonicalLead};
use crate::error::{Result, SyncError};

// ============================================================================
// TABLES & QUERIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Leads,
    Accounts,
    FieldMaps,
    EnrichmentConfigs,
    Users,
    Webhooks,
    StatusSettings,
    ScoreSettings,
    Tasks,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Leads => "leads",
            Table::Accounts => "accounts",
            Table::FieldMaps => "field_maps",
            Table::EnrichmentConfigs => "enrichment_configs",
            Table::Users => "users",
            Table::Webhooks => "webhooks",
            Table::StatusSettings => "status_settings",
            Table::ScoreSettings => "score_settings",
            Table::Tasks => "tasks",
        }
    }
}

/// Conjunction of top-level equality filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn id(id: impl Into<String>) -> Self {
        Query::new().eq("id", id.into())
    }

    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Query::new().eq("tenant_id", tenant_id.into())
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.filters
            .iter()
            .all(|(key, expected)| doc.get(key).unwrap_or(&Value::Null) == expected)
    }

    fn string_filter(&self, key: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_str())
    }
}

/// One write inside a `transact` batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    Create { table: Table, object: Value },
    /// Insert, or replace the whole document with the same id
    Upsert { table: Table, object: Value },
    /// Shallow-merge `patch` into every matching document
    Update { table: Table, query: Query, patch: Value },
    Destroy { table: Table, query: Query },
}

// ============================================================================
// REPOSITORY CONTRACT
// ============================================================================

#[async_trait]
pub trait Repository: Send + Sync {
    async fn create(&self, table: Table, object: Value) -> Result<Value>;

    /// Returns the number of documents updated
    async fn update(&self, table: Table, query: &Query, patch: Value) -> Result<usize>;

    async fn fetch_one(&self, table: Table, query: &Query) -> Result<Option<Value>>;

    async fn fetch_all(&self, table: Table, query: &Query) -> Result<Vec<Value>>;

    async fn count(&self, table: Table, query: &Query) -> Result<usize>;

    /// Returns the number of documents deleted
    async fn destroy(&self, table: Table, query: &Query) -> Result<usize>;

    /// Atomically `counter += 1` on the single matching document, only while
    /// `counter < limit`. Returns false when the limit was already reached.
    async fn increment_below(
        &self,
        table: Table,
        query: &Query,
        counter: &str,
        limit: &str,
    ) -> Result<bool>;

    /// Commit every op or none
    async fn transact(&self, ops: Vec<WriteOp>) -> Result<()>;
}

// ============================================================================
// SQLITE IMPLEMENTATION
// ============================================================================

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteRepository {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteRepository {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("connection mutex poisoned".to_string()))
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            table_name TEXT NOT NULL,
            id TEXT NOT NULL,
            tenant_id TEXT,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (table_name, id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(table_name, tenant_id)",
        [],
    )?;

    Ok(())
}

/// Rows of `table` matching `query`. Uses the id / tenant columns to narrow
/// the scan, the rest of the filter is applied on the decoded document.
fn select(conn: &Connection, table: Table, query: &Query) -> Result<Vec<Value>> {
    let id = query.string_filter("id");
    let tenant = query.string_filter("tenant_id");

    let mut stmt = conn.prepare(
        "SELECT data FROM documents
         WHERE table_name = ?1
           AND (?2 IS NULL OR id = ?2)
           AND (?3 IS NULL OR tenant_id = ?3)
         ORDER BY rowid",
    )?;

    let rows = stmt
        .query_map(params![table.name(), id, tenant], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut docs = Vec::new();
    for raw in rows {
        let doc: Value = serde_json::from_str(&raw)?;
        if query.matches(&doc) {
            docs.push(doc);
        }
    }
    Ok(docs)
}

fn document_id(doc: &Value) -> Result<String> {
    doc.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SyncError::Storage("document without id".to_string()))
}

fn write_row(conn: &Connection, table: Table, doc: &Value, replace: bool) -> Result<()> {
    let id = document_id(doc)?;
    let tenant = doc.get("tenant_id").and_then(Value::as_str);
    let data = serde_json::to_string(doc)?;
    let now = Utc::now().to_rfc3339();

    if replace {
        conn.execute(
            "INSERT INTO documents (table_name, id, tenant_id, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(table_name, id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![table.name(), id, tenant, data, now],
        )?;
    } else {
        conn.execute(
            "INSERT INTO documents (table_name, id, tenant_id, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![table.name(), id, tenant, data, now],
        )?;
    }
    Ok(())
}

/// The object with a fresh uuid `id` when it has none
pub(crate) fn with_id(object: Value) -> Result<Value> {
    let mut map = match object {
        Value::Object(map) => map,
        other => {
            return Err(SyncError::Storage(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
    };
    let missing = map
        .get("id")
        .and_then(Value::as_str)
        .map_or(true, str::is_empty);
    if missing {
        map.insert(
            "id".to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
    Ok(Value::Object(map))
}

fn merge_patch(doc: &mut Value, patch: &Value) -> Result<()> {
    let patch = patch
        .as_object()
        .ok_or_else(|| SyncError::Storage("patch must be a JSON object".to_string()))?;
    if let Value::Object(target) = doc {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

fn apply_update(conn: &Connection, table: Table, query: &Query, patch: &Value) -> Result<usize> {
    let mut docs = select(conn, table, query)?;
    for doc in docs.iter_mut() {
        merge_patch(doc, patch)?;
        write_row(conn, table, doc, true)?;
    }
    Ok(docs.len())
}

fn apply_destroy(conn: &Connection, table: Table, query: &Query) -> Result<usize> {
    let docs = select(conn, table, query)?;
    for doc in &docs {
        conn.execute(
            "DELETE FROM documents WHERE table_name = ?1 AND id = ?2",
            params![table.name(), document_id(doc)?],
        )?;
    }
    Ok(docs.len())
}

fn apply_op(conn: &Connection, op: &WriteOp) -> Result<()> {
    match op {
        WriteOp::Create { table, object } => write_row(conn, *table, &with_id(object.clone())?, false),
        WriteOp::Upsert { table, object } => write_row(conn, *table, &with_id(object.clone())?, true),
        WriteOp::Update {
            table,
            query,
            patch,
        } => apply_update(conn, *table, query, patch).map(|_| ()),
        WriteOp::Destroy { table, query } => apply_destroy(conn, *table, query).map(|_| ()),
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create(&self, table: Table, object: Value) -> Result<Value> {
        let doc = with_id(object)?;
        let conn = self.lock()?;
        write_row(&conn, table, &doc, false)?;
        Ok(doc)
    }

    async fn update(&self, table: Table, query: &Query, patch: Value) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = apply_update(&tx, table, query, &patch)?;
        tx.commit()?;
        Ok(updated)
    }

    async fn fetch_one(&self, table: Table, query: &Query) -> Result<Option<Value>> {
        let conn = self.lock()?;
        Ok(select(&conn, table, query)?.into_iter().next())
    }

    async fn fetch_all(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        let conn = self.lock()?;
        select(&conn, table, query)
    }

    async fn count(&self, table: Table, query: &Query) -> Result<usize> {
        let conn = self.lock()?;
        Ok(select(&conn, table, query)?.len())
    }

    async fn destroy(&self, table: Table, query: &Query) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = apply_destroy(&tx, table, query)?;
        tx.commit()?;
        Ok(deleted)
    }

    async fn increment_below(
        &self,
        table: Table,
        query: &Query,
        counter: &str,
        limit: &str,
    ) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut docs = select(&tx, table, query)?;
        if docs.len() != 1 {
            return Err(SyncError::Storage(format!(
                "increment_below on {} expects exactly one match, found {}",
                table.name(),
                docs.len()
            )));
        }
        let doc = &mut docs[0];
        let current = doc.get(counter).and_then(Value::as_i64).unwrap_or(0);
        let ceiling = doc.get(limit).and_then(Value::as_i64).unwrap_or(0);
        if current >= ceiling {
            debug!(table = table.name(), counter, current, ceiling, "increment refused");
            return Ok(false);
        }

        if let Value::Object(map) = doc {
            map.insert(counter.to_string(), Value::from(current + 1));
        }
        write_row(&tx, table, doc, true)?;
        tx.commit()?;
        Ok(true)
    }

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for op in &ops {
            apply_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ============================================================================
// DOCUMENT HELPERS
// ============================================================================

pub fn to_document<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn from_document<T: DeserializeOwned>(doc: Value) -> Result<T> {
    Ok(serde_json::from_value(doc)?)
}

/// Load a lead and its owning account
pub async fn load_lead(repo: &dyn Repository, tenant_id: &str, lead_id: &str) -> Result<CanonicalLead> {
    let query = Query::id(lead_id).eq("tenant_id", tenant_id);
    let doc = repo
        .fetch_one(Table::Leads, &query)
        .await?
        .ok_or_else(|| SyncError::validation("lead_id", format!("lead {} not found", lead_id)))?;

    let mut lead: CanonicalLead = from_document(doc)?;
    if let Some(account_id) = lead.account_id.clone() {
        lead.account = load_account(repo, tenant_id, &account_id).await?;
    }
    Ok(lead)
}

pub async fn load_account(
    repo: &dyn Repository,
    tenant_id: &str,
    account_id: &str,
) -> Result<Option<CanonicalAccount>> {
    let query = Query::id(account_id).eq("tenant_id", tenant_id);
    repo.fetch_one(Table::Accounts, &query)
        .await?
        .map(from_document)
        .transpose()
}

/// Writes that persist a lead (and its account, stored on its own row)
pub fn lead_write_ops(lead: &CanonicalLead) -> Result<Vec<WriteOp>> {
    let mut ops = Vec::new();
    let mut stored = lead.clone();

    if let Some(account) = stored.account.take() {
        stored.account_id = Some(account.account_id.clone());
        ops.push(WriteOp::Upsert {
            table: Table::Accounts,
            object: to_document(&account)?,
        });
    }

    ops.push(WriteOp::Upsert {
        table: Table::Leads,
        object: to_document(&stored)?,
    });
    Ok(ops)
}

pub async fn save_lead(repo: &dyn Repository, lead: &CanonicalLead) -> Result<()> {
    repo.transact(lead_write_ops(lead)?).await
}

pub async fn save_account(repo: &dyn Repository, account: &CanonicalAccount) -> Result<()> {
    repo.transact(vec![WriteOp::Upsert {
        table: Table::Accounts,
        object: to_document(account)?,
    }])
    .await
}

// ============================================================================
// PER-LEAD WRITE SERIALIZATION
// ============================================================================

/// One async mutex per lead id. Every read-modify-write of a lead's contact
/// lists or status runs while holding its guard. An entry lives only while a
/// guard holds it or a task waits on it.
#[derive(Clone, Default)]
pub struct LeadLocks {
    inner: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LeadLocks {
    pub fn new() -> Self {
        LeadLocks::default()
    }

    pub async fn acquire(&self, lead_id: &str) -> LeadGuard {
        let mutex = self
            .inner
            .entry(lead_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        LeadGuard {
            lead_id: lead_id.to_string(),
            inner: self.inner.clone(),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held lock on one lead
pub struct LeadGuard {
    lead_id: String,
    inner: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for LeadGuard {
    fn drop(&mut self) {
        // Map entry + this guard: nobody else holds or waits on the mutex.
        // `remove_if` runs under the shard lock `acquire` clones from.
        self.inner
            .remove_if(&self.lead_id, |_, mutex| Arc::strong_count(mutex) == 2);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::IntegrationType;
    use serde_json::json;

    fn repo() -> SqliteRepository {
        SqliteRepository::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_fetches() {
        let repo = repo();
        let created = repo
            .create(Table::Webhooks, json!({"tenant_id": "t1", "url": "https://hook"}))
            .await
            .unwrap();

        let id = created["id"].as_str().unwrap().to_string();
        assert!(!id.is_empty());

        let fetched = repo.fetch_one(Table::Webhooks, &Query::id(&id)).await.unwrap();
        assert_eq!(fetched.unwrap()["url"], "https://hook");
    }

    #[tokio::test]
    async fn test_query_filters_on_document_fields() {
        let repo = repo();
        repo.create(Table::Tasks, json!({"tenant_id": "t1", "lead_id": "a", "completed": false}))
            .await
            .unwrap();
        repo.create(Table::Tasks, json!({"tenant_id": "t1", "lead_id": "a", "completed": true}))
            .await
            .unwrap();
        repo.create(Table::Tasks, json!({"tenant_id": "t2", "lead_id": "a", "completed": false}))
            .await
            .unwrap();

        let open = Query::tenant("t1").eq("lead_id", "a").eq("completed", false);
        assert_eq!(repo.count(Table::Tasks, &open).await.unwrap(), 1);
        assert_eq!(repo.count(Table::Tasks, &Query::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_merges_and_destroy_removes() {
        let repo = repo();
        let doc = repo
            .create(Table::Users, json!({"tenant_id": "t1", "name": "rep", "active": true}))
            .await
            .unwrap();
        let id = doc["id"].as_str().unwrap();

        let updated = repo
            .update(Table::Users, &Query::id(id), json!({"active": false}))
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let fetched = repo.fetch_one(Table::Users, &Query::id(id)).await.unwrap().unwrap();
        assert_eq!(fetched["active"], false);
        assert_eq!(fetched["name"], "rep");

        assert_eq!(repo.destroy(Table::Users, &Query::id(id)).await.unwrap(), 1);
        assert!(repo.fetch_one(Table::Users, &Query::id(id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_below_stops_at_limit() {
        let repo = repo();
        repo.create(
            Table::EnrichmentConfigs,
            json!({"id": "cfg", "tenant_id": "t1", "api_calls": 1, "api_limit": 2}),
        )
        .await
        .unwrap();

        let q = Query::id("cfg");
        assert!(repo
            .increment_below(Table::EnrichmentConfigs, &q, "api_calls", "api_limit")
            .await
            .unwrap());
        assert!(!repo
            .increment_below(Table::EnrichmentConfigs, &q, "api_calls", "api_limit")
            .await
            .unwrap());

        let doc = repo.fetch_one(Table::EnrichmentConfigs, &q).await.unwrap().unwrap();
        assert_eq!(doc["api_calls"], 2);
    }

    #[tokio::test]
    async fn test_transact_is_all_or_nothing() {
        let repo = repo();
        repo.create(Table::Leads, json!({"id": "dup", "tenant_id": "t1"}))
            .await
            .unwrap();

        let result = repo
            .transact(vec![
                WriteOp::Create {
                    table: Table::Tasks,
                    object: json!({"id": "task-1", "tenant_id": "t1"}),
                },
                // Conflicts with the existing row
                WriteOp::Create {
                    table: Table::Leads,
                    object: json!({"id": "dup", "tenant_id": "t1"}),
                },
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(repo.count(Table::Tasks, &Query::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_and_load_lead_with_account() {
        let repo = repo();
        let mut lead = CanonicalLead::new("t1", IntegrationType::SalesforceLead);
        let mut account = CanonicalAccount::new("t1", IntegrationType::SalesforceAccount);
        account.name = Some("Acme".to_string());
        lead.account = Some(account.clone());

        save_lead(&repo, &lead).await.unwrap();

        let stored = repo
            .fetch_one(Table::Leads, &Query::id(&lead.lead_id))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.get("account").is_none());
        assert_eq!(stored["account_id"], json!(account.account_id));

        let loaded = load_lead(&repo, "t1", &lead.lead_id).await.unwrap();
        assert_eq!(loaded.account.unwrap().name.as_deref(), Some("Acme"));

        let missing = load_lead(&repo, "t2", &lead.lead_id).await;
        assert!(matches!(missing, Err(SyncError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_lead_locks_serialize_and_release() {
        let locks = LeadLocks::new();
        let guard = locks.acquire("lead-1").await;
        assert_eq!(locks.len(), 1);

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.acquire("lead-1").await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // Waiter still queued: the entry must survive the first release
        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_lead_locks_do_not_accumulate() {
        let locks = LeadLocks::new();
        let mut tasks = Vec::new();
        for i in 0..100 {
            let locks = locks.clone();
            tasks.push(tokio::spawn(async move {
                let lead_id = format!("lead-{}", i % 10);
                let _g = locks.acquire(&lead_id).await;
                tokio::task::yield_now().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(locks.is_empty());
    }
}
