// 📦 Bulk Operations - bounded worker pool with per-item results
//
// Every item runs as its own task, at most `concurrency` at a time. A failing
// item never stops the others; the caller gets a report listing what
// succeeded and why each failure happened.

use futures::future::join_all;
use serde_json::json;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::entities::{CanonicalLead, IntegrationType, LeadDelta};
use crate::error::{Result, SyncError};
use crate::projection::export_csv;
use crate::sync::SyncEngine;

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug)]
pub struct BulkFailure {
    pub item: String,
    pub error: SyncError,
}

#[derive(Debug)]
pub struct BulkReport<T> {
    /// (item, result) in input order
    pub succeeded: Vec<(String, T)>,
    /// Failures in input order
    pub failed: Vec<BulkFailure>,
}

impl<T> BulkReport<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Summary for logs and CLI output
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "total": self.total(),
            "succeeded": self.succeeded.len(),
            "failed": self.failed.iter().map(|f| json!({
                "item": f.item,
                "kind": f.error.kind(),
                "error": f.error.to_string(),
            })).collect::<Vec<_>>(),
        })
    }
}

// ============================================================================
// POOL
// ============================================================================

/// Run `op` over every item with at most `concurrency` in flight
pub async fn run_bounded<I, T, K, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    key: K,
    op: F,
) -> BulkReport<T>
where
    I: Send + 'static,
    T: Send + 'static,
    K: Fn(&I) -> String,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let op = Arc::new(op);
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let label = key(&item);
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                handles.push((label, None));
                continue;
            }
        };
        let op = op.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            op(item).await
        });
        handles.push((label, Some(handle)));
    }

    let outcomes = join_all(handles.into_iter().map(|(item, handle)| async move {
        let outcome = match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(join) => Err(SyncError::Storage(format!("worker task failed: {}", join))),
            },
            None => Err(SyncError::Storage("worker pool closed".to_string())),
        };
        (item, outcome)
    }))
    .await;

    let mut report = BulkReport {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for (item, outcome) in outcomes {
        match outcome {
            Ok(value) => report.succeeded.push((item, value)),
            Err(error) => {
                warn!(item = %item, error = %error, "bulk item failed");
                report.failed.push(BulkFailure { item, error });
            }
        }
    }
    report
}

// ============================================================================
// LEAD OPERATIONS
// ============================================================================

pub async fn delete_many(
    engine: &SyncEngine,
    tenant_id: &str,
    lead_ids: Vec<String>,
    concurrency: usize,
) -> BulkReport<()> {
    let engine = engine.clone();
    let tenant = tenant_id.to_string();
    let report = run_bounded(lead_ids, concurrency, String::clone, move |lead_id| {
        let engine = engine.clone();
        let tenant = tenant.clone();
        async move { engine.delete_lead(&tenant, &lead_id).await }
    })
    .await;
    info!(tenant_id, total = report.total(), failed = report.failed.len(), "bulk delete");
    report
}

pub async fn push_many(
    engine: &SyncEngine,
    tenant_id: &str,
    changes: Vec<(String, LeadDelta)>,
    concurrency: usize,
) -> BulkReport<CanonicalLead> {
    let engine = engine.clone();
    let tenant = tenant_id.to_string();
    let report = run_bounded(
        changes,
        concurrency,
        |(lead_id, _)| lead_id.clone(),
        move |(lead_id, delta)| {
            let engine = engine.clone();
            let tenant = tenant.clone();
            async move { engine.push_lead(&tenant, &lead_id, &delta).await }
        },
    )
    .await;
    info!(tenant_id, total = report.total(), failed = report.failed.len(), "bulk push");
    report
}

pub async fn reassign_many(
    engine: &SyncEngine,
    tenant_id: &str,
    lead_ids: Vec<String>,
    user_id: &str,
    concurrency: usize,
) -> BulkReport<CanonicalLead> {
    let engine = engine.clone();
    let tenant = tenant_id.to_string();
    let user = user_id.to_string();
    let report = run_bounded(lead_ids, concurrency, String::clone, move |lead_id| {
        let engine = engine.clone();
        let tenant = tenant.clone();
        let user = user.clone();
        async move { engine.reassign_lead(&tenant, &lead_id, &user).await }
    })
    .await;
    info!(tenant_id, user_id, total = report.total(), failed = report.failed.len(), "bulk reassign");
    report
}

/// Load leads through the pool and write the ones found as CSV, projected
/// with the map serving `integration_type`
pub async fn export_many<W: Write>(
    engine: &SyncEngine,
    tenant_id: &str,
    lead_ids: Vec<String>,
    integration_type: IntegrationType,
    writer: W,
    concurrency: usize,
) -> Result<BulkReport<()>> {
    let map = engine.resolver().resolve_for(tenant_id, integration_type).await?;

    let loader = engine.clone();
    let tenant = tenant_id.to_string();
    let loaded = run_bounded(lead_ids, concurrency, String::clone, move |lead_id| {
        let engine = loader.clone();
        let tenant = tenant.clone();
        async move { engine.load_lead(&tenant, &lead_id).await }
    })
    .await;

    let leads: Vec<CanonicalLead> = loaded.succeeded.iter().map(|(_, lead)| lead.clone()).collect();
    let written = export_csv(writer, &map, &leads)?;
    info!(tenant_id, written, failed = loaded.failed.len(), "bulk export");

    Ok(BulkReport {
        succeeded: loaded.succeeded.into_iter().map(|(id, _)| (id, ())).collect(),
        failed: loaded.failed,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{save_lead, LeadLocks, Repository, SqliteRepository};
    use crate::entities::{FieldValue, ObjectKind, Provider};
    use crate::field_map::{FieldMap, FieldMapResolver};
    use crate::test_support::ScriptedRpc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn engine_with_leads(count: usize) -> (SyncEngine, Vec<String>) {
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let map = FieldMap::new("t1", Provider::Pipedrive, ObjectKind::Person)
            .with_field("first_name", "first_name")
            .with_list("emails", &["email"]);
        FieldMapResolver::new(repo.clone()).save(&map).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..count {
            let mut lead = CanonicalLead::new("t1", IntegrationType::PipedrivePerson);
            lead.first_name = Some(format!("Lead {}", i));
            lead.integration_id = Some(format!("{}", 100 + i));
            save_lead(repo.as_ref(), &lead).await.unwrap();
            ids.push(lead.lead_id);
        }

        let engine = SyncEngine::new(
            repo,
            Arc::new(ScriptedRpc::new()),
            LeadLocks::new(),
            Duration::from_secs(1),
        );
        (engine, ids)
    }

    #[tokio::test]
    async fn test_pool_respects_concurrency_and_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..12).collect();

        let (flight, top) = (in_flight.clone(), peak.clone());
        let report = run_bounded(items, 3, |i| i.to_string(), move |i| {
            let (flight, top) = (flight.clone(), top.clone());
            async move {
                let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                top.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                flight.fetch_sub(1, Ordering::SeqCst);
                if i % 4 == 0 {
                    Err(SyncError::validation("item", "rejected"))
                } else {
                    Ok(i * 10)
                }
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(report.total(), 12);
        assert_eq!(report.failed.len(), 3);
        assert_eq!(report.failed[0].item, "0");
        assert_eq!(report.succeeded[0], ("1".to_string(), 10));
        assert!(!report.is_complete_success());
    }

    #[tokio::test]
    async fn test_delete_many_reports_missing_items() {
        let (engine, mut ids) = engine_with_leads(3).await;
        ids.push("missing".to_string());

        let report = delete_many(&engine, "t1", ids, 2).await;
        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].item, "missing");
        assert_eq!(report.summary()["failed"][0]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_push_many_and_reassign_many() {
        let (engine, ids) = engine_with_leads(2).await;
        engine
            .repo()
            .create(crate::db::Table::Users, json!({"id": "u2", "tenant_id": "t1"}))
            .await
            .unwrap();

        let changes = ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    LeadDelta {
                        first_name: FieldValue::Set("Renamed".to_string()),
                        ..Default::default()
                    },
                )
            })
            .collect();
        let pushed = push_many(&engine, "t1", changes, 4).await;
        assert!(pushed.is_complete_success());
        assert!(pushed
            .succeeded
            .iter()
            .all(|(_, lead)| lead.first_name.as_deref() == Some("Renamed")));

        let reassigned = reassign_many(&engine, "t1", ids.clone(), "u2", 4).await;
        assert!(reassigned.is_complete_success());
        let unknown = reassign_many(&engine, "t1", ids, "nobody", 4).await;
        assert_eq!(unknown.failed.len(), 2);
    }

    #[tokio::test]
    async fn test_export_many_writes_found_leads() {
        let (engine, mut ids) = engine_with_leads(2).await;
        ids.insert(1, "missing".to_string());

        let mut out = Vec::new();
        let report = export_many(
            &engine,
            "t1",
            ids,
            IntegrationType::PipedriveCsvPerson,
            &mut out,
            2,
        )
        .await
        .unwrap();

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("lead_id,first_name"));
    }
}
