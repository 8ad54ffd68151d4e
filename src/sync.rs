// 🔁 Sync Engine - canonical deltas in, CRM payloads out (and back)
//
// Push: delta → field map → payload → CRM → persist
// Pull: CRM record → field map → fragment → persist
//
// Ordering per lead:
// - the lead lock is held for the whole read-modify-write
// - contact-list invariants are checked on a working copy BEFORE the CRM call
// - the canonical record is saved only after the CRM accepted the change, so
//   a timeout or an aborted caller leaves it in its previous state

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::contacts;
use crate::db::{
    load_account, load_lead, save_account, save_lead, LeadLocks, Query, Repository, Table,
    WriteOp,
};
use crate::entities::{
    AccountDelta, CanonicalAccount, CanonicalLead, ContactKind, LeadDelta, ACCOUNT_FIELDS,
    LEAD_FIELDS,
};
use crate::error::{Result, SyncError};
use crate::field_map::{FieldMap, FieldMapResolver};
use crate::projection::{from_external, to_external, CanonicalFragment};
use crate::rpc::{call_with_timeout, IntegrationRpc, RpcOperation};

const CONTACT_KINDS: [ContactKind; 2] = [ContactKind::Email, ContactKind::Phone];

// ============================================================================
// APPLYING CHANGES TO CANONICAL RECORDS
// ============================================================================

/// Fold a delta into a lead. Contact batches go through `upsert_many`.
pub fn apply_lead_delta(lead: &mut CanonicalLead, delta: &LeadDelta) -> Result<()> {
    for field in LEAD_FIELDS {
        if let Some(update) = delta.scalar(field).into_update() {
            lead.set_scalar(field, update.cloned());
        }
    }
    for kind in CONTACT_KINDS {
        if let Some(batch) = delta.contacts(kind) {
            contacts::upsert_many(kind, lead.contacts_mut(kind), batch)?;
        }
    }
    if let Some(variables) = &delta.variables {
        for (key, value) in variables {
            lead.variables.insert(key.clone(), value.clone());
        }
    }
    lead.touch();
    Ok(())
}

pub fn apply_account_delta(account: &mut CanonicalAccount, delta: &AccountDelta) {
    for field in ACCOUNT_FIELDS {
        if let Some(update) = delta.scalar(field).into_update() {
            account.set_scalar(field, update.cloned());
        }
    }
    if let Some(variables) = &delta.variables {
        for (key, value) in variables {
            account.variables.insert(key.clone(), value.clone());
        }
    }
    account.touch();
}

/// Fold a pulled fragment into a lead. Fields the CRM did not return are
/// left alone.
pub fn apply_fragment(lead: &mut CanonicalLead, fragment: &CanonicalFragment) -> Result<()> {
    for (field, value) in &fragment.fields {
        lead.set_scalar(field, Some(value.clone()));
    }
    for kind in CONTACT_KINDS {
        let pulled = fragment.contacts(kind);
        if pulled.is_empty() {
            continue;
        }
        let mut batch = pulled.clone();
        // First pulled entry becomes primary when the lead has none yet
        if lead.primary(kind).is_none() {
            if let Some(first) = batch.iter_mut().find(|e| e.has_value()) {
                first.is_primary = true;
            }
        }
        contacts::upsert_many(kind, lead.contacts_mut(kind), &batch)?;
    }
    lead.touch();
    Ok(())
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Clone)]
pub struct SyncEngine {
    repo: Arc<dyn Repository>,
    rpc: Arc<dyn IntegrationRpc>,
    resolver: FieldMapResolver,
    locks: LeadLocks,
    rpc_timeout: Duration,
}

impl SyncEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        rpc: Arc<dyn IntegrationRpc>,
        locks: LeadLocks,
        rpc_timeout: Duration,
    ) -> Self {
        SyncEngine {
            resolver: FieldMapResolver::new(repo.clone()),
            repo,
            rpc,
            locks,
            rpc_timeout,
        }
    }

    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    pub fn resolver(&self) -> &FieldMapResolver {
        &self.resolver
    }

    async fn write_external(
        &self,
        tenant_id: &str,
        map: &FieldMap,
        external_id: &str,
        payload: Map<String, Value>,
    ) -> Result<()> {
        let operation = RpcOperation::update(map.object_kind);
        call_with_timeout(
            self.rpc.as_ref(),
            self.rpc_timeout,
            tenant_id,
            map.provider,
            operation,
            json!({"id": external_id, "fields": payload}),
        )
        .await?;
        Ok(())
    }

    /// Push a lead delta to the CRM and persist it.
    ///
    /// CSV / spreadsheet leads and leads without an external id are only
    /// persisted.
    pub async fn push_lead(
        &self,
        tenant_id: &str,
        lead_id: &str,
        delta: &LeadDelta,
    ) -> Result<CanonicalLead> {
        let _guard = self.locks.acquire(lead_id).await;

        let lead = load_lead(self.repo.as_ref(), tenant_id, lead_id).await?;
        let map = self.resolver.resolve_for(tenant_id, lead.integration_type).await?;

        let mut updated = lead.clone();
        apply_lead_delta(&mut updated, delta)?;

        let payload = to_external(&map, delta);
        match lead.integration_id.as_deref() {
            Some(external_id)
                if lead.integration_type.has_external_record() && !payload.is_empty() =>
            {
                self.write_external(tenant_id, &map, external_id, payload).await?;
                info!(lead_id, provider = %map.provider, "lead pushed");
            }
            _ => debug!(lead_id, "no external write for lead"),
        }

        save_lead(self.repo.as_ref(), &updated).await?;
        Ok(updated)
    }

    /// Push an account delta with the provider's account-like map
    pub async fn push_account(
        &self,
        tenant_id: &str,
        account_id: &str,
        delta: &AccountDelta,
    ) -> Result<CanonicalAccount> {
        let account = load_account(self.repo.as_ref(), tenant_id, account_id)
            .await?
            .ok_or_else(|| {
                SyncError::validation("account_id", format!("account {} not found", account_id))
            })?;
        let map = self
            .resolver
            .resolve_for(tenant_id, account.integration_type)
            .await?;

        let mut updated = account.clone();
        apply_account_delta(&mut updated, delta);

        let payload = to_external(&map, delta);
        if let Some(external_id) = account.integration_id.as_deref() {
            if account.integration_type.has_external_record() && !payload.is_empty() {
                self.write_external(tenant_id, &map, external_id, payload).await?;
                info!(account_id, provider = %map.provider, "account pushed");
            }
        }

        save_account(self.repo.as_ref(), &updated).await?;
        Ok(updated)
    }

    /// Read the lead from the CRM and fold the mapped fields in
    pub async fn pull_lead(&self, tenant_id: &str, lead_id: &str) -> Result<CanonicalLead> {
        let _guard = self.locks.acquire(lead_id).await;

        let lead = load_lead(self.repo.as_ref(), tenant_id, lead_id).await?;
        let external_id = lead
            .integration_id
            .clone()
            .filter(|_| lead.integration_type.has_external_record())
            .ok_or_else(|| {
                SyncError::validation("integration_id", "lead has no external record")
            })?;
        let map = self.resolver.resolve_for(tenant_id, lead.integration_type).await?;

        let record = call_with_timeout(
            self.rpc.as_ref(),
            self.rpc_timeout,
            tenant_id,
            map.provider,
            RpcOperation::fetch(map.object_kind)?,
            json!({"id": external_id}),
        )
        .await?;

        let fragment = from_external(&map, &record);
        let mut updated = lead.clone();
        apply_fragment(&mut updated, &fragment)?;
        save_lead(self.repo.as_ref(), &updated).await?;

        info!(lead_id, fields = fragment.fields.len(), "lead pulled");
        Ok(updated)
    }

    /// Remove a lead and its tasks. The account stays.
    pub async fn delete_lead(&self, tenant_id: &str, lead_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(lead_id).await;

        let query = Query::id(lead_id).eq("tenant_id", tenant_id);
        if self.repo.count(Table::Leads, &query).await? == 0 {
            return Err(SyncError::validation(
                "lead_id",
                format!("lead {} not found", lead_id),
            ));
        }

        self.repo
            .transact(vec![
                WriteOp::Destroy {
                    table: Table::Tasks,
                    query: Query::tenant(tenant_id).eq("lead_id", lead_id),
                },
                WriteOp::Destroy {
                    table: Table::Leads,
                    query,
                },
            ])
            .await?;
        info!(lead_id, "lead deleted");
        Ok(())
    }

    /// Move a lead to another user
    pub async fn reassign_lead(
        &self,
        tenant_id: &str,
        lead_id: &str,
        user_id: &str,
    ) -> Result<CanonicalLead> {
        let _guard = self.locks.acquire(lead_id).await;

        let users = Query::id(user_id).eq("tenant_id", tenant_id);
        if self.repo.count(Table::Users, &users).await? == 0 {
            return Err(SyncError::validation(
                "user_id",
                format!("user {} not found", user_id),
            ));
        }

        let mut lead = load_lead(self.repo.as_ref(), tenant_id, lead_id).await?;
        lead.user_id = Some(user_id.to_string());
        lead.touch();
        save_lead(self.repo.as_ref(), &lead).await?;
        Ok(lead)
    }

    pub async fn load_lead(&self, tenant_id: &str, lead_id: &str) -> Result<CanonicalLead> {
        load_lead(self.repo.as_ref(), tenant_id, lead_id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRepository;
    use crate::entities::{ContactEntry, FieldValue, IntegrationType, ObjectKind, Provider};
    use crate::test_support::ScriptedRpc;

    async fn setup(rpc: ScriptedRpc) -> (SyncEngine, Arc<ScriptedRpc>, CanonicalLead) {
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let map = FieldMap::new("t1", Provider::Salesforce, ObjectKind::Lead)
            .with_field("first_name", "FirstName")
            .with_field("last_name", "LastName")
            .with_field("job_position", "Title")
            .with_list("emails", &["Email", "SecondaryEmail"]);
        FieldMapResolver::new(repo.clone()).save(&map).await.unwrap();

        let mut lead = CanonicalLead::new("t1", IntegrationType::SalesforceLead);
        lead.integration_id = Some("00Q1".to_string());
        lead.first_name = Some("Ada".to_string());
        lead.job_position = Some("Analyst".to_string());
        lead.emails.push(ContactEntry::primary("Email", "a@x.com"));
        save_lead(repo.as_ref(), &lead).await.unwrap();

        let rpc = Arc::new(rpc);
        let engine = SyncEngine::new(repo, rpc.clone(), LeadLocks::new(), Duration::from_millis(100));
        (engine, rpc, lead)
    }

    #[tokio::test]
    async fn test_push_lead_projects_only_the_delta() {
        let (engine, rpc, lead) = setup(ScriptedRpc::new()).await;
        let delta = LeadDelta {
            last_name: FieldValue::Set("Lovelace".to_string()),
            job_position: FieldValue::Clear,
            ..Default::default()
        };

        let updated = engine.push_lead("t1", &lead.lead_id, &delta).await.unwrap();
        assert_eq!(updated.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(updated.job_position, None);
        assert_eq!(updated.first_name.as_deref(), Some("Ada"));

        let calls = rpc.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, RpcOperation::UpdateLead);
        assert_eq!(
            calls[0].2,
            json!({"id": "00Q1", "fields": {"LastName": "Lovelace", "Title": null}})
        );
    }

    #[tokio::test]
    async fn test_push_lead_failure_keeps_stored_lead() {
        let (engine, _, lead) = setup(ScriptedRpc::new().fail(RpcOperation::UpdateLead, "INVALID_FIELD")).await;
        let delta = LeadDelta {
            first_name: FieldValue::Set("Grace".to_string()),
            ..Default::default()
        };

        let err = engine.push_lead("t1", &lead.lead_id, &delta).await.unwrap_err();
        assert!(matches!(err, SyncError::ExternalCallFailure { .. }));
        let stored = engine.load_lead("t1", &lead.lead_id).await.unwrap();
        assert_eq!(stored.first_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_push_lead_timeout_keeps_stored_lead() {
        let (engine, _, lead) =
            setup(ScriptedRpc::new().with_delay(Duration::from_millis(500))).await;
        let delta = LeadDelta {
            first_name: FieldValue::Set("Grace".to_string()),
            ..Default::default()
        };

        let err = engine.push_lead("t1", &lead.lead_id, &delta).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { .. }));
        let stored = engine.load_lead("t1", &lead.lead_id).await.unwrap();
        assert_eq!(stored.first_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_invalid_contact_batch_never_reaches_crm() {
        let (engine, rpc, lead) = setup(ScriptedRpc::new()).await;
        let delta = LeadDelta {
            emails: Some(vec![
                ContactEntry::primary("Email", "one@x.com"),
                ContactEntry::primary("SecondaryEmail", "two@x.com"),
            ]),
            ..Default::default()
        };

        let err = engine.push_lead("t1", &lead.lead_id, &delta).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_csv_lead_is_only_persisted() {
        let (engine, rpc, _) = setup(ScriptedRpc::new()).await;
        let mut csv_lead = CanonicalLead::new("t1", IntegrationType::SalesforceCsvLead);
        csv_lead.first_name = Some("Grace".to_string());
        save_lead(engine.repo().as_ref(), &csv_lead).await.unwrap();

        let delta = LeadDelta {
            last_name: FieldValue::Set("Hopper".to_string()),
            ..Default::default()
        };
        let updated = engine.push_lead("t1", &csv_lead.lead_id, &delta).await.unwrap();
        assert_eq!(updated.last_name.as_deref(), Some("Hopper"));
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pull_lead_merges_without_clearing() {
        let rpc = ScriptedRpc::new().respond(
            RpcOperation::GetLead,
            json!({"Id": "00Q1", "LastName": "Lovelace", "SecondaryEmail": "ada@home.org"}),
        );
        let (engine, _, lead) = setup(rpc).await;

        let pulled = engine.pull_lead("t1", &lead.lead_id).await.unwrap();
        assert_eq!(pulled.first_name.as_deref(), Some("Ada"));
        assert_eq!(pulled.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(pulled.emails.len(), 2);
        assert_eq!(pulled.primary(ContactKind::Email).unwrap().value, "a@x.com");
    }

    #[tokio::test]
    async fn test_delete_lead_keeps_account() {
        let (engine, _, mut lead) = setup(ScriptedRpc::new()).await;
        let account = CanonicalAccount::new("t1", IntegrationType::SalesforceAccount);
        lead.account = Some(account.clone());
        save_lead(engine.repo().as_ref(), &lead).await.unwrap();

        engine.delete_lead("t1", &lead.lead_id).await.unwrap();
        assert!(engine.load_lead("t1", &lead.lead_id).await.is_err());
        assert!(load_account(engine.repo().as_ref(), "t1", &account.account_id)
            .await
            .unwrap()
            .is_some());
        assert!(engine.delete_lead("t1", &lead.lead_id).await.is_err());
    }

    #[tokio::test]
    async fn test_push_account_uses_account_map() {
        let (engine, rpc, _) = setup(ScriptedRpc::new()).await;
        let map = FieldMap::new("t1", Provider::Salesforce, ObjectKind::Account)
            .with_field("name", "Name")
            .with_field("country", "BillingAddress.country");
        engine.resolver().save(&map).await.unwrap();

        let mut account = CanonicalAccount::new("t1", IntegrationType::SalesforceAccount);
        account.integration_id = Some("001A".to_string());
        save_account(engine.repo().as_ref(), &account).await.unwrap();

        let delta = AccountDelta {
            country: FieldValue::Set("France".to_string()),
            ..Default::default()
        };
        let updated = engine
            .push_account("t1", &account.account_id, &delta)
            .await
            .unwrap();
        assert_eq!(updated.country.as_deref(), Some("France"));

        let calls = rpc.calls();
        assert_eq!(calls[0].1, RpcOperation::UpdateAccount);
        assert_eq!(calls[0].2["fields"]["BillingAddress"]["country"], "France");
    }

    #[tokio::test]
    async fn test_lead_locks_released_after_lifecycle() {
        let (engine, _, _) = setup(ScriptedRpc::new()).await;
        let locks = LeadLocks::new();
        let engine = SyncEngine::new(
            engine.repo().clone(),
            Arc::new(ScriptedRpc::new()),
            locks.clone(),
            Duration::from_millis(100),
        );

        for i in 0..100 {
            let mut lead = CanonicalLead::new("t1", IntegrationType::SalesforceLead);
            lead.integration_id = Some(format!("00Q{}", i));
            save_lead(engine.repo().as_ref(), &lead).await.unwrap();

            let delta = LeadDelta {
                last_name: FieldValue::Set(format!("Lead {}", i)),
                ..Default::default()
            };
            engine.push_lead("t1", &lead.lead_id, &delta).await.unwrap();
            engine.delete_lead("t1", &lead.lead_id).await.unwrap();
        }

        assert!(locks.is_empty());
    }
}
