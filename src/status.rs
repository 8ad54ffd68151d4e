// 🚦 Status Transitions - one logical unit per lead status change
//
// Triggers: status update, disqualify, convert
//
// Sequence:
//   1. resolve the single matching webhook (none → ConfigurationMissing)
//      and check the target against the CRM status picklist
//   2. deliver the webhook
//   3. write the status to the CRM when the field map has a status field
//   4. commit the new integration_status (+ terminal side effects) atomically
//   5. scoring hook, best effort
//
// Any failure in 1-4 leaves the stored lead untouched. A failed webhook means
// the CRM is never written. Step 5 never rolls back the committed status.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::{
    from_document, lead_write_ops, load_lead, LeadLocks, Query, Repository, Table, WriteOp,
};
use crate::entities::{CanonicalLead, IntegrationType, LeadStatus};
use crate::error::{Result, SyncError};
use crate::field_map::{FieldMap, FieldMapResolver};
use crate::projection::set_path;
use crate::rpc::{call_with_timeout, IntegrationRpc, RpcOperation};
use crate::webhook::{find_webhook, WebhookPayload, WebhookSender, WebhookType};

// ============================================================================
// SETTINGS
// ============================================================================

/// Terminal status labels of one tenant for one base integration type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSettings {
    #[serde(default)]
    pub id: String,
    pub tenant_id: String,
    pub integration_type: IntegrationType,
    #[serde(default)]
    pub disqualified: Option<String>,
    #[serde(default)]
    pub converted: Option<String>,
    /// Score a disqualified lead drops to
    #[serde(default)]
    pub score_floor: i64,
}

impl StatusSettings {
    pub fn new(tenant_id: impl Into<String>, integration_type: IntegrationType) -> Self {
        StatusSettings {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            integration_type: integration_type.base(),
            disqualified: None,
            converted: None,
            score_floor: 0,
        }
    }

    fn empty(tenant_id: &str, integration_type: IntegrationType) -> Self {
        let mut settings = StatusSettings::new(tenant_id, integration_type);
        settings.id = String::new();
        settings
    }

    fn matches(label: &Option<String>, status: &str) -> bool {
        label.as_deref().map_or(false, |l| l.eq_ignore_ascii_case(status))
    }

    pub fn is_disqualified(&self, status: &str) -> bool {
        Self::matches(&self.disqualified, status)
    }

    pub fn is_converted(&self, status: &str) -> bool {
        Self::matches(&self.converted, status)
    }
}

pub async fn load_status_settings(
    repo: &dyn Repository,
    tenant_id: &str,
    integration_type: IntegrationType,
) -> Result<StatusSettings> {
    let base = integration_type.base();
    let query = Query::tenant(tenant_id).eq("integration_type", base.as_str());
    match repo.fetch_one(Table::StatusSettings, &query).await? {
        Some(doc) => from_document(doc),
        None => Ok(StatusSettings::empty(tenant_id, base)),
    }
}

// ============================================================================
// SCORING HOOK
// ============================================================================

#[async_trait]
pub trait ScoringHook: Send + Sync {
    /// Score delta for a status change
    async fn score_delta(
        &self,
        lead: &CanonicalLead,
        previous: Option<&str>,
        current: &str,
        map: &FieldMap,
    ) -> Result<i64>;
}

/// Points per status, read from the tenant's score settings:
/// `{"tenant_id": ..., "status_points": {"Working": 10, "Nurturing": -5}}`
pub struct StatusPointsHook {
    repo: Arc<dyn Repository>,
}

impl StatusPointsHook {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        StatusPointsHook { repo }
    }
}

#[async_trait]
impl ScoringHook for StatusPointsHook {
    async fn score_delta(
        &self,
        lead: &CanonicalLead,
        previous: Option<&str>,
        current: &str,
        map: &FieldMap,
    ) -> Result<i64> {
        if previous == Some(current) || map.field("integration_status").is_none() {
            return Ok(0);
        }
        let Some(doc) = self
            .repo
            .fetch_one(Table::ScoreSettings, &Query::tenant(&lead.tenant_id))
            .await?
        else {
            return Ok(0);
        };

        Ok(doc
            .get("status_points")
            .and_then(|points| points.get(current))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }
}

// ============================================================================
// TRANSITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to any provider-defined status
    Update { status: String },
    /// Move to the tenant's disqualified status
    Disqualify { reason: Option<String> },
    /// Move to the tenant's converted status
    Convert,
}

impl Transition {
    fn webhook_type(&self) -> WebhookType {
        match self {
            Transition::Update { .. } => WebhookType::Update,
            Transition::Disqualify { .. } => WebhookType::Disqualify,
            Transition::Convert => WebhookType::Convert,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            Transition::Disqualify { reason } => reason.clone(),
            _ => None,
        }
    }

    fn target(&self, settings: &StatusSettings) -> Result<String> {
        let (label, name) = match self {
            Transition::Update { status } => {
                if status.trim().is_empty() {
                    return Err(SyncError::validation("integration_status", "status is empty"));
                }
                return Ok(status.clone());
            }
            Transition::Disqualify { .. } => (&settings.disqualified, "disqualified"),
            Transition::Convert => (&settings.converted, "converted"),
        };
        label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                SyncError::missing(format!(
                    "{} status for {}",
                    name, settings.integration_type
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub lead: CanonicalLead,
    pub previous_status: Option<String>,
    /// Applied score delta, None when scoring failed or did not run
    pub score_delta: Option<i64>,
    pub tasks_stopped: usize,
}

pub struct StatusOrchestrator {
    repo: Arc<dyn Repository>,
    rpc: Arc<dyn IntegrationRpc>,
    webhooks: Arc<dyn WebhookSender>,
    scoring: Arc<dyn ScoringHook>,
    resolver: FieldMapResolver,
    locks: LeadLocks,
    rpc_timeout: Duration,
}

impl StatusOrchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        rpc: Arc<dyn IntegrationRpc>,
        webhooks: Arc<dyn WebhookSender>,
        scoring: Arc<dyn ScoringHook>,
        locks: LeadLocks,
        rpc_timeout: Duration,
    ) -> Self {
        StatusOrchestrator {
            resolver: FieldMapResolver::new(repo.clone()),
            repo,
            rpc,
            webhooks,
            scoring,
            locks,
            rpc_timeout,
        }
    }

    pub async fn transition(
        &self,
        tenant_id: &str,
        lead_id: &str,
        transition: Transition,
    ) -> Result<TransitionOutcome> {
        let _guard = self.locks.acquire(lead_id).await;

        let lead = load_lead(self.repo.as_ref(), tenant_id, lead_id).await?;
        let settings =
            load_status_settings(self.repo.as_ref(), tenant_id, lead.integration_type).await?;
        let target = transition.target(&settings)?;
        let object_kind = lead.integration_type.object_kind();

        // 1. webhook must exist before anything is written
        let webhook = find_webhook(
            self.repo.as_ref(),
            tenant_id,
            transition.webhook_type(),
            object_kind,
            &target,
        )
        .await?;

        let map = self.resolver.resolve_for(tenant_id, lead.integration_type).await?;
        let status_write = status_update(&lead, &map, &target)?;

        // 2. webhook delivery
        let payload = WebhookPayload {
            object_type: object_kind,
            id: lead
                .integration_id
                .clone()
                .unwrap_or_else(|| lead.lead_id.clone()),
            status: target.clone(),
            reason: transition.reason(),
        };
        self.webhooks.send(&webhook, &payload).await?;

        // 3. CRM status field
        if let Some(data) = status_write {
            self.push_status(&lead, data).await?;
        }

        // 4. commit
        let previous_status = lead.integration_status.clone();
        let mut updated = lead.clone();
        updated.integration_status = Some(target.clone());
        updated.touch();

        let terminal = if settings.is_disqualified(&target) {
            updated.status = LeadStatus::Trashed;
            updated.score = settings.score_floor;
            true
        } else if settings.is_converted(&target) {
            updated.status = LeadStatus::Converted;
            updated.score = 0;
            true
        } else {
            false
        };

        let mut tasks_stopped = 0;
        let mut ops = lead_write_ops(&updated)?;
        if terminal {
            let open_tasks = Query::tenant(tenant_id)
                .eq("lead_id", lead_id)
                .eq("completed", false);
            tasks_stopped = self.repo.count(Table::Tasks, &open_tasks).await?;
            ops.push(WriteOp::Update {
                table: Table::Tasks,
                query: open_tasks,
                patch: json!({"completed": true, "stopped_at": Utc::now().to_rfc3339()}),
            });
        }
        self.repo.transact(ops).await?;

        info!(
            lead_id,
            previous = previous_status.as_deref().unwrap_or(""),
            current = %target,
            tasks_stopped,
            "lead status changed"
        );

        if terminal {
            return Ok(TransitionOutcome {
                lead: updated,
                previous_status,
                score_delta: None,
                tasks_stopped,
            });
        }

        // 5. scoring, best effort
        let score_delta = match self
            .scoring
            .score_delta(&updated, previous_status.as_deref(), &target, &map)
            .await
        {
            Ok(delta) => self.apply_score(&mut updated, delta).await,
            Err(err) => {
                warn!(lead_id, error = %err, "scoring hook failed, status kept");
                None
            }
        };

        Ok(TransitionOutcome {
            lead: updated,
            previous_status,
            score_delta,
            tasks_stopped,
        })
    }

    async fn push_status(&self, lead: &CanonicalLead, data: Value) -> Result<()> {
        let base = lead.integration_type.base();
        call_with_timeout(
            self.rpc.as_ref(),
            self.rpc_timeout,
            &lead.tenant_id,
            base.provider(),
            RpcOperation::update(base.object_kind()),
            data,
        )
        .await?;
        Ok(())
    }

    async fn apply_score(&self, lead: &mut CanonicalLead, delta: i64) -> Option<i64> {
        if delta == 0 {
            return Some(0);
        }
        lead.score += delta;
        let patch = json!({"score": lead.score});
        match self
            .repo
            .update(Table::Leads, &Query::id(&lead.lead_id), patch)
            .await
        {
            Ok(_) => Some(delta),
            Err(err) => {
                warn!(lead_id = %lead.lead_id, error = %err, "score not saved");
                None
            }
        }
    }
}

/// CRM update for the status field, or None when nothing is written
/// externally. Rejects a target outside the field's picklist.
fn status_update(lead: &CanonicalLead, map: &FieldMap, target: &str) -> Result<Option<Value>> {
    let Some(spec) = map.field("integration_status") else {
        return Ok(None);
    };
    let Some(external_id) = lead.integration_id.as_deref() else {
        return Ok(None);
    };
    if !lead.integration_type.has_external_record() {
        return Ok(None);
    }
    if !spec.picklist_values.is_empty() && !spec.picklist_values.iter().any(|v| v == target) {
        return Err(SyncError::validation(
            "integration_status",
            format!("'{}' is not a value of {}", target, spec.name),
        ));
    }

    let mut fields = Map::new();
    set_path(&mut fields, &spec.name, Value::String(target.to_string()));
    Ok(Some(json!({"id": external_id, "fields": fields})))
}

// ============================================================================
// TESTS
// ============================================================================
