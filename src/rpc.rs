// 📡 Integration RPC - the single capability used to talk to a CRM/ATS
//
// The remote API clients live outside this crate. Every call goes through
// `IntegrationRpc::call(provider, operation, data)` and comes back as JSON or
// one of the external error categories:
// - ExternalAuthRequired: the tenant must reconnect the provider
// - ExternalCallFailure: the remote system rejected the call

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::entities::{ObjectKind, Provider};
use crate::error::{Result, SyncError};

// ============================================================================
// OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcOperation {
    GetLead,
    UpdateLead,
    GetContact,
    UpdateContact,
    GetAccount,
    UpdateAccount,
    CreateOpportunity,
    UpdateOpportunity,
    DeleteOpportunity,
    CreateNoteActivity,
    GetDuplicate,
    GetRelatedLead,
}

impl RpcOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcOperation::GetLead => "getLead",
            RpcOperation::UpdateLead => "updateLead",
            RpcOperation::GetContact => "getContact",
            RpcOperation::UpdateContact => "updateContact",
            RpcOperation::GetAccount => "getAccount",
            RpcOperation::UpdateAccount => "updateAccount",
            RpcOperation::CreateOpportunity => "createOpportunity",
            RpcOperation::UpdateOpportunity => "updateOpportunity",
            RpcOperation::DeleteOpportunity => "deleteOpportunity",
            RpcOperation::CreateNoteActivity => "createNoteActivity",
            RpcOperation::GetDuplicate => "getDuplicate",
            RpcOperation::GetRelatedLead => "getRelatedLead",
        }
    }

    /// Read operation for an object kind. Persons and candidates are
    /// contact-shaped, organizations and companies account-shaped.
    pub fn fetch(kind: ObjectKind) -> Result<Self> {
        match kind {
            ObjectKind::Lead => Ok(RpcOperation::GetLead),
            ObjectKind::Contact | ObjectKind::Person | ObjectKind::Candidate => {
                Ok(RpcOperation::GetContact)
            }
            ObjectKind::Account | ObjectKind::Company | ObjectKind::Organization => {
                Ok(RpcOperation::GetAccount)
            }
            ObjectKind::Deal | ObjectKind::Opportunity => Err(SyncError::validation(
                "object_kind",
                format!("no read operation for {}", kind),
            )),
        }
    }

    /// Write operation for an object kind
    pub fn update(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Lead => RpcOperation::UpdateLead,
            ObjectKind::Contact | ObjectKind::Person | ObjectKind::Candidate => {
                RpcOperation::UpdateContact
            }
            ObjectKind::Account | ObjectKind::Company | ObjectKind::Organization => {
                RpcOperation::UpdateAccount
            }
            ObjectKind::Deal | ObjectKind::Opportunity => RpcOperation::UpdateOpportunity,
        }
    }
}

impl fmt::Display for RpcOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// COLLABORATOR CONTRACT
// ============================================================================

#[async_trait]
pub trait IntegrationRpc: Send + Sync {
    /// Invoke one remote operation with the tenant's credentials
    async fn call(
        &self,
        tenant_id: &str,
        provider: Provider,
        operation: RpcOperation,
        data: Value,
    ) -> Result<Value>;
}

/// Call with a deadline. Elapsed deadlines surface as `Timeout`; the pending
/// call is dropped and nothing downstream of it runs.
pub async fn call_with_timeout(
    rpc: &dyn IntegrationRpc,
    timeout: Duration,
    tenant_id: &str,
    provider: Provider,
    operation: RpcOperation,
    data: Value,
) -> Result<Value> {
    debug!(tenant_id, %provider, %operation, "external call");

    match tokio::time::timeout(timeout, rpc.call(tenant_id, provider, operation, data)).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => {
            warn!(tenant_id, %provider, %operation, error = %err, "external call failed");
            Err(err)
        }
        Err(_) => {
            warn!(tenant_id, %provider, %operation, "external call timed out");
            Err(SyncError::Timeout {
                operation: format!("{} {}", provider, operation),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
