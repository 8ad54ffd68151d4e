// 👤 Lead Entity - tenant-agnostic view of a CRM lead/contact/person/candidate
//
// Identity: lead_id (UUID, never changes)
// Link to the external system: integration_type + integration_id
// Contact points: emails / phones, see `crate::contacts` for the invariants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::CanonicalAccount;
use super::contact::{ContactEntry, ContactKind};
use super::integration::IntegrationType;

/// Canonical scalar fields of a lead, in projection order
pub const LEAD_FIELDS: [&str; 5] = [
    "first_name",
    "last_name",
    "job_position",
    "linkedin_url",
    "integration_status",
];

// ============================================================================
// LEAD STATUS
// ============================================================================

/// Local lifecycle state, independent of the provider's status label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    Active,
    /// Disqualified, no further cadence work
    Trashed,
    Converted,
}

// ============================================================================
// CANONICAL LEAD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLead {
    /// Stable identity (UUID)
    #[serde(rename = "id")]
    pub lead_id: String,

    pub tenant_id: String,

    /// Owning sales rep
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub job_position: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,

    #[serde(default)]
    pub account_id: Option<String>,

    /// Owning account, loaded alongside the lead. Persisted separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<CanonicalAccount>,

    #[serde(default)]
    pub emails: Vec<ContactEntry>,
    #[serde(default)]
    pub phones: Vec<ContactEntry>,

    pub integration_type: IntegrationType,
    #[serde(default)]
    pub integration_id: Option<String>,
    /// Free-text external status label
    #[serde(default)]
    pub integration_status: Option<String>,

    /// Opaque passthrough merged into every outbound payload
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub score: i64,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CanonicalLead {
    pub fn new(tenant_id: impl Into<String>, integration_type: IntegrationType) -> Self {
        CanonicalLead {
            lead_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            user_id: None,
            first_name: None,
            last_name: None,
            job_position: None,
            linkedin_url: None,
            account_id: None,
            account: None,
            emails: Vec::new(),
            phones: Vec::new(),
            integration_type,
            integration_id: None,
            integration_status: None,
            variables: serde_json::Map::new(),
            status: LeadStatus::Active,
            score: 0,
            updated_at: Utc::now(),
        }
    }

    /// Read a canonical scalar by name
    pub fn scalar(&self, field: &str) -> Option<&str> {
        let value = match field {
            "first_name" => &self.first_name,
            "last_name" => &self.last_name,
            "job_position" => &self.job_position,
            "linkedin_url" => &self.linkedin_url,
            "integration_status" => &self.integration_status,
            _ => return None,
        };
        value.as_deref()
    }

    /// Write a canonical scalar by name. Returns false for unknown fields.
    pub fn set_scalar(&mut self, field: &str, value: Option<String>) -> bool {
        let slot = match field {
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "job_position" => &mut self.job_position,
            "linkedin_url" => &mut self.linkedin_url,
            "integration_status" => &mut self.integration_status,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn contacts(&self, kind: ContactKind) -> &Vec<ContactEntry> {
        match kind {
            ContactKind::Email => &self.emails,
            ContactKind::Phone => &self.phones,
        }
    }

    pub fn contacts_mut(&mut self, kind: ContactKind) -> &mut Vec<ContactEntry> {
        match kind {
            ContactKind::Email => &mut self.emails,
            ContactKind::Phone => &mut self.phones,
        }
    }

    /// Primary entry of a collection, if any
    pub fn primary(&self, kind: ContactKind) -> Option<&ContactEntry> {
        self.contacts(kind).iter().find(|e| e.is_primary)
    }

    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_active(&self) -> bool {
        self.status == LeadStatus::Active
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// TESTS
// ============================================================================
