// 🏢 Account Entity - the company a lead works for
//
// Owned by zero-or-many leads. Deleting the last owning lead leaves the
// account in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::integration::IntegrationType;

/// Canonical scalar fields of an account, in projection order
pub const ACCOUNT_FIELDS: [&str; 8] = [
    "name",
    "url",
    "size",
    "country",
    "zipcode",
    "phone_number",
    "linkedin_url",
    "integration_status",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAccount {
    /// Stable identity (UUID)
    #[serde(rename = "id")]
    pub account_id: String,

    pub tenant_id: String,

    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub integration_status: Option<String>,

    /// Opaque passthrough merged into every outbound payload
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,

    /// External id, None until first sync
    #[serde(default)]
    pub integration_id: Option<String>,
    pub integration_type: IntegrationType,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CanonicalAccount {
    pub fn new(tenant_id: impl Into<String>, integration_type: IntegrationType) -> Self {
        CanonicalAccount {
            account_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            name: None,
            url: None,
            size: None,
            country: None,
            zipcode: None,
            phone_number: None,
            linkedin_url: None,
            integration_status: None,
            variables: serde_json::Map::new(),
            integration_id: None,
            integration_type,
            updated_at: Utc::now(),
        }
    }

    /// Read a canonical scalar by name
    pub fn scalar(&self, field: &str) -> Option<&str> {
        let value = match field {
            "name" => &self.name,
            "url" => &self.url,
            "size" => &self.size,
            "country" => &self.country,
            "zipcode" => &self.zipcode,
            "phone_number" => &self.phone_number,
            "linkedin_url" => &self.linkedin_url,
            "integration_status" => &self.integration_status,
            _ => return None,
        };
        value.as_deref()
    }

    /// Write a canonical scalar by name. Returns false for unknown fields.
    pub fn set_scalar(&mut self, field: &str, value: Option<String>) -> bool {
        let slot = match field {
            "name" => &mut self.name,
            "url" => &mut self.url,
            "size" => &mut self.size,
            "country" => &mut self.country,
            "zipcode" => &mut self.zipcode,
            "phone_number" => &mut self.phone_number,
            "linkedin_url" => &mut self.linkedin_url,
            "integration_status" => &mut self.integration_status,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_scalar_access() {
        let mut account = CanonicalAccount::new("tenant-1", IntegrationType::SalesforceAccount);
        assert!(account.set_scalar("name", Some("Acme".to_string())));
        assert!(account.set_scalar("zipcode", Some("75001".to_string())));
        assert!(!account.set_scalar("revenue", Some("1M".to_string())));

        assert_eq!(account.scalar("name"), Some("Acme"));
        assert_eq!(account.scalar("zipcode"), Some("75001"));
        assert_eq!(account.scalar("url"), None);
        assert_eq!(account.scalar("revenue"), None);
    }

    #[test]
    fn test_account_serializes_id() {
        let account = CanonicalAccount::new("tenant-1", IntegrationType::HubspotCompany);
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["id"], serde_json::json!(account.account_id));
        assert_eq!(json["integration_type"], "hubspot_company");
    }
}
