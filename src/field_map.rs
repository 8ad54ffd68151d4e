// 🗺️ Field Maps - tenant configuration as data
//
// A field map is a dictionary from canonical field name to the external
// system's field layout:
//   "first_name": "FirstName"                          → single field
//   "integration_status": {"name": "Status", ...}      → field with options
//   "emails": ["Email", "Secondary_Email__c"]          → ordered list, one per type
//
// Maps are stored per (tenant, provider, object kind) and resolved from the
// lead's integration_type after normalizing it to its base kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::db::{from_document, to_document, with_id, Query, Repository, Table, WriteOp};
use crate::entities::{IntegrationType, ObjectKind, Provider};
use crate::error::{Result, SyncError};

// ============================================================================
// FIELD MAPPING
// ============================================================================

/// How a string value is pulled out of a structured external value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Unwrap {
    /// `{value, label}` → value, list → primary or first element
    #[default]
    Auto,
    /// `{value, label}` → label
    Label,
    /// Use the value as-is, scalars only
    Raw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(default = "default_true")]
    pub editable: bool,

    /// External field type ("string", "picklist", "email", "number", ...)
    #[serde(rename = "type", default = "default_type")]
    pub field_type: String,

    #[serde(default)]
    pub unwrap: Unwrap,

    /// Allowed values for picklist-style fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub picklist_values: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_type() -> String {
    "string".to_string()
}

/// External types whose values round-trip as text
const STRING_TYPES: [&str; 10] = [
    "string", "text", "textarea", "email", "phone", "url", "picklist", "varchar", "enum",
    "reference_label",
];

impl FieldSpec {
    pub fn named(name: impl Into<String>) -> Self {
        FieldSpec {
            name: name.into(),
            editable: true,
            field_type: default_type(),
            unwrap: Unwrap::Auto,
            picklist_values: Vec::new(),
        }
    }

    pub fn is_string_typed(&self) -> bool {
        let lower = self.field_type.to_lowercase();
        STRING_TYPES.contains(&lower.as_str())
    }

    /// Editable, string-typed fields are the only ones read back from the CRM
    pub fn is_importable(&self) -> bool {
        self.editable && self.is_string_typed()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMapping {
    Name(String),
    List(Vec<String>),
    Spec(FieldSpec),
}

impl FieldMapping {
    /// External field for a scalar mapping. Empty names count as unset.
    pub fn single(&self) -> Option<FieldSpec> {
        match self {
            FieldMapping::Name(name) if !name.trim().is_empty() => Some(FieldSpec::named(name)),
            FieldMapping::Spec(spec) if !spec.name.trim().is_empty() => Some(spec.clone()),
            _ => None,
        }
    }

    /// External fields for a list mapping, in configured order. Empty names are
    /// dropped, a scalar mapping behaves as a one-element list.
    pub fn list(&self) -> Vec<String> {
        match self {
            FieldMapping::List(names) => names
                .iter()
                .filter(|n| !n.trim().is_empty())
                .cloned()
                .collect(),
            other => other.single().map(|s| vec![s.name]).unwrap_or_default(),
        }
    }
}

// ============================================================================
// FIELD MAP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default)]
    pub id: String,
    pub tenant_id: String,
    pub provider: Provider,
    pub object_kind: ObjectKind,
    /// canonical field name → external layout
    pub fields: BTreeMap<String, FieldMapping>,
}

impl FieldMap {
    pub fn new(tenant_id: impl Into<String>, provider: Provider, object_kind: ObjectKind) -> Self {
        FieldMap {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            provider,
            object_kind,
            fields: BTreeMap::new(),
        }
    }

    /// Builder: map a canonical field to one external field
    pub fn with_field(mut self, canonical: &str, external: &str) -> Self {
        self.fields
            .insert(canonical.to_string(), FieldMapping::Name(external.to_string()));
        self
    }

    /// Builder: map a canonical field with full options
    pub fn with_spec(mut self, canonical: &str, spec: FieldSpec) -> Self {
        self.fields
            .insert(canonical.to_string(), FieldMapping::Spec(spec));
        self
    }

    /// Builder: map a contact collection to an ordered list of external fields
    pub fn with_list(mut self, canonical: &str, externals: &[&str]) -> Self {
        self.fields.insert(
            canonical.to_string(),
            FieldMapping::List(externals.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    /// Configured external field for a canonical scalar
    pub fn field(&self, canonical: &str) -> Option<FieldSpec> {
        self.fields.get(canonical).and_then(FieldMapping::single)
    }

    /// Configured external fields for a canonical list
    pub fn list(&self, canonical: &str) -> Vec<String> {
        self.fields
            .get(canonical)
            .map(FieldMapping::list)
            .unwrap_or_default()
    }

    pub fn external_name(&self, canonical: &str) -> Option<String> {
        self.field(canonical).map(|spec| spec.name)
    }

    /// Every external field name the map writes to
    pub fn external_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for mapping in self.fields.values() {
            for name in mapping.list() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// External names targeted by more than one canonical field
    pub fn collisions(&self) -> Vec<String> {
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for mapping in self.fields.values() {
            for name in mapping.list() {
                *seen.entry(name).or_default() += 1;
            }
        }
        seen.into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name)
            .collect()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Clone)]
pub struct FieldMapResolver {
    repo: Arc<dyn Repository>,
}

impl FieldMapResolver {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        FieldMapResolver { repo }
    }

    /// Load the tenant's map for one provider object kind
    pub async fn resolve(
        &self,
        tenant_id: &str,
        provider: Provider,
        object_kind: ObjectKind,
    ) -> Result<FieldMap> {
        let query = Query::tenant(tenant_id)
            .eq("provider", provider.as_str())
            .eq("object_kind", object_kind.as_str());

        let mut docs = self.repo.fetch_all(Table::FieldMaps, &query).await?;
        match docs.len() {
            0 => Err(SyncError::missing(format!(
                "{} {} for tenant {}",
                provider,
                object_kind.map_name(),
                tenant_id
            ))),
            1 => {
                debug!(tenant_id, %provider, %object_kind, "field map resolved");
                from_document(docs.remove(0))
            }
            count => Err(SyncError::AmbiguousConfiguration {
                what: format!("{} {}", provider, object_kind.map_name()),
                count,
            }),
        }
    }

    /// Load the map serving an integration type, CSV / spreadsheet variants
    /// included
    pub async fn resolve_for(
        &self,
        tenant_id: &str,
        integration_type: IntegrationType,
    ) -> Result<FieldMap> {
        let base = integration_type.base();
        self.resolve(tenant_id, base.provider(), base.object_kind())
            .await
    }

    /// Insert or replace the tenant's map for its (provider, kind), in one
    /// transaction
    pub async fn save(&self, map: &FieldMap) -> Result<FieldMap> {
        let query = Query::tenant(&map.tenant_id)
            .eq("provider", map.provider.as_str())
            .eq("object_kind", map.object_kind.as_str());
        let doc = with_id(to_document(map)?)?;

        self.repo
            .transact(vec![
                WriteOp::Destroy {
                    table: Table::FieldMaps,
                    query,
                },
                WriteOp::Create {
                    table: Table::FieldMaps,
                    object: doc.clone(),
                },
            ])
            .await?;
        from_document(doc)
    }
}

// ============================================================================
// TESTS
// ============================================================================
