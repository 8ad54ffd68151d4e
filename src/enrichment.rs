// 🔎 Enrichment Router - provider results onto configured CRM fields
//
// "Which field does this phone number go to?" is answered by the tenant's
// EnrichmentConfig for the lead's BASE integration type:
//   {personal_field, work_field, other_field}  → typed slots
//   {fields: [...]}                            → ordered slots
//   {field}                                    → one slot
//
// Policies:
//   ADD    → never touch a slot that already holds a value
//   UPDATE → overwrite slots by position, unconditionally
//
// Nothing is pushed to the CRM from here. The router returns an assignment
// map; the caller decides whether and when to persist it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::{from_document, to_document, Query, Repository, Table, WriteOp};
use crate::entities::{CanonicalLead, ContactEntry, ContactKind, IntegrationType};
use crate::error::{Result, SyncError};

// ============================================================================
// SERVICES & POLICY
// ============================================================================

/// Third-party contact-discovery services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentService {
    Lusha,
    Kaspr,
    Hunter,
    Dropcontact,
    Snov,
}

impl EnrichmentService {
    pub const ALL: [EnrichmentService; 5] = [
        EnrichmentService::Lusha,
        EnrichmentService::Kaspr,
        EnrichmentService::Hunter,
        EnrichmentService::Dropcontact,
        EnrichmentService::Snov,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentService::Lusha => "lusha",
            EnrichmentService::Kaspr => "kaspr",
            EnrichmentService::Hunter => "hunter",
            EnrichmentService::Dropcontact => "dropcontact",
            EnrichmentService::Snov => "snov",
        }
    }
}

impl fmt::Display for EnrichmentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnrichmentAction {
    /// Fill empty slots only
    #[default]
    Add,
    /// Overwrite slots by position
    Update,
}

/// Kind of contact point a provider reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactTag {
    Personal,
    Work,
    Other,
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Where returned items may land, in configured order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSlots {
    List {
        fields: Vec<String>,
    },
    Single {
        field: String,
    },
    Typed {
        personal_field: Option<String>,
        work_field: Option<String>,
        other_field: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub field: String,
    /// None accepts items of any tag
    pub tag: Option<ContactTag>,
}

impl Slot {
    fn accepts(&self, item: &EnrichedItem) -> bool {
        match (self.tag, item.tag) {
            (Some(slot), Some(item)) => slot == item,
            _ => true,
        }
    }
}

impl FieldSlots {
    /// Configured slots, unset and empty names dropped
    pub fn slots(&self) -> Vec<Slot> {
        let named = |field: &str, tag: Option<ContactTag>| {
            (!field.trim().is_empty()).then(|| Slot {
                field: field.to_string(),
                tag,
            })
        };
        match self {
            FieldSlots::List { fields } => fields.iter().filter_map(|f| named(f, None)).collect(),
            FieldSlots::Single { field } => named(field, None).into_iter().collect(),
            FieldSlots::Typed {
                personal_field,
                work_field,
                other_field,
            } => [
                (personal_field, ContactTag::Personal),
                (work_field, ContactTag::Work),
                (other_field, ContactTag::Other),
            ]
            .into_iter()
            .filter_map(|(field, tag)| field.as_deref().and_then(|f| named(f, Some(tag))))
            .collect(),
        }
    }
}

/// Per tenant, per service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub id: String,
    pub tenant_id: String,
    pub service: EnrichmentService,

    #[serde(default)]
    pub action: EnrichmentAction,

    #[serde(default)]
    pub api_calls: i64,
    #[serde(default)]
    pub api_limit: i64,
    #[serde(default)]
    pub is_activated: bool,

    /// Phone slots, keyed by base integration type
    #[serde(default)]
    pub phone_fields: BTreeMap<IntegrationType, FieldSlots>,
    /// Email slots, keyed by base integration type
    #[serde(default)]
    pub email_fields: BTreeMap<IntegrationType, FieldSlots>,
}

impl EnrichmentConfig {
    pub fn new(tenant_id: impl Into<String>, service: EnrichmentService) -> Self {
        EnrichmentConfig {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            service,
            action: EnrichmentAction::Add,
            api_calls: 0,
            api_limit: 0,
            is_activated: true,
            phone_fields: BTreeMap::new(),
            email_fields: BTreeMap::new(),
        }
    }

    /// Slots for a lead of `integration_type`, CSV / spreadsheet variants
    /// resolved to their base type
    pub fn slots(&self, kind: ContactKind, integration_type: IntegrationType) -> Vec<Slot> {
        let table = match kind {
            ContactKind::Phone => &self.phone_fields,
            ContactKind::Email => &self.email_fields,
        };
        table
            .get(&integration_type.base())
            .map(FieldSlots::slots)
            .unwrap_or_default()
    }

    pub fn has_quota(&self) -> bool {
        self.api_calls < self.api_limit
    }
}

/// Per-user switch for each service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEnrichmentAccess {
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub enabled_services: Vec<EnrichmentService>,
}

impl UserEnrichmentAccess {
    pub fn service_enabled(&self, service: EnrichmentService) -> bool {
        self.enabled_services.contains(&service)
    }
}

// ============================================================================
// PROVIDER RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub value: String,
    #[serde(default)]
    pub tag: Option<ContactTag>,
}

impl EnrichedItem {
    pub fn new(value: impl Into<String>) -> Self {
        EnrichedItem {
            value: value.into(),
            tag: None,
        }
    }

    pub fn tagged(value: impl Into<String>, tag: ContactTag) -> Self {
        EnrichedItem {
            value: value.into(),
            tag: Some(tag),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    #[serde(default)]
    pub phones: Vec<EnrichedItem>,
    #[serde(default)]
    pub emails: Vec<EnrichedItem>,
}

impl ProviderResult {
    pub fn items(&self, kind: ContactKind) -> &[EnrichedItem] {
        match kind {
            ContactKind::Phone => &self.phones,
            ContactKind::Email => &self.emails,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self
            .phones
            .iter()
            .chain(self.emails.iter())
            .any(|item| !item.value.trim().is_empty())
    }
}

/// What a provider is given to search with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupHints {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub account_name: Option<String>,
    pub account_url: Option<String>,
    pub linkedin_url: Option<String>,
}

impl LookupHints {
    pub fn for_lead(lead: &CanonicalLead) -> Self {
        LookupHints {
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            account_name: lead.account.as_ref().and_then(|a| a.name.clone()),
            account_url: lead.account.as_ref().and_then(|a| a.url.clone()),
            linkedin_url: lead.linkedin_url.clone(),
        }
    }
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn service(&self) -> EnrichmentService;

    async fn lookup(&self, hints: &LookupHints) -> Result<ProviderResult>;
}

// ============================================================================
// ASSIGNMENTS
// ============================================================================

/// External field → enriched value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAssignments {
    pub phone_numbers: BTreeMap<String, String>,
    pub emails: BTreeMap<String, String>,
}

impl FieldAssignments {
    pub fn get(&self, kind: ContactKind) -> &BTreeMap<String, String> {
        match kind {
            ContactKind::Phone => &self.phone_numbers,
            ContactKind::Email => &self.emails,
        }
    }

    fn get_mut(&mut self, kind: ContactKind) -> &mut BTreeMap<String, String> {
        match kind {
            ContactKind::Phone => &mut self.phone_numbers,
            ContactKind::Email => &mut self.emails,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phone_numbers.is_empty() && self.emails.is_empty()
    }

    /// Entries ready for `contacts::upsert_many`, never marked primary
    pub fn entries(&self, kind: ContactKind) -> Vec<ContactEntry> {
        self.get(kind)
            .iter()
            .map(|(field, value)| ContactEntry {
                id: String::new(),
                value: value.clone(),
                type_: field.clone(),
                is_primary: false,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    Enriched(FieldAssignments),
    /// Provider found nothing, or nothing survived the policy
    NoData,
}

/// Place items onto slots under a policy. `current` gives the value a slot
/// holds today.
///
/// Items pair with slots by position, in provider-return order: each item
/// claims the next unclaimed slot that accepts its tag. Under ADD an item
/// whose slot already holds a value is dropped, the slot keeps its value.
pub fn assign<'a>(
    action: EnrichmentAction,
    slots: &[Slot],
    items: &[EnrichedItem],
    current: impl Fn(&str) -> Option<&'a str>,
) -> BTreeMap<String, String> {
    let mut taken = vec![false; slots.len()];
    let mut assigned = BTreeMap::new();

    for item in items.iter().filter(|item| !item.value.trim().is_empty()) {
        let Some(i) = (0..slots.len()).find(|&i| !taken[i] && slots[i].accepts(item)) else {
            continue;
        };
        taken[i] = true;

        let slot = &slots[i];
        let filled = current(&slot.field).map_or(false, |value| !value.trim().is_empty());
        if action == EnrichmentAction::Add && filled {
            continue;
        }
        assigned.insert(slot.field.clone(), item.value.clone());
    }
    assigned
}

// ============================================================================
// ROUTER
// ============================================================================

#[derive(Clone)]
pub struct EnrichmentRouter {
    repo: Arc<dyn Repository>,
}

impl EnrichmentRouter {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        EnrichmentRouter { repo }
    }

    fn config_query(tenant_id: &str, service: EnrichmentService) -> Query {
        Query::tenant(tenant_id).eq("service", service.as_str())
    }

    pub async fn load_config(
        &self,
        tenant_id: &str,
        service: EnrichmentService,
    ) -> Result<EnrichmentConfig> {
        let doc = self
            .repo
            .fetch_one(Table::EnrichmentConfigs, &Self::config_query(tenant_id, service))
            .await?
            .ok_or_else(|| {
                SyncError::missing(format!("{} enrichment for tenant {}", service, tenant_id))
            })?;
        from_document(doc)
    }

    /// Insert or replace the tenant's config for its service, in one
    /// transaction
    pub async fn save_config(&self, config: &EnrichmentConfig) -> Result<()> {
        self.repo
            .transact(vec![
                WriteOp::Destroy {
                    table: Table::EnrichmentConfigs,
                    query: Self::config_query(&config.tenant_id, config.service),
                },
                WriteOp::Create {
                    table: Table::EnrichmentConfigs,
                    object: to_document(config)?,
                },
            ])
            .await
    }

    async fn service_enabled(
        &self,
        tenant_id: &str,
        user_id: &str,
        service: EnrichmentService,
    ) -> Result<bool> {
        let query = Query::id(user_id).eq("tenant_id", tenant_id);
        match self.repo.fetch_one(Table::Users, &query).await? {
            Some(doc) => Ok(from_document::<UserEnrichmentAccess>(doc)?.service_enabled(service)),
            None => Ok(false),
        }
    }

    /// Assignment map for a provider result, without touching the quota
    pub fn route(
        config: &EnrichmentConfig,
        lead: &CanonicalLead,
        result: &ProviderResult,
    ) -> EnrichmentOutcome {
        let mut assignments = FieldAssignments::default();

        for kind in [ContactKind::Phone, ContactKind::Email] {
            let slots = config.slots(kind, lead.integration_type);
            let current = |field: &str| {
                lead.contacts(kind)
                    .iter()
                    .find(|e| e.type_ == field)
                    .map(|e| e.value.as_str())
            };
            *assignments.get_mut(kind) = assign(config.action, &slots, result.items(kind), current);
        }

        if assignments.is_empty() {
            EnrichmentOutcome::NoData
        } else {
            EnrichmentOutcome::Enriched(assignments)
        }
    }

    /// Full enrichment of one lead: checks, provider call, quota, routing.
    ///
    /// The quota is checked before calling the provider and consumed only
    /// when the provider returned data. Consumption is an atomic
    /// increment-and-check, so concurrent requests never push `api_calls`
    /// past `api_limit`.
    pub async fn enrich(
        &self,
        provider: &dyn EnrichmentProvider,
        user_id: &str,
        lead: &CanonicalLead,
    ) -> Result<EnrichmentOutcome> {
        let service = provider.service();
        let tenant_id = lead.tenant_id.as_str();

        let config = self.load_config(tenant_id, service).await?;
        if !config.is_activated || !self.service_enabled(tenant_id, user_id, service).await? {
            return Err(SyncError::missing(format!(
                "{} enrichment not enabled for user {}",
                service, user_id
            )));
        }
        if !config.has_quota() {
            return Err(SyncError::RateLimitExceeded {
                provider: service.to_string(),
                api_calls: config.api_calls,
                api_limit: config.api_limit,
            });
        }

        let base = lead.integration_type.base();
        let configured = [ContactKind::Phone, ContactKind::Email]
            .iter()
            .any(|kind| !config.slots(*kind, base).is_empty());
        if !configured {
            return Err(SyncError::missing(format!(
                "{} enrichment fields for {}",
                service, base
            )));
        }

        let result = provider.lookup(&LookupHints::for_lead(lead)).await?;
        if result.is_empty() {
            debug!(lead_id = %lead.lead_id, %service, "provider returned no data");
            return Ok(EnrichmentOutcome::NoData);
        }

        let consumed = self
            .repo
            .increment_below(
                Table::EnrichmentConfigs,
                &Query::id(&config.id),
                "api_calls",
                "api_limit",
            )
            .await?;
        if !consumed {
            warn!(tenant_id, %service, "quota consumed by a concurrent request");
            return Err(SyncError::RateLimitExceeded {
                provider: service.to_string(),
                api_calls: config.api_limit,
                api_limit: config.api_limit,
            });
        }

        let outcome = Self::route(&config, lead, &result);
        if let EnrichmentOutcome::Enriched(assignments) = &outcome {
            info!(
                lead_id = %lead.lead_id,
                %service,
                phones = assignments.phone_numbers.len(),
                emails = assignments.emails.len(),
                "lead enriched"
            );
        }
        Ok(outcome)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRepository;
    use crate::test_support::StaticProvider;
    use serde_json::json;

    fn slots(fields: &[&str]) -> Vec<Slot> {
        fields
            .iter()
            .map(|f| Slot {
                field: f.to_string(),
                tag: None,
            })
            .collect()
    }

    fn lead_with_mobile() -> CanonicalLead {
        let mut lead = CanonicalLead::new("t1", IntegrationType::SalesforceCsvLead);
        lead.first_name = Some("Ada".to_string());
        lead.phones.push(ContactEntry::primary("mobile_phone", "+33 6 11 11 11 11"));
        lead
    }

    fn config(action: EnrichmentAction, calls: i64, limit: i64) -> EnrichmentConfig {
        let mut config = EnrichmentConfig::new("t1", EnrichmentService::Lusha);
        config.action = action;
        config.api_calls = calls;
        config.api_limit = limit;
        config.phone_fields.insert(
            IntegrationType::SalesforceLead,
            FieldSlots::List {
                fields: vec!["mobile_phone".to_string(), "other_phone".to_string()],
            },
        );
        config
    }

    async fn router_with(config: &EnrichmentConfig, enabled: bool) -> EnrichmentRouter {
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let services = if enabled { vec!["lusha"] } else { vec![] };
        repo.create(
            Table::Users,
            json!({"id": "u1", "tenant_id": "t1", "enabled_services": services}),
        )
        .await
        .unwrap();
        let router = EnrichmentRouter::new(repo);
        router.save_config(config).await.unwrap();
        router
    }

    fn two_phones() -> StaticProvider {
        StaticProvider::new(
            EnrichmentService::Lusha,
            ProviderResult {
                phones: vec![EnrichedItem::new("+1 555 0001"), EnrichedItem::new("+1 555 0002")],
                emails: vec![],
            },
        )
    }

    #[test]
    fn test_slot_shapes_deserialize() {
        let typed: FieldSlots =
            serde_json::from_value(json!({"personal_field": "MobilePhone", "work_field": "Phone"}))
                .unwrap();
        let slots = typed.slots();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].tag, Some(ContactTag::Work));

        let list: FieldSlots =
            serde_json::from_value(json!({"fields": ["Email", "", "Other__c"]})).unwrap();
        assert_eq!(list.slots().len(), 2);

        let single: FieldSlots = serde_json::from_value(json!({"field": "Email"})).unwrap();
        assert_eq!(single.slots()[0].field, "Email");
    }

    #[test]
    fn test_add_skips_filled_slot() {
        let lead = lead_with_mobile();
        let outcome = EnrichmentRouter::route(
            &config(EnrichmentAction::Add, 0, 10),
            &lead,
            &two_phones().result,
        );
        let EnrichmentOutcome::Enriched(assignments) = outcome else {
            panic!("expected assignments");
        };
        assert_eq!(assignments.phone_numbers.len(), 1);
        assert_eq!(assignments.phone_numbers["other_phone"], "+1 555 0002");
        assert!(!assignments.phone_numbers.contains_key("mobile_phone"));
    }

    #[test]
    fn test_update_overwrites_by_position() {
        let lead = lead_with_mobile();
        let outcome = EnrichmentRouter::route(
            &config(EnrichmentAction::Update, 0, 10),
            &lead,
            &two_phones().result,
        );
        let EnrichmentOutcome::Enriched(assignments) = outcome else {
            panic!("expected assignments");
        };
        assert_eq!(assignments.phone_numbers["mobile_phone"], "+1 555 0001");
        assert_eq!(assignments.phone_numbers["other_phone"], "+1 555 0002");
    }

    #[test]
    fn test_add_with_every_slot_filled_is_no_data() {
        let mut lead = lead_with_mobile();
        lead.phones.push(ContactEntry::new("other_phone", "+1 555 9999"));
        let outcome = EnrichmentRouter::route(
            &config(EnrichmentAction::Add, 0, 10),
            &lead,
            &two_phones().result,
        );
        assert_eq!(outcome, EnrichmentOutcome::NoData);
    }

    #[test]
    fn test_typed_slots_follow_tags() {
        let slots = FieldSlots::Typed {
            personal_field: Some("MobilePhone".to_string()),
            work_field: Some("Phone".to_string()),
            other_field: None,
        }
        .slots();
        let items = vec![
            EnrichedItem::tagged("+1 555 0100", ContactTag::Work),
            EnrichedItem::tagged("+1 555 0200", ContactTag::Other),
            EnrichedItem::tagged("+1 555 0300", ContactTag::Personal),
        ];

        let assigned = assign(EnrichmentAction::Add, &slots, &items, |_| None);
        assert_eq!(assigned["Phone"], "+1 555 0100");
        assert_eq!(assigned["MobilePhone"], "+1 555 0300");
        assert_eq!(assigned.len(), 2);
    }

    #[test]
    fn test_assign_pairs_items_with_slots_by_position() {
        let assigned = assign(
            EnrichmentAction::Add,
            &slots(&["a", "b", "c"]),
            &[EnrichedItem::new("1"), EnrichedItem::new(""), EnrichedItem::new("2")],
            |field| (field == "a").then_some("taken"),
        );
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_add_single_item_for_filled_first_slot_is_dropped() {
        let assigned = assign(
            EnrichmentAction::Add,
            &slots(&["mobile_phone", "other_phone"]),
            &[EnrichedItem::new("+1 555 0001")],
            |field| (field == "mobile_phone").then_some("+33 6 11 11 11 11"),
        );
        assert!(assigned.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_boundary() {
        let config = config(EnrichmentAction::Add, 4, 5);
        let router = router_with(&config, true).await;
        let lead = lead_with_mobile();
        let provider = two_phones();

        let outcome = router.enrich(&provider, "u1", &lead).await.unwrap();
        assert!(matches!(outcome, EnrichmentOutcome::Enriched(_)));
        let stored = router.load_config("t1", EnrichmentService::Lusha).await.unwrap();
        assert_eq!(stored.api_calls, 5);

        let err = router.enrich(&provider, "u1", &lead).await.unwrap_err();
        assert!(matches!(err, SyncError::RateLimitExceeded { api_calls: 5, api_limit: 5, .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_enrich_consumes_last_call_once() {
        let config = config(EnrichmentAction::Add, 4, 5);
        let router = router_with(&config, true).await;
        let lead = lead_with_mobile();
        let provider = two_phones();

        let outcomes = futures::future::join_all(
            (0..8).map(|_| router.enrich(&provider, "u1", &lead)),
        )
        .await;

        // Every request passed the pre-check and reached the provider
        assert_eq!(provider.calls(), 8);
        let enriched = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(EnrichmentOutcome::Enriched(_))))
            .count();
        let limited = outcomes
            .iter()
            .filter(|o| matches!(o, Err(SyncError::RateLimitExceeded { .. })))
            .count();
        assert_eq!(enriched, 1);
        assert_eq!(limited, 7);

        let stored = router.load_config("t1", EnrichmentService::Lusha).await.unwrap();
        assert_eq!(stored.api_calls, 5);
    }

    #[tokio::test]
    async fn test_disabled_service_is_configuration_missing() {
        let config = config(EnrichmentAction::Add, 0, 5);
        let router = router_with(&config, false).await;
        let provider = two_phones();

        let err = router
            .enrich(&provider, "u1", &lead_with_mobile())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ConfigurationMissing(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_result_does_not_consume_quota() {
        let config = config(EnrichmentAction::Add, 0, 5);
        let router = router_with(&config, true).await;
        let provider = StaticProvider::new(EnrichmentService::Lusha, ProviderResult::default());

        let outcome = router.enrich(&provider, "u1", &lead_with_mobile()).await.unwrap();
        assert_eq!(outcome, EnrichmentOutcome::NoData);
        let stored = router.load_config("t1", EnrichmentService::Lusha).await.unwrap();
        assert_eq!(stored.api_calls, 0);
    }

    #[tokio::test]
    async fn test_failed_config_replace_keeps_previous_config() {
        let router = router_with(&config(EnrichmentAction::Add, 1, 5), true).await;
        let other = EnrichmentConfig::new("t1", EnrichmentService::Kaspr);
        router.save_config(&other).await.unwrap();

        let mut clash = config(EnrichmentAction::Update, 0, 50);
        clash.id = other.id.clone();
        assert!(router.save_config(&clash).await.is_err());

        let stored = router.load_config("t1", EnrichmentService::Lusha).await.unwrap();
        assert_eq!(stored.action, EnrichmentAction::Add);
        assert_eq!(stored.api_limit, 5);
    }

    #[test]
    fn test_assignments_to_entries() {
        let mut assignments = FieldAssignments::default();
        assignments
            .emails
            .insert("Email".to_string(), "ada@x.com".to_string());
        let entries = assignments.entries(ContactKind::Email);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].type_, "Email");
        assert!(!entries[0].is_primary);
    }
}
