// Lead Sync - Core Library
// Canonical lead/account translation and synchronization with external CRMs

pub mod entities;       // Canonical model: leads, accounts, contact entries, integration types
pub mod error;          // Error taxonomy
pub mod db;             // Repository contract + SQLite implementation
pub mod field_map;      // Field-Map Resolver
pub mod projection;     // Projection Engine (canonical ⇄ external)
pub mod contacts;       // Contact-List Invariant Guard
pub mod enrichment;     // Enrichment Router
pub mod rpc;            // Integration RPC contract
pub mod webhook;        // Webhook lookup + delivery
pub mod status;         // Status-Transition Orchestrator
pub mod sync;           // Push / pull control flow
pub mod bulk;           // Bounded worker pool for bulk operations
pub mod config;         // Engine configuration
pub mod logging;        // tracing setup

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use db::{
    LeadGuard, LeadLocks, Query, Repository, SqliteRepository, Table, WriteOp,
    load_lead, load_account, save_lead, save_account,
};
pub use entities::{
    CanonicalLead, CanonicalAccount, ContactEntry, ContactKind, LeadStatus,
    LeadDelta, AccountDelta, FieldValue,
    IntegrationType, ObjectKind, Provider, ImportSource,
};
pub use error::{Result, SyncError};
pub use field_map::{FieldMap, FieldMapping, FieldSpec, FieldMapResolver, Unwrap};
pub use projection::{to_external, from_external, export_csv, CanonicalFragment};
pub use contacts::ContactGuard;
pub use enrichment::{
    EnrichmentRouter, EnrichmentConfig, EnrichmentService, EnrichmentAction, EnrichmentProvider,
    EnrichmentOutcome, FieldAssignments, FieldSlots, ProviderResult, EnrichedItem, ContactTag,
    LookupHints, UserEnrichmentAccess,
};
pub use rpc::{IntegrationRpc, RpcOperation, call_with_timeout};
pub use webhook::{WebhookConfig, WebhookPayload, WebhookSender, WebhookType, HttpMethod, TimedSender, find_webhook};
#[cfg(feature = "http")]
pub use webhook::HttpWebhookSender;
pub use status::{
    StatusOrchestrator, StatusSettings, ScoringHook, StatusPointsHook, Transition, TransitionOutcome,
};
pub use sync::SyncEngine;
pub use bulk::{BulkReport, BulkFailure, run_bounded, delete_many, push_many, reassign_many, export_many};
pub use config::EngineConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
