// Entity Models - the canonical side of every synchronization
//
// Each entity has:
// - Stable identity (UUID) that NEVER changes
// - An optional link to one external record (integration_type + integration_id)
// - An opaque `variables` map that rides along on every outbound payload

pub mod account;
pub mod contact;
pub mod delta;
pub mod integration;
pub mod lead;

pub use account::{CanonicalAccount, ACCOUNT_FIELDS};
pub use contact::{ContactEntry, ContactKind};
pub use delta::{AccountDelta, FieldValue, LeadDelta};
pub use integration::{ImportSource, IntegrationType, ObjectKind, Provider};
pub use lead::{CanonicalLead, LeadStatus, LEAD_FIELDS};
