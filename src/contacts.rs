// 📇 Contact-List Invariant Guard - emails and phone numbers of a lead
//
// Invariants, held after every operation:
// 1. At most one entry per collection has is_primary = true
// 2. A primary entry always has a non-empty value
// 3. A collection that had a primary never loses it through delete
//
// The list functions are pure. `ContactGuard` wraps them in a per-lead lock
// so two concurrent requests can never both observe "no primary" and both
// promote one.

use std::sync::Arc;
use tracing::info;

use crate::db::{load_lead, save_lead, LeadLocks, Repository};
use crate::entities::{CanonicalLead, ContactEntry, ContactKind};
use crate::error::{Result, SyncError};

// ============================================================================
// VALIDATION
// ============================================================================

/// Check both list invariants
pub fn validate(kind: ContactKind, entries: &[ContactEntry]) -> Result<()> {
    let primaries: Vec<&ContactEntry> = entries.iter().filter(|e| e.is_primary).collect();

    if primaries.len() > 1 {
        return Err(SyncError::validation(
            kind.lead_field(),
            format!("{} entries marked primary, at most one allowed", primaries.len()),
        ));
    }
    if let Some(primary) = primaries.first() {
        if !primary.has_value() {
            return Err(SyncError::validation(
                kind.lead_field(),
                "primary entry must have a value",
            ));
        }
    }
    Ok(())
}

fn position(kind: ContactKind, entries: &[ContactEntry], entry_id: &str) -> Result<usize> {
    entries
        .iter()
        .position(|e| e.id == entry_id)
        .ok_or_else(|| {
            SyncError::validation(kind.lead_field(), format!("entry {} not found", entry_id))
        })
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Make `entry_id` the only primary entry
pub fn set_primary(kind: ContactKind, entries: &mut [ContactEntry], entry_id: &str) -> Result<()> {
    let target = position(kind, entries, entry_id)?;
    if !entries[target].has_value() {
        return Err(SyncError::validation(
            kind.lead_field(),
            "cannot make an empty entry primary",
        ));
    }

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.is_primary = i == target;
    }
    Ok(())
}

/// Merge a batch by natural key: persisted id when it is already stored,
/// else `type`.
///
/// The batch is rejected as a whole when it marks more than one entry
/// primary or when the merged list would break an invariant. A replacement
/// for the current primary inherits the flag unless the batch names another
/// primary.
pub fn upsert_many(
    kind: ContactKind,
    entries: &mut Vec<ContactEntry>,
    batch: &[ContactEntry],
) -> Result<()> {
    validate(kind, batch)?;

    let mut merged = entries.clone();
    let batch_has_primary = batch.iter().any(|e| e.is_primary);
    let mut winner = None;

    for incoming in batch {
        let existing = merged
            .iter()
            .position(|e| !incoming.id.is_empty() && e.id == incoming.id)
            .or_else(|| merged.iter().position(|e| e.type_ == incoming.type_));

        let slot = match existing {
            Some(i) => {
                let inherits = merged[i].is_primary && !batch_has_primary;
                merged[i] = ContactEntry {
                    id: merged[i].id.clone(),
                    value: incoming.value.clone(),
                    type_: incoming.type_.clone(),
                    is_primary: incoming.is_primary || inherits,
                };
                i
            }
            None => {
                let mut entry = incoming.clone();
                if entry.id.is_empty() {
                    entry.id = uuid::Uuid::new_v4().to_string();
                }
                merged.push(entry);
                merged.len() - 1
            }
        };
        if incoming.is_primary {
            winner = Some(slot);
        }
    }

    if let Some(winner) = winner {
        for (i, entry) in merged.iter_mut().enumerate() {
            entry.is_primary = i == winner;
        }
    }

    validate(kind, &merged)?;
    *entries = merged;
    Ok(())
}

/// Remove an entry. The primary entry can only be removed after another one
/// has been promoted.
pub fn delete(kind: ContactKind, entries: &mut Vec<ContactEntry>, entry_id: &str) -> Result<ContactEntry> {
    let target = position(kind, entries, entry_id)?;
    if entries[target].is_primary {
        return Err(SyncError::validation(
            kind.lead_field(),
            "cannot delete the primary entry",
        ));
    }
    Ok(entries.remove(target))
}

/// Change the value of one entry. A primary entry cannot be emptied.
pub fn update_value(
    kind: ContactKind,
    entries: &mut [ContactEntry],
    entry_id: &str,
    value: &str,
) -> Result<()> {
    let target = position(kind, entries, entry_id)?;
    if entries[target].is_primary && value.trim().is_empty() {
        return Err(SyncError::validation(
            kind.lead_field(),
            "primary entry must have a value",
        ));
    }
    entries[target].value = value.to_string();
    Ok(())
}

// ============================================================================
// SERIALIZED GUARD
// ============================================================================

/// Runs list operations on stored leads, one writer per lead at a time
#[derive(Clone)]
pub struct ContactGuard {
    repo: Arc<dyn Repository>,
    locks: LeadLocks,
}

impl ContactGuard {
    pub fn new(repo: Arc<dyn Repository>, locks: LeadLocks) -> Self {
        ContactGuard { repo, locks }
    }

    /// Load, mutate and save a lead while holding its lock. Nothing is saved
    /// when `op` fails.
    async fn with_lead<F>(&self, tenant_id: &str, lead_id: &str, op: F) -> Result<CanonicalLead>
    where
        F: FnOnce(&mut CanonicalLead) -> Result<()>,
    {
        let _guard = self.locks.acquire(lead_id).await;

        let mut lead = load_lead(self.repo.as_ref(), tenant_id, lead_id).await?;
        op(&mut lead)?;
        lead.touch();
        save_lead(self.repo.as_ref(), &lead).await?;
        Ok(lead)
    }

    pub async fn set_primary(
        &self,
        tenant_id: &str,
        lead_id: &str,
        kind: ContactKind,
        entry_id: &str,
    ) -> Result<CanonicalLead> {
        let lead = self
            .with_lead(tenant_id, lead_id, |lead| {
                set_primary(kind, lead.contacts_mut(kind), entry_id)
            })
            .await?;
        info!(lead_id, kind = kind.lead_field(), entry_id, "primary entry changed");
        Ok(lead)
    }

    pub async fn upsert_many(
        &self,
        tenant_id: &str,
        lead_id: &str,
        kind: ContactKind,
        batch: &[ContactEntry],
    ) -> Result<CanonicalLead> {
        self.with_lead(tenant_id, lead_id, |lead| {
            upsert_many(kind, lead.contacts_mut(kind), batch)
        })
        .await
    }

    pub async fn delete(
        &self,
        tenant_id: &str,
        lead_id: &str,
        kind: ContactKind,
        entry_id: &str,
    ) -> Result<CanonicalLead> {
        self.with_lead(tenant_id, lead_id, |lead| {
            delete(kind, lead.contacts_mut(kind), entry_id).map(|_| ())
        })
        .await
    }

    pub async fn update_value(
        &self,
        tenant_id: &str,
        lead_id: &str,
        kind: ContactKind,
        entry_id: &str,
        value: &str,
    ) -> Result<CanonicalLead> {
        self.with_lead(tenant_id, lead_id, |lead| {
            update_value(kind, lead.contacts_mut(kind), entry_id, value)
        })
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
