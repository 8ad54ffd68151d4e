// 📇 Contact Entries - emails and phone numbers of a lead
//
// An entry's `type` is the external field it travels to (e.g. "Email",
// "MobilePhone"). At most one entry per collection is primary, and a primary
// entry always carries a value. Enforcement lives in `crate::contacts`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Email,
    Phone,
}

impl ContactKind {
    /// Key used for the collection in field maps and assignment maps
    pub fn map_key(&self) -> &'static str {
        match self {
            ContactKind::Email => "emails",
            ContactKind::Phone => "phone_numbers",
        }
    }

    /// Field name on the canonical lead
    pub fn lead_field(&self) -> &'static str {
        match self {
            ContactKind::Email => "emails",
            ContactKind::Phone => "phones",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    /// Persisted id (empty until first saved)
    #[serde(default)]
    pub id: String,

    pub value: String,

    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub is_primary: bool,
}

impl ContactEntry {
    /// New non-primary entry with a fresh id
    pub fn new(type_: impl Into<String>, value: impl Into<String>) -> Self {
        ContactEntry {
            id: uuid::Uuid::new_v4().to_string(),
            value: value.into(),
            type_: type_.into(),
            is_primary: false,
        }
    }

    pub fn primary(type_: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entry = ContactEntry::new(type_, value);
        entry.is_primary = true;
        entry
    }

    pub fn has_value(&self) -> bool {
        !self.value.trim().is_empty()
    }
}
