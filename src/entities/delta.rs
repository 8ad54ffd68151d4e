// ✏️ Deltas - partial updates that distinguish "leave alone" from "clear"
//
// JSON encoding: absent key → Omit, `null` → Clear, value → Set

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::contact::{ContactEntry, ContactKind};

// ============================================================================
// FIELD VALUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue<T> {
    /// Not part of the change, never written
    #[default]
    Omit,
    /// Explicit deletion, written as null
    Clear,
    Set(T),
}

impl<T> FieldValue<T> {
    pub fn is_omit(&self) -> bool {
        matches!(self, FieldValue::Omit)
    }

    pub fn as_ref(&self) -> FieldValue<&T> {
        match self {
            FieldValue::Omit => FieldValue::Omit,
            FieldValue::Clear => FieldValue::Clear,
            FieldValue::Set(v) => FieldValue::Set(v),
        }
    }

    /// Option view for applying to a canonical record: Omit yields None
    pub fn into_update(self) -> Option<Option<T>> {
        match self {
            FieldValue::Omit => None,
            FieldValue::Clear => Some(None),
            FieldValue::Set(v) => Some(Some(v)),
        }
    }
}

impl<T> From<Option<T>> for FieldValue<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => FieldValue::Set(v),
            None => FieldValue::Omit,
        }
    }
}

impl<T: Serialize> Serialize for FieldValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Set(v) => v.serialize(serializer),
            FieldValue::Omit | FieldValue::Clear => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldValue<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => FieldValue::Set(v),
            None => FieldValue::Clear,
        })
    }
}

// ============================================================================
// LEAD DELTA
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadDelta {
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub first_name: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub last_name: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub job_position: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub linkedin_url: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub integration_status: FieldValue<String>,

    /// Batch of email entries, upserted by natural key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<ContactEntry>>,
    /// Batch of phone entries, upserted by natural key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phones: Option<Vec<ContactEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Map<String, serde_json::Value>>,
}

impl LeadDelta {
    pub fn scalar(&self, field: &str) -> FieldValue<&String> {
        match field {
            "first_name" => self.first_name.as_ref(),
            "last_name" => self.last_name.as_ref(),
            "job_position" => self.job_position.as_ref(),
            "linkedin_url" => self.linkedin_url.as_ref(),
            "integration_status" => self.integration_status.as_ref(),
            _ => FieldValue::Omit,
        }
    }

    pub fn contacts(&self, kind: ContactKind) -> Option<&Vec<ContactEntry>> {
        match kind {
            ContactKind::Email => self.emails.as_ref(),
            ContactKind::Phone => self.phones.as_ref(),
        }
    }

    pub fn touches_contacts(&self) -> bool {
        self.emails.is_some() || self.phones.is_some()
    }
}

// ============================================================================
// ACCOUNT DELTA
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountDelta {
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub name: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub url: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub size: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub country: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub zipcode: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub phone_number: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub linkedin_url: FieldValue<String>,
    #[serde(default, skip_serializing_if = "FieldValue::is_omit")]
    pub integration_status: FieldValue<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AccountDelta {
    pub fn scalar(&self, field: &str) -> FieldValue<&String> {
        match field {
            "name" => self.name.as_ref(),
            "url" => self.url.as_ref(),
            "size" => self.size.as_ref(),
            "country" => self.country.as_ref(),
            "zipcode" => self.zipcode.as_ref(),
            "phone_number" => self.phone_number.as_ref(),
            "linkedin_url" => self.linkedin_url.as_ref(),
            "integration_status" => self.integration_status.as_ref(),
            _ => FieldValue::Omit,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
