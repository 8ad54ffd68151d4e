// 🔄 Projection Engine - canonical ⇄ external translation
//
// One code path for every CRM: the tenant's FieldMap is the only thing that
// knows the external layout. Provider quirks are expressed as data:
// - dotted names ("address.country") address nested objects
// - tagged unions ({value, label}) and contact lists are unwrapped on read
//
// Guarantees of `to_external`:
// - a canonical field without a configured external name is never written
// - an omitted value is never written, an explicit Clear is written as null
// - identical inputs give identical payloads (keys are ordered)

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::OnceLock;

use crate::entities::{
    AccountDelta, CanonicalAccount, CanonicalLead, ContactEntry, ContactKind, FieldValue,
    LeadDelta, ACCOUNT_FIELDS, LEAD_FIELDS,
};
use crate::error::Result;
use crate::field_map::{FieldMap, FieldMapping, FieldSpec, Unwrap};

const CONTACT_KINDS: [ContactKind; 2] = [ContactKind::Email, ContactKind::Phone];

// ============================================================================
// CANONICAL SOURCES
// ============================================================================

/// Anything that can be projected: full records and deltas
pub trait CanonicalSource {
    fn scalar_fields(&self) -> &'static [&'static str];

    fn scalar_value(&self, field: &str) -> FieldValue<String>;

    fn contact_list(&self, _kind: ContactKind) -> Option<&[ContactEntry]> {
        None
    }

    fn variables(&self) -> Option<&Map<String, Value>>;
}

impl CanonicalSource for CanonicalLead {
    fn scalar_fields(&self) -> &'static [&'static str] {
        &LEAD_FIELDS
    }

    fn scalar_value(&self, field: &str) -> FieldValue<String> {
        self.scalar(field).map(str::to_string).into()
    }

    fn contact_list(&self, kind: ContactKind) -> Option<&[ContactEntry]> {
        Some(self.contacts(kind).as_slice())
    }

    fn variables(&self) -> Option<&Map<String, Value>> {
        Some(&self.variables)
    }
}

impl CanonicalSource for LeadDelta {
    fn scalar_fields(&self) -> &'static [&'static str] {
        &LEAD_FIELDS
    }

    fn scalar_value(&self, field: &str) -> FieldValue<String> {
        match self.scalar(field) {
            FieldValue::Omit => FieldValue::Omit,
            FieldValue::Clear => FieldValue::Clear,
            FieldValue::Set(v) => FieldValue::Set(v.clone()),
        }
    }

    fn contact_list(&self, kind: ContactKind) -> Option<&[ContactEntry]> {
        self.contacts(kind).map(Vec::as_slice)
    }

    fn variables(&self) -> Option<&Map<String, Value>> {
        self.variables.as_ref()
    }
}

impl CanonicalSource for CanonicalAccount {
    fn scalar_fields(&self) -> &'static [&'static str] {
        &ACCOUNT_FIELDS
    }

    fn scalar_value(&self, field: &str) -> FieldValue<String> {
        self.scalar(field).map(str::to_string).into()
    }

    fn variables(&self) -> Option<&Map<String, Value>> {
        Some(&self.variables)
    }
}

impl CanonicalSource for AccountDelta {
    fn scalar_fields(&self) -> &'static [&'static str] {
        &ACCOUNT_FIELDS
    }

    fn scalar_value(&self, field: &str) -> FieldValue<String> {
        match self.scalar(field) {
            FieldValue::Omit => FieldValue::Omit,
            FieldValue::Clear => FieldValue::Clear,
            FieldValue::Set(v) => FieldValue::Set(v.clone()),
        }
    }

    fn variables(&self) -> Option<&Map<String, Value>> {
        self.variables.as_ref()
    }
}

// ============================================================================
// PATH HELPERS
// ============================================================================

/// Write `value` at a dotted path, creating intermediate objects
pub fn set_path(payload: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts = path.split('.').peekable();
    let mut current = payload;

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return;
        }
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
}

/// Read a dotted path. A literal key containing dots wins over nesting.
pub fn get_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = record.get(path) {
        return Some(direct);
    }
    path.split('.')
        .try_fold(record, |current, part| current.get(part))
}

// ============================================================================
// CANONICAL → EXTERNAL
// ============================================================================

pub fn to_external<S: CanonicalSource + ?Sized>(map: &FieldMap, source: &S) -> Map<String, Value> {
    let mut payload = Map::new();

    for field in source.scalar_fields() {
        let Some(spec) = map.field(field) else {
            continue;
        };
        match source.scalar_value(field) {
            FieldValue::Omit => {}
            FieldValue::Clear => set_path(&mut payload, &spec.name, Value::Null),
            FieldValue::Set(value) => set_path(&mut payload, &spec.name, Value::String(value)),
        }
    }

    for kind in CONTACT_KINDS {
        let Some(entries) = source.contact_list(kind) else {
            continue;
        };
        for name in map.list(kind.map_key()) {
            if let Some(entry) = entries.iter().find(|e| e.type_ == name) {
                let value = if entry.has_value() {
                    Value::String(entry.value.clone())
                } else {
                    Value::Null
                };
                set_path(&mut payload, &name, value);
            }
        }
    }

    // Variables last: they win on key collision
    if let Some(variables) = source.variables() {
        for (key, value) in variables {
            payload.insert(key.clone(), value.clone());
        }
    }

    payload
}

// ============================================================================
// EXTERNAL → CANONICAL
// ============================================================================

/// Canonical values read back from an external record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalFragment {
    pub fields: BTreeMap<String, String>,
    pub emails: Vec<ContactEntry>,
    pub phones: Vec<ContactEntry>,
}

impl CanonicalFragment {
    pub fn contacts(&self, kind: ContactKind) -> &Vec<ContactEntry> {
        match kind {
            ContactKind::Email => &self.emails,
            ContactKind::Phone => &self.phones,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.emails.is_empty() && self.phones.is_empty()
    }
}

fn html_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<[^<>]*>").unwrap_or_else(|_| unreachable!()))
}

/// Remove markup and decode the common entities
pub fn strip_html(text: &str) -> String {
    if !text.contains('<') && !text.contains('&') {
        return text.to_string();
    }
    html_tag_pattern()
        .replace_all(text, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Text carried by an external value, following the unwrap rule
pub fn extract_string(value: &Value, unwrap: Unwrap) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => match unwrap {
            Unwrap::Auto => obj.get("value").and_then(|v| extract_string(v, Unwrap::Auto)),
            Unwrap::Label => obj.get("label").and_then(Value::as_str).map(str::to_string),
            Unwrap::Raw => None,
        },
        Value::Array(items) => {
            if unwrap == Unwrap::Raw {
                return None;
            }
            let chosen = items
                .iter()
                .find(|item| item.get("primary").and_then(Value::as_bool) == Some(true))
                .or_else(|| items.first())?;
            extract_string(chosen, unwrap)
        }
    }
}

fn read_field(spec: &FieldSpec, record: &Value) -> Option<String> {
    if !spec.is_importable() {
        return None;
    }
    let raw = get_path(record, &spec.name)?;
    extract_string(raw, spec.unwrap).map(|text| strip_html(&text))
}

/// Values of a described field list, keyed by external name. Used for custom
/// fields that have no canonical slot.
pub fn extract_fields(fields: &[FieldSpec], record: &Value) -> BTreeMap<String, String> {
    fields
        .iter()
        .filter_map(|spec| read_field(spec, record).map(|value| (spec.name.clone(), value)))
        .collect()
}

pub fn from_external(map: &FieldMap, record: &Value) -> CanonicalFragment {
    let mut fragment = CanonicalFragment::default();

    for (canonical, mapping) in &map.fields {
        let kind = CONTACT_KINDS
            .iter()
            .copied()
            .find(|k| k.map_key() == canonical.as_str());

        match (kind, mapping) {
            (Some(kind), mapping) => {
                for name in mapping.list() {
                    let value = get_path(record, &name)
                        .and_then(|v| extract_string(v, Unwrap::Auto))
                        .map(|text| strip_html(&text));
                    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                        let entry = ContactEntry {
                            id: String::new(),
                            value,
                            type_: name,
                            is_primary: false,
                        };
                        match kind {
                            ContactKind::Email => fragment.emails.push(entry),
                            ContactKind::Phone => fragment.phones.push(entry),
                        }
                    }
                }
            }
            (None, FieldMapping::List(_)) => {}
            (None, mapping) => {
                if let Some(value) = mapping.single().and_then(|spec| read_field(&spec, record)) {
                    fragment.fields.insert(canonical.clone(), value);
                }
            }
        }
    }

    fragment
}

// ============================================================================
// CSV EXPORT
// ============================================================================

fn flatten_into(prefix: &str, value: &Value, row: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, nested, row);
            }
        }
        Value::Null => row.push((prefix.to_string(), String::new())),
        Value::String(s) => row.push((prefix.to_string(), s.clone())),
        other => row.push((prefix.to_string(), other.to_string())),
    }
}

/// Project every lead with one map and write them as CSV. The header is the
/// union of payload keys in first-seen order.
pub fn export_csv<W: Write>(writer: W, map: &FieldMap, leads: &[CanonicalLead]) -> Result<usize> {
    let rows: Vec<Vec<(String, String)>> = leads
        .iter()
        .map(|lead| {
            let mut row = vec![("lead_id".to_string(), lead.lead_id.clone())];
            flatten_into("", &Value::Object(to_external(map, lead)), &mut row);
            row
        })
        .collect();

    let mut header: Vec<String> = Vec::new();
    for row in &rows {
        for (key, _) in row {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
    }

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&header)?;
    for row in &rows {
        let record: Vec<&str> = header
            .iter()
            .map(|column| {
                row.iter()
                    .find(|(key, _)| key == column)
                    .map(|(_, value)| value.as_str())
                    .unwrap_or("")
            })
            .collect();
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

// ============================================================================
// TESTS
// ============================================================================
