//! Plaintext schemas of the two compartments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ── Main vault ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Main vault plaintext. Every field defaults so older or newer payloads
/// still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultData {
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<Message>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

// ── Personal vault ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryCategory {
    Password,
    Identity,
    Financial,
    Medical,
    Note,
    Other,
}

impl EntryCategory {
    pub const ALL: [EntryCategory; 6] = [
        EntryCategory::Password,
        EntryCategory::Identity,
        EntryCategory::Financial,
        EntryCategory::Medical,
        EntryCategory::Note,
        EntryCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryCategory::Password => "password",
            EntryCategory::Identity => "identity",
            EntryCategory::Financial => "financial",
            EntryCategory::Medical => "medical",
            EntryCategory::Note => "note",
            EntryCategory::Other => "other",
        }
    }
}

impl fmt::Display for EntryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        EntryCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == lower)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// One sensitive item. `value` is the secret payload; every other field is
/// metadata.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalVaultEntry {
    pub id: String,
    pub category: EntryCategory,
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersonalVaultEntry {
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            id: self.id.clone(),
            category: self.category,
            label: self.label.clone(),
            notes: self.notes.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Keeps `value` out of logs and panic messages.
impl fmt::Debug for PersonalVaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonalVaultEntry")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("label", &self.label)
            .field("value", &"<redacted>")
            .field("notes", &self.notes)
            .field("tags", &self.tags)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// An entry without its secret payload. The only form of an entry that may
/// be handed to model/inference collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub id: String,
    pub category: EntryCategory,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalVaultData {
    #[serde(default)]
    pub entries: Vec<PersonalVaultEntry>,
}

/// Caller-supplied fields of a new entry; id and timestamps are stamped by
/// the vault.
#[derive(Clone, PartialEq)]
pub struct NewEntry {
    pub category: EntryCategory,
    pub label: String,
    pub value: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl NewEntry {
    pub fn new(category: EntryCategory, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            category,
            label: label.into(),
            value: value.into(),
            notes: None,
            tags: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn into_entry(self, now: DateTime<Utc>) -> PersonalVaultEntry {
        PersonalVaultEntry {
            id: Uuid::new_v4().to_string(),
            category: self.category,
            label: self.label,
            value: self.value,
            notes: self.notes,
            tags: self.tags,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for NewEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewEntry")
            .field("category", &self.category)
            .field("label", &self.label)
            .field("value", &"<redacted>")
            .field("notes", &self.notes)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Partial update. `None` leaves a field untouched; `notes: Some(None)`
/// clears the notes. `id` and `created_at` cannot be patched.
#[derive(Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub category: Option<EntryCategory>,
    pub label: Option<String>,
    pub value: Option<String>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.label.is_none()
            && self.value.is_none()
            && self.notes.is_none()
            && self.tags.is_none()
    }

    pub(crate) fn apply(self, entry: &mut PersonalVaultEntry, now: DateTime<Utc>) {
        if let Some(category) = self.category {
            entry.category = category;
        }
        if let Some(label) = self.label {
            entry.label = label;
        }
        if let Some(value) = self.value {
            entry.value = value;
        }
        if let Some(notes) = self.notes {
            entry.notes = notes;
        }
        if let Some(tags) = self.tags {
            entry.tags = tags;
        }
        entry.updated_at = now;
    }
}

impl fmt::Debug for EntryPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPatch")
            .field("category", &self.category)
            .field("label", &self.label)
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .field("notes", &self.notes)
            .field("tags", &self.tags)
            .finish()
    }
}
