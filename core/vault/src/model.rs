//! Vault data model.
//!
//! A [`Vault`] is the unit of encryption: it is always serialized, sealed and
//! opened as a whole. Entries zeroize their secret fields when dropped.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use pearanoid_common::{EntryId, Error, Result};

/// Current vault schema version.
pub const VAULT_VERSION: u32 = 1;

/// Trim an optional free-text field; blank values become `None`.
fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Next `updatedAt` value: now, or one millisecond past `previous` if the
/// clock has not moved forward.
fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// Fields supplied by the caller when adding an entry.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct EntryFields {
    pub name: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
    pub section: Option<String>,
    pub notes: Option<String>,
}

impl EntryFields {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: None,
            email: None,
            password: password.into(),
            section: None,
            notes: None,
        }
    }

    /// An entry with only a name; the password starts empty.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, String::new())
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password.zeroize();
        self.password = password.into();
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Only the name is required.
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)
    }
}

impl fmt::Debug for EntryFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryFields")
            .field("name", &self.name)
            .field("section", &self.section)
            .finish_non_exhaustive()
    }
}

/// Partial update of an entry. Only `Some` fields are merged.
///
/// For optional fields a blank string clears the value.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct EntryUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub section: Option<String>,
    pub notes: Option<String>,
}

impl EntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.username.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.section.is_none()
            && self.notes.is_none()
    }

    /// A supplied name must not be blank.
    pub fn validate(&self) -> Result<()> {
        match &self.name {
            Some(name) => require("name", name),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for EntryUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryUpdate")
            .field("name", &self.name)
            .field("section", &self.section)
            .field("password_changed", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

/// One stored secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntry {
    #[zeroize(skip)]
    id: EntryId,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
    #[zeroize(skip)]
    updated_at: DateTime<Utc>,
}

impl CredentialEntry {
    fn create(fields: &EntryFields, now: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::generate(),
            name: fields.name.trim().to_string(),
            username: normalize(fields.username.clone()),
            email: normalize(fields.email.clone()),
            password: fields.password.clone(),
            section: normalize(fields.section.clone()),
            notes: normalize(fields.notes.clone()),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: &EntryUpdate, now: DateTime<Utc>) {
        if let Some(name) = &update.name {
            self.name = name.trim().to_string();
        }
        if let Some(password) = &update.password {
            self.password.zeroize();
            self.password = password.clone();
        }
        if update.username.is_some() {
            self.username.zeroize();
            self.username = normalize(update.username.clone());
        }
        if update.email.is_some() {
            self.email.zeroize();
            self.email = normalize(update.email.clone());
        }
        if update.section.is_some() {
            self.section = normalize(update.section.clone());
        }
        if update.notes.is_some() {
            self.notes.zeroize();
            self.notes = normalize(update.notes.clone());
        }
        self.updated_at = advance(self.updated_at, now);
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Case-insensitive substring match over the non-secret text fields.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        std::iter::once(Some(self.name.as_str()))
            .chain([
                self.username.as_deref(),
                self.email.as_deref(),
                self.section.as_deref(),
                self.notes.as_deref(),
            ])
            .flatten()
            .any(|field| field.to_lowercase().contains(&query))
    }
}

impl fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("section", &self.section)
            .field("password", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// The full set of entries, encrypted as one unit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub version: u32,
    #[serde(default)]
    entries: Vec<CredentialEntry>,
}

impl Vault {
    /// An empty vault at the current schema version.
    pub fn new() -> Self {
        Self {
            version: VAULT_VERSION,
            entries: Vec::new(),
        }
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[CredentialEntry] {
        &self.entries
    }

    pub fn get(&self, id: &EntryId) -> Option<&CredentialEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a new entry with a fresh id and both timestamps set to `now`.
    pub fn add(&mut self, fields: &EntryFields, now: DateTime<Utc>) -> Result<EntryId> {
        fields.validate()?;
        let entry = CredentialEntry::create(fields, now);
        let id = entry.id.clone();
        self.entries.push(entry);
        Ok(id)
    }

    /// Merge `update` into the entry with `id`.
    ///
    /// Returns `Ok(false)` when no entry has that id.
    pub fn update(
        &mut self,
        id: &EntryId,
        update: &EntryUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        update.validate()?;
        match self.entries.iter_mut().find(|e| &e.id == id) {
            Some(entry) => {
                entry.apply(update, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the entry with `id`. Returns whether one was removed.
    pub fn remove(&mut self, id: &EntryId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.id != id);
        self.entries.len() != before
    }

    /// First id that appears more than once, if any.
    pub fn duplicate_id(&self) -> Option<&EntryId> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries.iter().map(|e| &e.id).find(|id| !seen.insert(*id))
    }

    /// Distinct non-empty sections, sorted.
    pub fn sections(&self) -> Vec<String> {
        sections_of(&self.entries)
    }

    /// Entries whose text fields contain `query`, case-insensitively.
    pub fn search(&self, query: &str) -> Vec<CredentialEntry> {
        self.entries
            .iter()
            .filter(|e| e.matches(query))
            .cloned()
            .collect()
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("version", &self.version)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Distinct non-empty `section` values across `entries`, sorted.
pub fn sections_of(entries: &[CredentialEntry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| e.section.as_deref())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}
