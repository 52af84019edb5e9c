//! Metadata search over personal-vault entries.
//!
//! The matcher works on [`SearchView`], which borrows every searchable field
//! of an entry and has no access to `value`.

use crate::model::{EntryCategory, PersonalVaultEntry};

#[derive(Debug, Clone, Copy)]
pub struct SearchView<'a> {
    pub label: &'a str,
    pub category: EntryCategory,
    pub notes: Option<&'a str>,
    pub tags: &'a [String],
}

impl PersonalVaultEntry {
    pub fn search_view(&self) -> SearchView<'_> {
        SearchView {
            label: &self.label,
            category: self.category,
            notes: self.notes.as_deref(),
            tags: &self.tags,
        }
    }
}

/// Case-insensitive substring match on label, category, notes and tags.
/// An empty query matches everything.
pub fn matches(view: &SearchView<'_>, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let hit = |field: &str| field.to_lowercase().contains(&needle);
    hit(view.label)
        || hit(view.category.as_str())
        || view.notes.is_some_and(hit)
        || view.tags.iter().any(|tag| hit(tag.as_str()))
}

pub fn search<'a>(entries: &'a [PersonalVaultEntry], query: &str) -> Vec<&'a PersonalVaultEntry> {
    entries
        .iter()
        .filter(|entry| matches(&entry.search_view(), query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewEntry;
    use chrono::Utc;

    fn entries() -> Vec<PersonalVaultEntry> {
        vec![
            NewEntry::new(EntryCategory::Financial, "Chase Checking", "4111-1111-1111-1111")
                .with_notes("primary")
                .into_entry(Utc::now()),
            NewEntry::new(EntryCategory::Medical, "Dr. Patel", "blood type O-")
                .with_tags(["doctor", "family"])
                .into_entry(Utc::now()),
        ]
    }

    #[test]
    fn value_is_never_searched() {
        let entries = entries();
        assert!(search(&entries, "4111").is_empty());
        assert!(search(&entries, "blood").is_empty());
    }

    #[test]
    fn metadata_fields_are_searched() {
        let entries = entries();
        assert_eq!(search(&entries, "Chase")[0].label, "Chase Checking");
        assert_eq!(search(&entries, "PRIMARY")[0].label, "Chase Checking");
        assert_eq!(search(&entries, "medical")[0].label, "Dr. Patel");
        assert_eq!(search(&entries, "fam")[0].label, "Dr. Patel");
        assert_eq!(search(&entries, "  ").len(), 2);
        assert!(search(&entries, "nothing").is_empty());
    }
}
