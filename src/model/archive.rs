//! The in-memory archive model: an ordered collection of entries plus a
//! comment (section 4.E).

use std::collections::HashMap;

use crate::error::{Error, FormatError};

use super::Entry;

/// An ordered collection of [Entry] values, plus an archive-level comment.
///
/// Insertion order is preserved (it becomes central directory order on
/// write). Renaming or deleting an entry doesn't reorder the others.
pub struct Archive {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    comment: Option<String>,
    /// Alignment in bytes for STORED entries on write (0 disables); see
    /// [Self::set_alignment].
    alignment: u32,
    /// Snapshot taken right after opening an existing archive, used by
    /// [Archive::unchange_entry] / [Archive::unchange_all] to discard
    /// mutations. `None` for an archive created from scratch. Kept in
    /// original central-directory order, since [Archive::unchange_all] must
    /// restore that order rather than any order a `HashMap` happens to
    /// iterate in.
    source_entries: Option<Vec<Entry>>,
    source_comment: Option<Option<String>>,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    /// Creates an empty archive.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            comment: None,
            alignment: 0,
            source_entries: None,
            source_comment: None,
        }
    }

    /// The alignment (in bytes) applied to STORED entries on write; 0 means
    /// no alignment padding is inserted.
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Sets the alignment (in bytes) applied to STORED entries on write.
    /// Pass 0 to disable (the default). A common value is 4, for Android
    /// APK zip-align compatibility.
    pub fn set_alignment(&mut self, alignment: u32) {
        self.alignment = alignment;
    }

    /// Takes a snapshot of the current entries/comment as the "source" state
    /// to revert to via [Self::unchange_entry] and friends. Called once by
    /// the reader right after the central directory has been parsed.
    pub(crate) fn snapshot_as_source(&mut self) {
        self.source_entries = Some(self.entries.iter().map(Entry::clone).collect());
        self.source_comment = Some(self.comment.clone());
    }

    /// Iterates over all entries, in archive order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Iterates mutably over all entries, in archive order.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Looks up an entry by exact name.
    pub fn by_name(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Looks up an entry by exact name, mutably.
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Entry> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    /// Inserts an entry, keyed by its name. An existing entry with the same
    /// name is replaced in place (same slot, same position); a new name is
    /// appended at the end (section 4.E: "insert replaces on collision" --
    /// unlike [Self::rename], which rejects a colliding target name).
    pub fn insert(&mut self, entry: Entry) {
        match self.index.get(entry.name()) {
            Some(&idx) => self.entries[idx] = entry,
            None => {
                self.index.insert(entry.name().to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Renames an entry in place (position in the archive is unchanged).
    /// Fails with [Error::NotFound] if `old_name` doesn't exist, or
    /// [Error::AlreadyExists] if `new_name` already does.
    pub fn rename(&mut self, old_name: &str, new_name: impl Into<String>) -> Result<(), Error> {
        let new_name = new_name.into();
        let idx = *self
            .index
            .get(old_name)
            .ok_or_else(|| Error::NotFound(old_name.to_string()))?;
        if new_name != old_name && self.index.contains_key(&new_name) {
            return Err(Error::AlreadyExists(new_name));
        }
        self.entries[idx].set_name(new_name.clone())?;
        self.index.remove(old_name);
        self.index.insert(new_name, idx);
        Ok(())
    }

    /// Deletes an entry by exact name, returning it. Fails with
    /// [Error::NotFound] if it doesn't exist.
    pub fn delete(&mut self, name: &str) -> Result<Entry, Error> {
        let idx = self
            .index
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let entry = self.entries.remove(idx);
        self.reindex_from(idx);
        Ok(entry)
    }

    /// Deletes every entry whose name matches `pattern` (a glob as understood
    /// by the `glob` crate, e.g. `"assets/**/*.png"`). Returns the number of
    /// entries deleted; zero matches is not an error.
    pub fn delete_by_glob(&mut self, pattern: &str) -> Result<usize, Error> {
        let pat = glob::Pattern::new(pattern)
            .map_err(|e| Error::invalid_argument(format!("invalid glob pattern: {e}")))?;
        self.delete_where(|name| pat.matches(name))
    }

    /// Deletes every entry whose name matches `pattern` (a regular
    /// expression). Returns the number of entries deleted; zero matches is
    /// not an error.
    pub fn delete_by_regex(&mut self, pattern: &str) -> Result<usize, Error> {
        let re = regex::Regex::new(pattern)
            .map_err(|e| Error::invalid_argument(format!("invalid regex: {e}")))?;
        self.delete_where(|name| re.is_match(name))
    }

    fn delete_where(&mut self, pred: impl Fn(&str) -> bool) -> Result<usize, Error> {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(e.name()));
        let removed = before - self.entries.len();
        self.rebuild_index();
        Ok(removed)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, e) in self.entries.iter().enumerate() {
            self.index.insert(e.name().to_string(), i);
        }
    }

    fn reindex_from(&mut self, start: usize) {
        for i in start..self.entries.len() {
            self.index.insert(self.entries[i].name().to_string(), i);
        }
    }

    /// The archive-level comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Sets (or clears) the archive-level comment.
    pub fn set_comment(&mut self, comment: Option<String>) -> Result<(), Error> {
        if let Some(c) = &comment {
            if c.len() > u16::MAX as usize {
                return Err(FormatError::FieldTooLong("archive comment", c.len()).into());
            }
        }
        self.comment = comment;
        Ok(())
    }

    pub(crate) fn set_comment_raw(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub(crate) fn push_raw(&mut self, entry: Entry) {
        self.index.insert(entry.name().to_string(), self.entries.len());
        self.entries.push(entry);
    }

    /// Reverts a single entry to the state it had when the archive was
    /// opened. No-op if the entry was added after opening, or if this
    /// archive wasn't opened from an existing reader.
    pub fn unchange_entry(&mut self, name: &str) {
        let Some(source) = &self.source_entries else {
            return;
        };
        let Some(original) = source.iter().find(|e| e.name() == name) else {
            return;
        };
        let original = original.clone();
        match self.index.get(name) {
            Some(&idx) => self.entries[idx] = original,
            None => self.insert(original),
        }
    }

    /// Reverts every entry (and the archive comment) to the state they had
    /// when the archive was opened, in their original central-directory
    /// order. No-op if this archive wasn't opened from an existing reader.
    pub fn unchange_all(&mut self) {
        let Some(source) = self.source_entries.clone() else {
            return;
        };
        self.entries.clear();
        self.index.clear();
        for entry in source {
            self.push_raw(entry);
        }
        if let Some(comment) = self.source_comment.clone() {
            self.comment = comment;
        }
    }

    /// Reverts the archive comment to the state it had when the archive was
    /// opened. No-op if this archive wasn't opened from an existing reader.
    pub fn unchange_archive_comment(&mut self) {
        if let Some(comment) = self.source_comment.clone() {
            self.comment = comment;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataSource;

    fn file(name: &str) -> Entry {
        Entry::new_file(name, DataSource::Bytes(name.as_bytes().to_vec())).unwrap()
    }

    #[test]
    fn insert_appends_new_names_in_order() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.insert(file("b.txt"));
        let names: Vec<_> = archive.entries().map(Entry::name).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn insert_replaces_in_place_on_collision() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.insert(file("b.txt"));
        archive.insert(file("a.txt"));
        assert_eq!(archive.len(), 2);
        let names: Vec<_> = archive.entries().map(Entry::name).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn rename_updates_index_and_keeps_position() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.insert(file("b.txt"));
        archive.rename("a.txt", "c.txt").unwrap();
        assert!(!archive.contains("a.txt"));
        assert!(archive.contains("c.txt"));
        let names: Vec<_> = archive.entries().map(Entry::name).collect();
        assert_eq!(names, ["c.txt", "b.txt"]);
    }

    #[test]
    fn rename_missing_source_is_not_found() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        assert!(matches!(
            archive.rename("missing.txt", "x.txt"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn rename_to_existing_name_is_rejected() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.insert(file("b.txt"));
        assert!(matches!(
            archive.rename("a.txt", "b.txt"),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn rename_to_same_name_is_a_no_op() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        assert!(archive.rename("a.txt", "a.txt").is_ok());
        assert!(archive.contains("a.txt"));
    }

    #[test]
    fn delete_removes_and_reindexes() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.insert(file("b.txt"));
        archive.insert(file("c.txt"));
        archive.delete("a.txt").unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_name("b.txt").unwrap().name(), "b.txt");
        assert_eq!(archive.by_name("c.txt").unwrap().name(), "c.txt");
    }

    #[test]
    fn delete_missing_name_is_not_found() {
        let mut archive = Archive::new();
        assert!(matches!(archive.delete("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_by_glob_matches_and_counts() {
        let mut archive = Archive::new();
        archive.insert(file("assets/a.png"));
        archive.insert(file("assets/b.png"));
        archive.insert(file("readme.txt"));
        let removed = archive.delete_by_glob("assets/*.png").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn delete_by_glob_with_no_matches_is_not_an_error() {
        let mut archive = Archive::new();
        archive.insert(file("readme.txt"));
        let removed = archive.delete_by_glob("*.png").unwrap();
        assert_eq!(removed, 0);
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn delete_by_regex_matches_and_counts() {
        let mut archive = Archive::new();
        archive.insert(file("log-2024.txt"));
        archive.insert(file("log-2025.txt"));
        archive.insert(file("readme.txt"));
        let removed = archive.delete_by_regex(r"^log-\d{4}\.txt$").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn set_comment_rejects_oversized_comment() {
        let mut archive = Archive::new();
        let huge = "x".repeat(u16::MAX as usize + 1);
        assert!(archive.set_comment(Some(huge)).is_err());
    }

    #[test]
    fn unchange_entry_restores_original_and_is_noop_for_new_entries() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.snapshot_as_source();

        archive.delete("a.txt").unwrap();
        archive.insert(file("b.txt"));
        archive.unchange_entry("a.txt");
        assert!(archive.contains("a.txt"));

        // "b.txt" didn't exist at snapshot time, so reverting it is a no-op.
        archive.unchange_entry("b.txt");
        assert!(archive.contains("b.txt"));
    }

    #[test]
    fn unchange_all_restores_original_order_and_comment() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.insert(file("b.txt"));
        archive.set_comment(Some("original".to_string())).unwrap();
        archive.snapshot_as_source();

        archive.delete("a.txt").unwrap();
        archive.insert(file("c.txt"));
        archive.set_comment(Some("changed".to_string())).unwrap();

        archive.unchange_all();
        let names: Vec<_> = archive.entries().map(Entry::name).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        assert_eq!(archive.comment(), Some("original"));
    }

    #[test]
    fn unchange_archive_comment_only_reverts_comment() {
        let mut archive = Archive::new();
        archive.insert(file("a.txt"));
        archive.set_comment(Some("original".to_string())).unwrap();
        archive.snapshot_as_source();

        archive.insert(file("b.txt"));
        archive.set_comment(Some("changed".to_string())).unwrap();
        archive.unchange_archive_comment();

        assert_eq!(archive.comment(), Some("original"));
        assert!(archive.contains("b.txt"));
    }
}
