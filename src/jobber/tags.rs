use std::collections::BTreeSet;

use crate::jobber::job::Job;

/// All tags in use, in a fixed order so that each tag keeps its display index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagRegistry(BTreeSet<String>);

impl TagRegistry {
    pub fn collect<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        Self(jobs.into_iter().flat_map(|job| job.tags.iter().cloned()).collect())
    }

    pub fn index(&self, tag: &str) -> Option<usize> {
        self.0.iter().position(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render a tag with a terminal color picked by its index.
    pub fn paint(&self, tag: &str) -> String {
        match self.index(tag) {
            Some(index) => format!("\x1b[1;{}m{tag}\x1b[0m", 31 + index % 6),
            None => tag.to_string(),
        }
    }
}

/// Apply a tag edit to an existing set.
///
/// `+tag` adds and `-tag` removes. Without any prefixed entry the given list
/// replaces the set.
pub fn modify(current: &BTreeSet<String>, edit: &BTreeSet<String>) -> BTreeSet<String> {
    if !edit.iter().any(|t| t.starts_with('+') || t.starts_with('-')) {
        return edit.clone();
    }
    let mut tags = current.clone();
    for tag in edit {
        if let Some(tag) = tag.strip_prefix('+') {
            tags.insert(tag.to_string());
        } else if let Some(tag) = tag.strip_prefix('-') {
            tags.remove(tag);
        } else {
            tags.insert(tag.clone());
        }
    }
    tags
}
