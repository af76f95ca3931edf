//! Allow-list of originating numbers permitted to inject messages

use std::collections::HashSet;

/// Set of normalized originating identifiers
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    numbers: HashSet<String>,
}

impl AllowList {
    /// Build an allow-list; entries are trimmed and empty ones dropped.
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let numbers = numbers
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        Self { numbers }
    }

    /// Exact-match membership test after trimming the raw identifier.
    pub fn authorize(&self, originating_id: &str) -> bool {
        let id = originating_id.trim();
        !id.is_empty() && self.numbers.contains(id)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_trims_input() {
        let list = AllowList::new(["+15550001111"]);
        assert!(list.authorize("+15550001111"));
        assert!(list.authorize("  +15550001111\n"));
        assert!(!list.authorize("+15550009999"));
    }

    #[test]
    fn test_empty_input_rejected() {
        let list = AllowList::new(["+15550001111"]);
        assert!(!list.authorize(""));
        assert!(!list.authorize("   "));
    }

    #[test]
    fn test_duplicates_and_blanks_collapse() {
        let list = AllowList::new(["+1555", " +1555 ", ""]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_empty_list_rejects_everyone() {
        let list = AllowList::default();
        assert!(list.is_empty());
        assert!(!list.authorize("+15550001111"));
    }
}
