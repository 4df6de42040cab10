// src/dedupe.rs
use crate::sources::SourceId;
use std::collections::BTreeMap;

/// Lower-case, trim and drop trailing dots. Returns `None` when nothing is left.
pub fn normalize(raw: &str) -> Option<String> {
    let name = raw.trim().trim_end_matches('.').trim().to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub first_seen: Option<SourceId>,
}

/// Normalized hostnames, each recorded once with the source that reported it first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    entries: BTreeMap<String, Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the normalized name was not present yet.
    pub fn insert(&mut self, raw: &str, source: Option<SourceId>) -> bool {
        let Some(name) = normalize(raw) else {
            return false;
        };
        match self.entries.entry(name) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(Candidate { first_seen: source });
                true
            }
        }
    }

    pub fn extend_from_source<I, S>(&mut self, source: SourceId, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.insert(name.as_ref(), Some(source));
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.entries.retain(|name, _| keep(name));
    }

    pub fn contains(&self, name: &str) -> bool {
        normalize(name).is_some_and(|n| self.entries.contains_key(&n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Candidate)> {
        self.entries.iter().map(|(name, candidate)| (name.as_str(), candidate))
    }
}

/// Normalize and deduplicate a sequence of raw hostnames.
///
/// Domain membership is not checked here; callers decide which names are in scope.
pub fn dedupe<I, S>(names: I) -> CandidateSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = CandidateSet::new();
    for name in names {
        set.insert(name.as_ref(), None);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  WWW.Example.COM. "), Some("www.example.com".to_string()));
        assert_eq!(normalize("api.example.com.."), Some("api.example.com".to_string()));
        assert_eq!(normalize(" . "), None);
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn test_dedupe_case_and_dot_insensitive() {
        let set = dedupe(["www.example.com", "WWW.example.com.", "api.example.com"]);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["api.example.com", "www.example.com"]);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let inputs = vec![
            "b.example.com",
            " B.EXAMPLE.COM.",
            "a.example.com",
            "unrelated.org",
            "",
            "a.example.com.",
        ];
        let once = dedupe(&inputs);
        let twice = dedupe(once.names());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dedupe_keeps_out_of_scope_names() {
        let set = dedupe(["cdn.other.net", "www.example.com"]);
        assert!(set.contains("CDN.other.net."));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_first_seen_source_wins() {
        let mut set = CandidateSet::new();
        set.extend_from_source(SourceId::Crtsh, ["www.example.com"]);
        set.extend_from_source(SourceId::Hackertarget, ["WWW.example.com", "mail.example.com"]);

        let sources: Vec<(&str, Option<SourceId>)> =
            set.iter().map(|(name, c)| (name, c.first_seen)).collect();
        assert_eq!(
            sources,
            vec![
                ("mail.example.com", Some(SourceId::Hackertarget)),
                ("www.example.com", Some(SourceId::Crtsh)),
            ]
        );
    }
}
