//! Merging of overlapping result sets
//!
//! Title and content searches return overlapping rows. The merge keeps the first
//! occurrence of every id across sources taken in priority order and tags it with
//! the source it came from.

use serde::Serialize;
use std::collections::HashSet;

/// Anything with a stable string id.
pub trait Identified {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Title,
    Content,
}

/// A row plus the source that produced it. Serializes flat, with `match_type` added.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tagged<T> {
    #[serde(flatten)]
    pub item: T,
    pub match_type: MatchSource,
}

/// Concatenate `sources` in order, keeping each id once with the tag of its
/// earliest source.
pub fn merge_by_id<T, I>(sources: I) -> Vec<Tagged<T>>
where
    T: Identified,
    I: IntoIterator<Item = (MatchSource, Vec<T>)>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for (source, items) in sources {
        for item in items {
            if seen.insert(item.id().to_string()) {
                merged.push(Tagged { item, match_type: source });
            }
        }
    }
    merged
}

/// Drop repeated ids, first occurrence wins.
pub fn dedup_by_id<T: Identified>(items: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Row {
        id: String,
        title: String,
    }

    impl Identified for Row {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn row(id: &str) -> Row {
        Row { id: id.to_string(), title: format!("note {}", id) }
    }

    #[test]
    fn test_title_match_wins_over_content() {
        let merged = merge_by_id(vec![
            (MatchSource::Title, vec![row("A"), row("B")]),
            (MatchSource::Content, vec![row("B"), row("C")]),
        ]);
        let got: Vec<(&str, MatchSource)> =
            merged.iter().map(|t| (t.item.id.as_str(), t.match_type)).collect();
        assert_eq!(
            got,
            vec![
                ("A", MatchSource::Title),
                ("B", MatchSource::Title),
                ("C", MatchSource::Content),
            ]
        );
    }

    #[test]
    fn test_duplicates_within_one_source() {
        let merged = merge_by_id(vec![(MatchSource::Content, vec![row("A"), row("A")])]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_empty_sources() {
        let merged: Vec<Tagged<Row>> = merge_by_id(Vec::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_tagged_serializes_flat() {
        let tagged = Tagged { item: row("A"), match_type: MatchSource::Content };
        let json = serde_json::to_value(&tagged).unwrap();
        assert_eq!(json["id"], "A");
        assert_eq!(json["match_type"], "content");
    }

    #[test]
    fn test_dedup_by_id_keeps_first() {
        let mut second = row("A");
        second.title = "other".to_string();
        let out = dedup_by_id(vec![row("A"), row("B"), second]);
        assert_eq!(out, vec![row("A"), row("B")]);
    }
}
