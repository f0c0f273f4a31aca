//! Merging classified candidates from several adapters into one review list.

use std::collections::HashSet;

use crate::models::IntegratedItem;

/// Concatenate per-source lists, keeping each list's order.
///
/// Ids are namespaced by source, so only exact repeats of the same id are
/// dropped (the first occurrence wins). Items from different sources are
/// never merged with each other.
pub fn merge<I>(item_lists: I) -> Vec<IntegratedItem>
where
    I: IntoIterator<Item = Vec<IntegratedItem>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for list in item_lists {
        for item in list {
            if seen.insert(item.id.clone()) {
                merged.push(item);
            }
        }
    }
    merged
}

/// Group a merged list by source label, in order of first appearance.
pub fn group_by_source(items: &[IntegratedItem]) -> Vec<(String, Vec<&IntegratedItem>)> {
    let mut groups: Vec<(String, Vec<&IntegratedItem>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(label, _)| *label == item.source) {
            Some((_, members)) => members.push(item),
            None => groups.push((item.source.clone(), vec![item])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemPriority;
    use chrono::Utc;

    fn item(id: &str, source: &str) -> IntegratedItem {
        IntegratedItem {
            id: id.to_string(),
            title: format!("title {}", id),
            description: String::new(),
            priority: ItemPriority::Medium,
            due_date: None,
            url: String::new(),
            source: source.to_string(),
            created_at: Utc::now(),
        }
    }

    fn ids(items: &[IntegratedItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn merge_is_associative() {
        let a = item("slack:1", "Slack Message");
        let b = item("mail:1", "Mail Message");
        let c = item("quip:1", "Quip Document");

        let left = merge(vec![vec![a.clone(), b.clone()], vec![c.clone()]]);
        let right = merge(vec![vec![a], vec![b, c]]);
        assert_eq!(left, right);
        assert_eq!(ids(&left), vec!["slack:1", "mail:1", "quip:1"]);
    }

    #[test]
    fn repeated_id_keeps_first() {
        let first = item("slack:1", "Slack Message");
        let mut repeat = item("slack:1", "Slack Message");
        repeat.title = "later".to_string();
        let merged = merge(vec![vec![first, item("slack:2", "Slack Message")], vec![repeat]]);
        assert_eq!(ids(&merged), vec!["slack:1", "slack:2"]);
        assert_eq!(merged[0].title, "title slack:1");
    }

    #[test]
    fn same_native_id_in_different_namespaces_survives() {
        let merged = merge(vec![vec![item("slack:42", "Slack Message")], vec![item("mail:42", "Mail Message")]]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn groups_follow_first_appearance() {
        let merged = merge(vec![
            vec![item("mail:1", "Mail Message")],
            vec![item("slack:1", "Slack Message"), item("slack:2", "Slack Message")],
        ]);
        let groups = group_by_source(&merged);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "Mail Message");
        assert_eq!(groups[1].1.len(), 2);
    }
}
