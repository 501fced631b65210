use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::Store;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Counts how many stores carry each tag, ordered by tag.
pub fn tag_counts<'a, I>(stores: I) -> Vec<TagCount>
where
    I: IntoIterator<Item = &'a Store>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

    for store in stores {
        for tag in &store.tags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::{Location, POINT};

    pub(crate) fn store(name: &str, tags: &[&str]) -> Store {
        Store {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: crate::slug::slugify(name),
            description: String::new(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            created: Utc::now(),
            location: Location {
                kind: POINT.to_string(),
                coordinates: [0.0, 0.0],
                address: "somewhere".to_string(),
            },
            photo: None,
            author: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_counts_and_orders_by_tag() {
        let stores = vec![
            store("a", &["Wifi", "Open Late"]),
            store("b", &["Wifi"]),
            store("c", &["Family Friendly", "Wifi"]),
            store("d", &[]),
        ];

        let counts = tag_counts(&stores);

        assert_eq!(
            counts,
            vec![
                TagCount {
                    tag: "Family Friendly".to_string(),
                    count: 1,
                },
                TagCount {
                    tag: "Open Late".to_string(),
                    count: 1,
                },
                TagCount {
                    tag: "Wifi".to_string(),
                    count: 3,
                },
            ]
        );
    }

    #[test]
    fn test_no_tags() {
        assert!(tag_counts(&[store("a", &[])]).is_empty());
        assert!(tag_counts(&Vec::<Store>::new()).is_empty());
    }
}
