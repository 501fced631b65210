//! # Top Stores
//!
//! Joins reviews onto stores and ranks them by mean rating.
//!
//! - Only stores with at least [`MIN_REVIEWS`] reviews qualify
//! - Unrated reviews count towards the minimum but not the mean
//! - A store with no rated reviews has no mean and sorts after every rated store
//! - Ties go to the store with more reviews, then alphabetically by name
use std::{cmp::Ordering, collections::HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Review, Store};

pub const MIN_REVIEWS: usize = 2;
pub const TOP_LIMIT: usize = 10;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RankedStore {
    pub store: Store,
    pub review_count: usize,
    pub average_rating: Option<f64>,
}

#[derive(Default)]
struct Tally {
    reviews: usize,
    rated: usize,
    total: u32,
}

pub fn top_stores(stores: &[Store], reviews: &[Review], limit: usize) -> Vec<RankedStore> {
    let mut tallies: HashMap<Uuid, Tally> = HashMap::new();

    for review in reviews {
        let tally = tallies.entry(review.store).or_default();
        tally.reviews += 1;
        if let Some(rating) = review.rating {
            tally.rated += 1;
            tally.total += u32::from(rating);
        }
    }

    let mut ranked: Vec<RankedStore> = stores
        .iter()
        .filter_map(|store| {
            let tally = tallies.get(&store.id)?;
            if tally.reviews < MIN_REVIEWS {
                return None;
            }

            let average_rating =
                (tally.rated > 0).then(|| f64::from(tally.total) / tally.rated as f64);

            Some(RankedStore {
                store: store.clone(),
                review_count: tally.reviews,
                average_rating,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        compare_average(a.average_rating, b.average_rating)
            .then_with(|| b.review_count.cmp(&a.review_count))
            .then_with(|| a.store.name.cmp(&b.store.name))
    });
    ranked.truncate(limit);

    ranked
}

/// Higher averages first, missing averages last.
fn compare_average(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::tags::tests::store;

    fn review(store: &Store, rating: Option<u8>) -> Review {
        Review {
            id: Uuid::new_v4(),
            text: "ok".to_string(),
            created: Utc::now(),
            author: Uuid::new_v4(),
            store: store.id,
            rating,
        }
    }

    #[test]
    fn test_requires_two_reviews() {
        let lonely = store("Lonely", &[]);
        let popular = store("Popular", &[]);
        let reviews = vec![
            review(&lonely, Some(5)),
            review(&popular, Some(3)),
            review(&popular, Some(4)),
        ];

        let top = top_stores(&[lonely, popular], &reviews, TOP_LIMIT);

        assert_eq!(top.len(), 1);
        assert_eq!(top[0].store.name, "Popular");
        assert_eq!(top[0].review_count, 2);
        assert_eq!(top[0].average_rating, Some(3.5));
    }

    #[test]
    fn test_sorted_by_average_then_count_then_name() {
        let a = store("Alpha", &[]);
        let b = store("Bravo", &[]);
        let c = store("Charlie", &[]);
        let d = store("Delta", &[]);
        let reviews = vec![
            review(&a, Some(4)),
            review(&a, Some(4)),
            review(&b, Some(5)),
            review(&b, Some(4)),
            review(&c, Some(4)),
            review(&c, Some(4)),
            review(&c, Some(4)),
            review(&d, Some(4)),
            review(&d, Some(4)),
        ];

        let top = top_stores(&[a, b, c, d], &reviews, TOP_LIMIT);
        let names: Vec<&str> = top.iter().map(|ranked| ranked.store.name.as_str()).collect();

        assert_eq!(names, ["Bravo", "Charlie", "Alpha", "Delta"]);
    }

    #[test]
    fn test_unrated_reviews_count_but_do_not_average() {
        let mixed = store("Mixed", &[]);
        let silent = store("Silent", &[]);
        let reviews = vec![
            review(&mixed, Some(2)),
            review(&mixed, None),
            review(&silent, None),
            review(&silent, None),
        ];

        let top = top_stores(&[silent, mixed], &reviews, TOP_LIMIT);

        assert_eq!(top[0].store.name, "Mixed");
        assert_eq!(top[0].average_rating, Some(2.0));
        assert_eq!(top[0].review_count, 2);
        assert_eq!(top[1].store.name, "Silent");
        assert_eq!(top[1].average_rating, None);
    }

    #[test]
    fn test_limit() {
        let stores: Vec<Store> = (0..12).map(|i| store(&format!("s{i:02}"), &[])).collect();
        let reviews: Vec<Review> = stores
            .iter()
            .flat_map(|s| [review(s, Some(3)), review(s, Some(3))])
            .collect();

        assert_eq!(top_stores(&stores, &reviews, TOP_LIMIT).len(), TOP_LIMIT);
        assert_eq!(top_stores(&stores, &reviews, 3).len(), 3);
    }
}
