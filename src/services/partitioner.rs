//! Size-bounded chunking of an event's photos.
//!
//! Photos are grouped in listing order; a group is closed as soon as the
//! next photo would push it over the budget. A photo larger than the budget
//! ends up alone in its own group instead of being dropped.

use crate::models::photo::Photo;

/// One chunk of photos destined for a single archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// 1-based, contiguous position among the groups of one run.
    pub ordinal: usize,
    pub photos: Vec<Photo>,
    /// Sum of the members' declared sizes.
    pub size_mb: f64,
}

impl Group {
    fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            photos: Vec::new(),
            size_mb: 0.0,
        }
    }

    fn push(&mut self, photo: Photo) {
        self.size_mb += photo.declared_size_mb();
        self.photos.push(photo);
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn photo_ids(&self) -> Vec<String> {
        self.photos.iter().map(|p| p.id.clone()).collect()
    }
}

/// Split `photos` into groups whose declared size stays within `budget_mb`.
///
/// Input order is preserved within and across groups, so identical input
/// always yields identical groups and ordinals.
pub fn partition(photos: Vec<Photo>, budget_mb: f64) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut open = Group::new(1);

    for photo in photos {
        let size = photo.declared_size_mb();
        if !open.is_empty() && open.size_mb + size > budget_mb {
            let next = Group::new(open.ordinal + 1);
            groups.push(std::mem::replace(&mut open, next));
        }
        open.push(photo);
    }

    if !open.is_empty() {
        groups.push(open);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::photo;

    fn ids(groups: &[Group]) -> Vec<Vec<String>> {
        groups.iter().map(Group::photo_ids).collect()
    }

    #[test]
    fn splits_before_the_photo_that_would_overflow() {
        let photos = vec![
            photo("1", Some(1000.0)),
            photo("2", Some(1200.0)),
            photo("3", Some(100.0)),
        ];

        let groups = partition(photos, 2048.0);

        assert_eq!(ids(&groups), vec![vec!["1"], vec!["2", "3"]]);
        assert_eq!(groups[0].ordinal, 1);
        assert_eq!(groups[1].ordinal, 2);
        assert_eq!(groups[1].size_mb, 1300.0);
    }

    #[test]
    fn oversized_photo_becomes_its_own_group() {
        let groups = partition(vec![photo("big", Some(5000.0))], 2048.0);
        assert_eq!(ids(&groups), vec![vec!["big"]]);
        assert_eq!(groups[0].size_mb, 5000.0);

        let groups = partition(
            vec![
                photo("a", Some(10.0)),
                photo("big", Some(5000.0)),
                photo("b", Some(10.0)),
            ],
            2048.0,
        );
        assert_eq!(ids(&groups), vec![vec!["a"], vec!["big"], vec!["b"]]);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(partition(Vec::new(), 2048.0).is_empty());
    }

    #[test]
    fn unknown_and_zero_sizes_never_split_but_still_occupy_a_slot() {
        let photos = vec![
            photo("a", Some(2048.0)),
            photo("b", None),
            photo("c", Some(0.0)),
            photo("d", Some(-3.0)),
            photo("e", Some(f64::NAN)),
        ];

        let groups = partition(photos, 2048.0);

        assert_eq!(ids(&groups), vec![vec!["a", "b", "c", "d", "e"]]);
        assert_eq!(groups[0].len(), 5);
    }

    #[test]
    fn groups_concatenate_back_to_the_input_and_respect_the_budget() {
        let sizes = [
            300.0, 900.0, 50.0, 2047.0, 1.0, 0.0, 4096.0, 700.0, 700.0, 700.0, 12.5, 2048.0,
        ];
        let photos: Vec<Photo> = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| photo(&format!("p{}", i), Some(*s)))
            .collect();
        let input_ids: Vec<String> = photos.iter().map(|p| p.id.clone()).collect();

        let groups = partition(photos, 2048.0);

        let flattened: Vec<String> = groups.iter().flat_map(Group::photo_ids).collect();
        assert_eq!(flattened, input_ids);
        for (i, group) in groups.iter().enumerate() {
            assert_eq!(group.ordinal, i + 1);
            assert!(!group.is_empty());
            assert!(group.size_mb <= 2048.0 || group.len() == 1);
        }
    }

    #[test]
    fn same_input_gives_same_grouping() {
        let make = || {
            (0..20)
                .map(|i| photo(&i.to_string(), Some(((i * 37) % 500) as f64)))
                .collect::<Vec<_>>()
        };
        assert_eq!(partition(make(), 1000.0), partition(make(), 1000.0));
    }
}
