//! Peak segmentation.
//!
//! Each peak claims the buckets reachable from its location by walking
//! outward while counts do not increase. Peaks are processed in ascending
//! location order and a bucket already claimed stops the walk, so the
//! earlier peak wins any contested bucket and every member range stays
//! contiguous. Whatever no peak claims is background.

use crate::models::Bucket;

/// Bucket ownership produced by [`segment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    /// Member indices per peak, ascending, in the order peaks were given.
    pub members: Vec<Vec<usize>>,
    /// Unclaimed indices, ascending.
    pub background: Vec<usize>,
}

/// Assign buckets of `counts` to the peaks at `locations`.
///
/// `locations` are processed in ascending order; the returned `members`
/// line up with `locations` as given.
pub fn segment(counts: &[u32], locations: &[usize]) -> Segmentation {
    let n = counts.len();
    let mut owner: Vec<Option<usize>> = vec![None; n];

    let mut order: Vec<usize> = (0..locations.len()).collect();
    order.sort_by_key(|&k| locations[k]);

    for k in order {
        let loc = locations[k];
        if loc >= n || owner[loc].is_some() {
            continue;
        }
        owner[loc] = Some(k);

        let mut i = loc;
        while i > 0 && owner[i - 1].is_none() && counts[i - 1] <= counts[i] {
            i -= 1;
            owner[i] = Some(k);
        }

        let mut j = loc;
        while j + 1 < n && owner[j + 1].is_none() && counts[j + 1] <= counts[j] {
            j += 1;
            owner[j] = Some(k);
        }
    }

    let mut members = vec![Vec::new(); locations.len()];
    let mut background = Vec::new();
    for (index, o) in owner.into_iter().enumerate() {
        match o {
            Some(k) => members[k].push(index),
            None => background.push(index),
        }
    }

    Segmentation {
        members,
        background,
    }
}

/// Texts of `members`, concatenated in ascending bucket order.
pub fn aggregate_texts(buckets: &[Bucket], members: &[usize]) -> Vec<String> {
    members
        .iter()
        .filter_map(|&i| buckets.get(i))
        .flat_map(|b| b.texts.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn assert_partition(n: usize, seg: &Segmentation) {
        let mut seen = vec![0u32; n];
        for m in &seg.members {
            for &i in m {
                seen[i] += 1;
            }
        }
        for &i in &seg.background {
            seen[i] += 1;
        }
        assert!(seen.iter().all(|&c| c == 1), "not a partition: {:?}", seen);
    }

    #[test]
    fn test_expands_while_non_increasing() {
        let counts = [0, 1, 3, 7, 4, 4, 2, 5, 1];
        let seg = segment(&counts, &[3]);
        assert_eq!(seg.members, vec![vec![0, 1, 2, 3, 4, 5, 6]]);
        assert_eq!(seg.background, vec![7, 8]);
        assert_partition(counts.len(), &seg);
    }

    #[test]
    fn test_earlier_peak_claims_shared_slope() {
        let counts = [2, 1, 0, 0, 2];
        let seg = segment(&counts, &[0, 4]);
        assert_eq!(seg.members, vec![vec![0, 1, 2, 3], vec![4]]);
        assert!(seg.background.is_empty());
        assert_partition(counts.len(), &seg);
    }

    #[test]
    fn test_two_spikes_with_background() {
        let counts = [0, 0, 5, 0, 0, 8, 1, 0];
        let seg = segment(&counts, &[2, 5]);
        assert_eq!(seg.members, vec![vec![0, 1, 2, 3, 4], vec![5, 6, 7]]);
        assert!(seg.background.is_empty());

        let counts = [5, 1, 9, 2, 6, 8, 1];
        let seg = segment(&counts, &[2, 5]);
        assert_eq!(seg.members, vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(seg.background, vec![0]);
        assert_partition(counts.len(), &seg);
    }

    #[test]
    fn test_members_follow_input_order() {
        let counts = [0, 5, 0, 9, 0];
        let seg = segment(&counts, &[3, 1]);
        assert_eq!(seg.members, vec![vec![3, 4], vec![0, 1, 2]]);
    }

    #[test]
    fn test_no_peaks_is_all_background() {
        let seg = segment(&[1, 2, 3], &[]);
        assert!(seg.members.is_empty());
        assert_eq!(seg.background, vec![0, 1, 2]);
    }

    #[test]
    fn test_aggregate_texts_in_index_order() {
        let now = Utc::now();
        let buckets: Vec<Bucket> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(index, t)| Bucket {
                index,
                start: now,
                count: 1,
                texts: vec![t.to_string(), format!("{}2", t)],
            })
            .collect();
        assert_eq!(
            aggregate_texts(&buckets, &[0, 2]),
            vec!["a", "a2", "c", "c2"]
        );
    }
}
