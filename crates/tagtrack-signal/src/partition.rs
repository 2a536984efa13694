//! Splitting a mixed observation set into per-tag series.

use std::collections::{BTreeMap, BTreeSet};

use tagtrack_core::{Observation, ObservationSeries, Result, TagId};

/// Tags present in an observation set, in ascending order
pub fn distinct_tags(observations: &[Observation]) -> BTreeSet<TagId> {
    observations.iter().map(|o| o.tag_id).collect()
}

/// One time-ordered series per requested tag.
///
/// Grouping is exact equality on the tag id. Observations of tags outside
/// `tags` are ignored, and requested tags without observations produce no
/// series. Output is in ascending tag order.
pub fn partition(
    observations: &[Observation],
    tags: &BTreeSet<TagId>,
) -> Result<Vec<ObservationSeries>> {
    let mut groups: BTreeMap<TagId, Vec<Observation>> = BTreeMap::new();

    for observation in observations.iter().filter(|o| tags.contains(&o.tag_id)) {
        groups.entry(observation.tag_id).or_default().push(*observation);
    }

    groups
        .into_iter()
        .map(|(tag_id, group)| ObservationSeries::from_unsorted(tag_id, group))
        .collect()
}

/// Partition every tag present in the set
pub fn partition_all(observations: &[Observation]) -> Result<Vec<ObservationSeries>> {
    partition(observations, &distinct_tags(observations))
}
