use std::time::Instant;

use crate::{
    error::SplatResult,
    sort::{
        DepthKeys,
        DepthSorter,
        SortedIndices,
    },
};


/// stable comparison sort over the padded keys
#[derive(Clone, Copy, Debug, Default)]
pub struct StdSort;

impl DepthSorter for StdSort {
    fn sort(&mut self, keys: &DepthKeys) -> SplatResult<SortedIndices> {
        let sort_start_time = Instant::now();

        let padded = keys.padded_keys();
        let mut indices = keys.payload();
        indices.sort_by(|&a, &b| padded[a as usize].total_cmp(&padded[b as usize]));

        tracing::debug!("std sort of {} keys took {:?}", keys.len(), sort_start_time.elapsed());

        Ok(SortedIndices {
            indices,
            instance_count: keys.len() as u32,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std_sort_stable_duplicates() {
        let keys = DepthKeys::from_keys(vec![2.0, 1.0, 2.0, 1.0]);
        let sorted = StdSort.sort(&keys).unwrap();

        assert_eq!(sorted.valid(), &[1, 3, 0, 2]);
        assert_eq!(sorted.indices[4], 4);
    }
}
