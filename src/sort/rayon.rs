use std::time::Instant;

use rayon::prelude::*;

use crate::{
    error::SplatResult,
    sort::{
        DepthKeys,
        DepthSorter,
        SortedIndices,
    },
};


#[derive(Clone, Copy, Debug, Default)]
pub struct RayonSort;

impl DepthSorter for RayonSort {
    fn sort(&mut self, keys: &DepthKeys) -> SplatResult<SortedIndices> {
        let sort_start_time = Instant::now();

        let padded = keys.padded_keys();
        let mut indices = keys.payload();

        // par_sort_by is stable, ties keep payload order
        indices.par_sort_by(|&a, &b| padded[a as usize].total_cmp(&padded[b as usize]));

        tracing::debug!("rayon sort of {} keys took {:?}", keys.len(), sort_start_time.elapsed());

        Ok(SortedIndices {
            indices,
            instance_count: keys.len() as u32,
        })
    }
}
