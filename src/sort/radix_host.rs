use std::time::Instant;

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    sort::{
        DepthKeys,
        DepthSorter,
        KEYS_PER_BLOCK,
        RADIX_BITS,
        RADIX_PASSES,
        RADIX_SIZE,
        SortedIndices,
        key_to_sortable_bits,
        num_blocks,
        padded_size,
        result_buffer,
        depth::SENTINEL_KEY,
    },
};


/// the gpu radix sort's histogram, prefix and scatter stages run on the host
///
/// buffers are sized once for a padded capacity and reused until the live
/// count changes its padded size, mirroring the gpu session lifecycle.
#[derive(Clone, Debug, Default)]
pub struct HostRadixSorter {
    capacity: usize,
    keys: [Vec<u32>; 2],
    payloads: [Vec<u32>; 2],
    histograms: Vec<u32>,
}

impl HostRadixSorter {
    pub fn new(count: usize) -> Self {
        let capacity = padded_size(count);
        let blocks = num_blocks(capacity);

        Self {
            capacity,
            keys: [vec![0; capacity], vec![0; capacity]],
            payloads: [vec![0; capacity], vec![0; capacity]],
            histograms: vec![0; RADIX_PASSES * blocks * RADIX_SIZE],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(block, digit)` counts for one pass, scatter offsets once prefixed
    pub fn histogram(&self, pass: usize) -> &[u32] {
        let stride = num_blocks(self.capacity) * RADIX_SIZE;
        &self.histograms[pass * stride..(pass + 1) * stride]
    }

    /// sorts `keys` with an identity payload, failing when they exceed the session capacity
    pub fn sort_keys(&mut self, keys: &[f32]) -> SplatResult<SortedIndices> {
        let padded = padded_size(keys.len());
        if padded > self.capacity {
            return Err(SplatError::SortCapacity {
                requested: keys.len(),
                capacity: self.capacity,
            });
        }

        let blocks = num_blocks(padded);

        for (idx, key) in self.keys[0][..padded].iter_mut().enumerate() {
            *key = key_to_sortable_bits(keys.get(idx).copied().unwrap_or(SENTINEL_KEY));
        }
        for (idx, payload) in self.payloads[0][..padded].iter_mut().enumerate() {
            *payload = idx as u32;
        }
        self.histograms.fill(0);

        for pass in 0..RADIX_PASSES {
            self.histogram_pass(pass, padded, blocks);
            self.prefix_pass(pass, blocks);
            self.scatter_pass(pass, padded, blocks);
        }

        let result = result_buffer(RADIX_PASSES);

        Ok(SortedIndices {
            indices: self.payloads[result][..padded].to_vec(),
            instance_count: keys.len() as u32,
        })
    }

    fn histogram_range(&self, pass: usize, blocks: usize) -> std::ops::Range<usize> {
        let start = pass * num_blocks(self.capacity) * RADIX_SIZE;
        start..start + blocks * RADIX_SIZE
    }

    fn histogram_pass(&mut self, pass: usize, padded: usize, blocks: usize) {
        let shift = pass as u32 * RADIX_BITS;
        let range = self.histogram_range(pass, blocks);
        let histogram = &mut self.histograms[range];
        let keys = &self.keys[pass % 2][..padded];

        for (block, chunk) in keys.chunks(KEYS_PER_BLOCK).enumerate() {
            let counts = &mut histogram[block * RADIX_SIZE..(block + 1) * RADIX_SIZE];
            for &key in chunk {
                counts[digit(key, shift)] += 1;
            }
        }
    }

    fn prefix_pass(&mut self, pass: usize, blocks: usize) {
        let range = self.histogram_range(pass, blocks);
        let histogram = &mut self.histograms[range];

        let mut totals = [0u32; RADIX_SIZE];
        for (digit, total) in totals.iter_mut().enumerate() {
            for block in 0..blocks {
                let count = &mut histogram[block * RADIX_SIZE + digit];
                let offset = *total;
                *total += *count;
                *count = offset;
            }
        }

        let mut base = 0;
        for (digit, total) in totals.iter().enumerate() {
            for block in 0..blocks {
                histogram[block * RADIX_SIZE + digit] += base;
            }
            base += total;
        }
    }

    fn scatter_pass(&mut self, pass: usize, padded: usize, blocks: usize) {
        let shift = pass as u32 * RADIX_BITS;
        let range = self.histogram_range(pass, blocks);

        let (src, dst) = (pass % 2, (pass + 1) % 2);
        let [keys_a, keys_b] = &mut self.keys;
        let [payloads_a, payloads_b] = &mut self.payloads;
        let (keys_in, keys_out) = if src == 0 { (&*keys_a, keys_b) } else { (&*keys_b, keys_a) };
        let (payloads_in, payloads_out) = if src == 0 { (&*payloads_a, payloads_b) } else { (&*payloads_b, payloads_a) };
        debug_assert_ne!(src, dst);

        let offsets = &mut self.histograms[range];
        for idx in 0..padded {
            let block = idx / KEYS_PER_BLOCK;
            let key = keys_in[idx];

            let offset = &mut offsets[block * RADIX_SIZE + digit(key, shift)];
            let slot = *offset as usize;
            *offset += 1;

            keys_out[slot] = key;
            payloads_out[slot] = payloads_in[idx];
        }
    }
}

impl DepthSorter for HostRadixSorter {
    fn sort(&mut self, keys: &DepthKeys) -> SplatResult<SortedIndices> {
        let sort_start_time = Instant::now();

        if keys.padded_size() != self.capacity {
            tracing::debug!(
                "resizing host radix session from {} to {} keys",
                self.capacity,
                keys.padded_size(),
            );
            *self = Self::new(keys.len());
        }

        let sorted = self.sort_keys(keys.keys())?;

        tracing::debug!("host radix sort of {} keys took {:?}", keys.len(), sort_start_time.elapsed());

        Ok(sorted)
    }
}


fn digit(key: u32, shift: u32) -> usize {
    ((key >> shift) as usize) & (RADIX_SIZE - 1)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_end_at_padded_size() {
        let mut sorter = HostRadixSorter::new(4);
        sorter.sort_keys(&[1.0, 2.0, 3.0, 4.0]).unwrap();

        // after scatter every offset has advanced to its digit's end
        let offsets = sorter.histogram(0);
        assert_eq!(offsets.len(), RADIX_SIZE);
        assert_eq!(*offsets.iter().max().unwrap() as usize, KEYS_PER_BLOCK);
    }

    #[test]
    fn test_multi_block_stable() {
        let keys = (0..3000).map(|idx| (idx % 7) as f32).collect::<Vec<_>>();
        let mut sorter = HostRadixSorter::new(keys.len());
        let sorted = sorter.sort_keys(&keys).unwrap();

        assert_eq!(sorted.padded_size(), 3 * KEYS_PER_BLOCK);
        assert!(sorted.valid().windows(2).all(|pair| {
            let (a, b) = (keys[pair[0] as usize], keys[pair[1] as usize]);
            a < b || (a == b && pair[0] < pair[1])
        }));
        assert!(sorted.indices[3000..].iter().all(|&idx| idx >= 3000));
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut sorter = HostRadixSorter::new(10);
        let keys = vec![0.0; KEYS_PER_BLOCK + 1];

        assert!(matches!(
            sorter.sort_keys(&keys),
            Err(SplatError::SortCapacity { requested, capacity: KEYS_PER_BLOCK }) if requested == KEYS_PER_BLOCK + 1,
        ));
    }
}
