use serde::{
    Deserialize,
    Serialize,
};
use static_assertions::assert_cfg;

use crate::{
    error::SplatResult,
    math::round_up,
};

pub mod depth;
pub mod radix_host;

#[cfg(feature = "sort_radix")]
pub mod radix;

#[cfg(feature = "sort_rayon")]
pub mod rayon;

#[cfg(feature = "sort_std")]
pub mod std_sort;

pub use depth::{
    DepthKeys,
    DepthOrder,
};


assert_cfg!(
    any(
        feature = "sort_radix",
        feature = "sort_rayon",
        feature = "sort_std",
    ),
    "no sort mode enabled",
);


pub const RADIX_BITS: u32 = 8;
pub const RADIX_SIZE: usize = 1 << RADIX_BITS;
pub const KEY_BITS: u32 = 32;
pub const RADIX_PASSES: usize = (KEY_BITS / RADIX_BITS) as usize;

pub const WORKGROUP_SIZE: usize = 256;
pub const BLOCK_ROWS: usize = 4;
pub const KEYS_PER_BLOCK: usize = WORKGROUP_SIZE * BLOCK_ROWS;


/// live element count rounded up to whole sort blocks, at least one block
pub fn padded_size(count: usize) -> usize {
    round_up(count.max(1), KEYS_PER_BLOCK)
}

pub fn num_blocks(padded_size: usize) -> usize {
    padded_size.div_ceil(KEYS_PER_BLOCK)
}

/// maps a float key onto a u32 whose unsigned order is `f32::total_cmp`
pub fn key_to_sortable_bits(key: f32) -> u32 {
    let bits = key.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// index of the ping-pong buffer holding the result after `passes` scatters
pub fn result_buffer(passes: usize) -> usize {
    passes % 2
}


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum SortMode {
    None,

    #[cfg(feature = "sort_radix")]
    Radix,

    RadixHost,

    #[cfg(feature = "sort_rayon")]
    Rayon,

    #[cfg(feature = "sort_std")]
    Std,
}

impl Default for SortMode {
    #[allow(unreachable_code)]
    fn default() -> Self {
        #[cfg(feature = "sort_radix")]
        return Self::Radix;

        #[cfg(feature = "sort_rayon")]
        return Self::Rayon;

        #[cfg(feature = "sort_std")]
        return Self::Std;

        Self::RadixHost
    }
}

impl std::str::FromStr for SortMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(raw))
            .ok_or_else(|| {
                let names = Self::all().iter().map(|mode| mode.name()).collect::<Vec<_>>();
                format!("unknown sort mode `{raw}`, expected one of {}", names.join(", "))
            })
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SortMode {
    /// every mode compiled into this build
    pub fn all() -> &'static [SortMode] {
        &[
            Self::None,

            #[cfg(feature = "sort_radix")]
            Self::Radix,

            Self::RadixHost,

            #[cfg(feature = "sort_rayon")]
            Self::Rayon,

            #[cfg(feature = "sort_std")]
            Self::Std,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",

            #[cfg(feature = "sort_radix")]
            Self::Radix => "radix",

            Self::RadixHost => "radix-host",

            #[cfg(feature = "sort_rayon")]
            Self::Rayon => "rayon",

            #[cfg(feature = "sort_std")]
            Self::Std => "std",
        }
    }

    pub fn is_gpu(&self) -> bool {
        #[cfg(feature = "sort_radix")]
        if *self == Self::Radix {
            return true;
        }

        false
    }
}


/// sorter output: a permutation of padded length, valid in `[0, instance_count)`
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
)]
pub struct SortedIndices {
    pub indices: Vec<u32>,
    pub instance_count: u32,
}

impl SortedIndices {
    /// unsorted fallback, `index[i] = i`
    pub fn identity(count: usize) -> Self {
        let padded = padded_size(count);

        Self {
            indices: (0..padded as u32).collect(),
            instance_count: count as u32,
        }
    }

    pub fn valid(&self) -> &[u32] {
        &self.indices[..self.instance_count as usize]
    }

    pub fn padded_size(&self) -> usize {
        self.indices.len()
    }
}


pub trait DepthSorter {
    fn sort(&mut self, keys: &DepthKeys) -> SplatResult<SortedIndices>;
}


/// host side sorter for `mode`, `None` for gpu and disabled modes
pub fn cpu_sorter(mode: SortMode) -> Option<Box<dyn DepthSorter>> {
    match mode {
        SortMode::RadixHost => Some(Box::new(radix_host::HostRadixSorter::default())),

        #[cfg(feature = "sort_rayon")]
        SortMode::Rayon => Some(Box::new(rayon::RayonSort)),

        #[cfg(feature = "sort_std")]
        SortMode::Std => Some(Box::new(std_sort::StdSort)),

        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_size() {
        assert_eq!(padded_size(0), KEYS_PER_BLOCK);
        assert_eq!(padded_size(1), KEYS_PER_BLOCK);
        assert_eq!(padded_size(KEYS_PER_BLOCK), KEYS_PER_BLOCK);
        assert_eq!(padded_size(KEYS_PER_BLOCK + 1), 2 * KEYS_PER_BLOCK);
        assert_eq!(num_blocks(padded_size(3000)), 3);
    }

    #[test]
    fn test_sortable_bits_follow_total_order() {
        let mut keys = vec![
            f32::INFINITY,
            1.0,
            -0.0,
            0.0,
            -1.0,
            f32::NEG_INFINITY,
            f32::MIN_POSITIVE,
            -0.5,
            f32::MAX,
            f32::NAN,
        ];

        let mut by_bits = keys.clone();
        by_bits.sort_by_key(|&key| key_to_sortable_bits(key));
        keys.sort_by(f32::total_cmp);

        let bits = |values: &[f32]| values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&by_bits), bits(&keys));
    }

    #[test]
    fn test_result_buffer_parity() {
        assert_eq!(result_buffer(RADIX_PASSES), 0);
        assert_eq!(result_buffer(3), 1);
    }

    #[test]
    fn test_identity() {
        let identity = SortedIndices::identity(5);
        assert_eq!(identity.padded_size(), KEYS_PER_BLOCK);
        assert_eq!(identity.valid(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_sort_mode() {
        assert_eq!("radix-host".parse::<SortMode>(), Ok(SortMode::RadixHost));
        assert_eq!("NONE".parse::<SortMode>(), Ok(SortMode::None));
        assert!("bogo".parse::<SortMode>().is_err());

        for mode in SortMode::all() {
            assert_eq!(mode.to_string().parse::<SortMode>().as_ref(), Ok(mode));
        }
    }

    #[test]
    fn test_cpu_sorter_modes() {
        assert!(cpu_sorter(SortMode::None).is_none());
        assert!(cpu_sorter(SortMode::RadixHost).is_some());
    }
}
