use std::marker::Copy;

use bytemuck::{
    Pod,
    Zeroable,
};
use glam::Vec3;
use half::f16;
use serde::{
    Deserialize,
    Serialize,
};

use crate::gaussian::f16::{
    pack_halves_to_words,
    unpack_words_to_halves,
};


pub const GAUSSIAN_WORDS: usize = 5;
pub const GAUSSIAN_COMPRESSED_WORDS: usize = 4;


/// half-precision splat, packed two halves per word
#[derive(
    Clone,
    Debug,
    Default,
    Copy,
    PartialEq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct Gaussian {
    pub xyz: [f16; 3],
    pub opacity: f16,
    pub cov: [f16; 6],
}

impl Gaussian {
    pub fn new(position: Vec3, opacity: f32, cov: [f32; 6]) -> Self {
        Self {
            xyz: position.to_array().map(f16::from_f32),
            opacity: f16::from_f32(opacity),
            cov: cov.map(f16::from_f32),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.xyz.map(f16::to_f32))
    }

    pub fn opacity(&self) -> f32 {
        self.opacity.to_f32()
    }

    pub fn covariance(&self) -> [f32; 6] {
        self.cov.map(f16::to_f32)
    }

    fn halves(&self) -> [f16; 2 * GAUSSIAN_WORDS] {
        [
            self.xyz[0],
            self.xyz[1],
            self.xyz[2],
            self.opacity,
            self.cov[0],
            self.cov[1],
            self.cov[2],
            self.cov[3],
            self.cov[4],
            self.cov[5],
        ]
    }

    pub fn to_words(&self) -> [u32; GAUSSIAN_WORDS] {
        let mut words = [0; GAUSSIAN_WORDS];
        words.copy_from_slice(&pack_halves_to_words(&self.halves()));
        words
    }

    pub fn from_words(words: [u32; GAUSSIAN_WORDS]) -> Self {
        let h = unpack_words_to_halves(&words);

        Self {
            xyz: [h[0], h[1], h[2]],
            opacity: h[3],
            cov: [h[4], h[5], h[6], h[7], h[8], h[9]],
        }
    }
}


/// quantized splat that references shared covariance and sh tables
#[derive(
    Clone,
    Debug,
    Default,
    Copy,
    PartialEq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct GaussianCompressed {
    pub xyz: [f16; 3],
    pub opacity: i8,
    pub scale_factor: i8,
    pub geometry_idx: u32,
    pub sh_idx: u32,
}

impl GaussianCompressed {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.xyz.map(f16::to_f32))
    }
}


#[derive(
    Clone,
    Debug,
    Default,
    Copy,
    PartialEq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct Covariance3d {
    pub cov: [f16; 6],
}

impl From<[f32; 6]> for Covariance3d {
    fn from(cov: [f32; 6]) -> Self {
        Self {
            cov: cov.map(f16::from_f32),
        }
    }
}


static_assertions::const_assert_eq!(std::mem::size_of::<Gaussian>(), GAUSSIAN_WORDS * 4);
static_assertions::const_assert_eq!(std::mem::size_of::<GaussianCompressed>(), GAUSSIAN_COMPRESSED_WORDS * 4);
static_assertions::const_assert_eq!(std::mem::size_of::<Covariance3d>(), 12);


#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-3 * b.abs().max(1.0)
    }

    #[test]
    fn test_known_gaussian_survives_packing() {
        let gaussian = Gaussian::new(
            Vec3::new(1.0, 2.0, 3.0),
            0.5,
            [1.0, 0.0, 0.0, 1.0, 0.0, 1.0],
        );

        let unpacked = Gaussian::from_words(gaussian.to_words());
        let position = unpacked.position();

        assert!(close(position.x, 1.0));
        assert!(close(position.y, 2.0));
        assert!(close(position.z, 3.0));
        assert!(close(unpacked.opacity(), 0.5));

        for (a, b) in unpacked.covariance().iter().zip([1.0, 0.0, 0.0, 1.0, 0.0, 1.0]) {
            assert!(close(*a, b));
        }
    }

    #[test]
    fn test_words_match_memory_layout() {
        let gaussian = Gaussian::new(Vec3::new(-4.0, 0.25, 7.5), 0.9, [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let words: Vec<u32> = bytemuck::bytes_of(&gaussian)
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        if cfg!(target_endian = "little") {
            assert_eq!(words.as_slice(), gaussian.to_words().as_slice());
        }
    }

    #[test]
    fn test_compressed_field_offsets() {
        let compressed = GaussianCompressed {
            xyz: [f16::ONE; 3],
            opacity: -3,
            scale_factor: 7,
            geometry_idx: 11,
            sh_idx: 13,
        };

        let bytes = bytemuck::bytes_of(&compressed);
        assert_eq!(bytes[6] as i8, -3);
        assert_eq!(bytes[7] as i8, 7);
        assert_eq!(u32::from_ne_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 11);
        assert_eq!(u32::from_ne_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), 13);
    }
}
