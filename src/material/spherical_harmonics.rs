use bytemuck::{
    Pod,
    Zeroable,
};
use half::f16;
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    SplatError,
    SplatResult,
};


const fn num_sh_coefficients(degree: usize) -> usize {
    if degree == 0 {
        1
    } else {
        2 * degree + 1 + num_sh_coefficients(degree - 1)
    }
}

pub const MAX_SH_DEGREE: usize = 3;
pub const SH_CHANNELS: usize = 3;
pub const SH_COEFF_COUNT_PER_CHANNEL: usize = num_sh_coefficients(MAX_SH_DEGREE);

static_assertions::const_assert_eq!(SH_COEFF_COUNT_PER_CHANNEL, 16);


pub const fn sh_num_coefficients(degree: usize) -> usize {
    (degree + 1) * (degree + 1)
}

/// degree for a per-channel coefficient count (dc included)
pub fn sh_degree_from_coefficients(num_coefficients: usize) -> SplatResult<usize> {
    (0..=MAX_SH_DEGREE)
        .find(|&degree| sh_num_coefficients(degree) == num_coefficients)
        .ok_or(SplatError::DegreeMismatch { num_coefficients })
}

/// degree implied by a count of `f_rest_*` scalars (three channels, dc excluded)
pub fn sh_degree_from_rest_scalars(num_rest: usize) -> SplatResult<usize> {
    if num_rest % SH_CHANNELS != 0 {
        return Err(SplatError::DegreeMismatch {
            num_coefficients: num_rest / SH_CHANNELS + 1,
        });
    }

    sh_degree_from_coefficients(num_rest / SH_CHANNELS + 1)
}


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct ShCoefficients {
    pub coefficients: [[f16; SH_CHANNELS]; SH_COEFF_COUNT_PER_CHANNEL],
}

impl Default for ShCoefficients {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl ShCoefficients {
    /// packs dc plus channel-major rest terms (`rest[c * (n - 1) + i]`) coefficient-major
    pub fn from_channel_major(
        dc: [f32; SH_CHANNELS],
        rest: &[f32],
        degree: usize,
    ) -> Self {
        let num_rest = sh_num_coefficients(degree) - 1;
        let mut sh = Self::default();

        sh.coefficients[0] = dc.map(f16::from_f32);

        for i in 0..num_rest {
            for c in 0..SH_CHANNELS {
                let value = rest.get(c * num_rest + i).copied().unwrap_or_default();
                sh.coefficients[i + 1][c] = f16::from_f32(value);
            }
        }

        sh
    }

    /// packs coefficient-major rest terms (`rest[i * 3 + c]`)
    pub fn from_coefficient_major(
        dc: [f32; SH_CHANNELS],
        rest: &[f32],
    ) -> Self {
        let mut sh = Self::default();
        sh.coefficients[0] = dc.map(f16::from_f32);

        for (i, triplet) in rest.chunks_exact(SH_CHANNELS).take(SH_COEFF_COUNT_PER_CHANNEL - 1).enumerate() {
            for c in 0..SH_CHANNELS {
                sh.coefficients[i + 1][c] = f16::from_f32(triplet[c]);
            }
        }

        sh
    }

    pub fn coefficient(&self, index: usize) -> [f32; SH_CHANNELS] {
        self.coefficients[index].map(f16::to_f32)
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct ShCoefficientsCompressed {
    pub coefficients: [[i8; SH_CHANNELS]; SH_COEFF_COUNT_PER_CHANNEL],
}

impl ShCoefficientsCompressed {
    /// raw quantized dc plus coefficient-major rest terms
    pub fn from_quantized(
        dc: [i8; SH_CHANNELS],
        rest: &[i8],
    ) -> Self {
        let mut sh = Self::default();
        sh.coefficients[0] = dc;

        for (i, triplet) in rest.chunks_exact(SH_CHANNELS).take(SH_COEFF_COUNT_PER_CHANNEL - 1).enumerate() {
            sh.coefficients[i + 1].copy_from_slice(triplet);
        }

        sh
    }
}


static_assertions::const_assert_eq!(std::mem::size_of::<ShCoefficients>(), 96);
static_assertions::const_assert_eq!(std::mem::size_of::<ShCoefficientsCompressed>(), 48);


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_from_coefficients() {
        assert_eq!(sh_degree_from_coefficients(1).unwrap(), 0);
        assert_eq!(sh_degree_from_coefficients(4).unwrap(), 1);
        assert_eq!(sh_degree_from_coefficients(9).unwrap(), 2);
        assert_eq!(sh_degree_from_coefficients(16).unwrap(), 3);

        assert!(matches!(
            sh_degree_from_coefficients(5),
            Err(SplatError::DegreeMismatch { num_coefficients: 5 }),
        ));
        assert!(sh_degree_from_coefficients(25).is_err());
    }

    #[test]
    fn test_degree_from_rest_scalars() {
        assert_eq!(sh_degree_from_rest_scalars(0).unwrap(), 0);
        assert_eq!(sh_degree_from_rest_scalars(45).unwrap(), 3);
        assert!(sh_degree_from_rest_scalars(44).is_err());
        assert!(sh_degree_from_rest_scalars(12).is_err());
    }

    #[test]
    fn test_channel_major_reorder() {
        // degree 1: three rest coefficients per channel, laid out r r r g g g b b b
        let rest = [1.0, 2.0, 3.0, 10.0, 20.0, 30.0, 100.0, 200.0, 300.0];
        let sh = ShCoefficients::from_channel_major([0.5, 0.25, 0.125], &rest, 1);

        assert_eq!(sh.coefficient(0), [0.5, 0.25, 0.125]);
        assert_eq!(sh.coefficient(1), [1.0, 10.0, 100.0]);
        assert_eq!(sh.coefficient(2), [2.0, 20.0, 200.0]);
        assert_eq!(sh.coefficient(3), [3.0, 30.0, 300.0]);
        assert_eq!(sh.coefficient(4), [0.0, 0.0, 0.0]);
    }
}
