use bytemuck::{
    Pod,
    Zeroable,
};
use serde::{
    Deserialize,
    Serialize,
};


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
pub struct Quantization {
    pub zero_point: i32,
    pub scale: f32,
    _pad: [u32; 2],
}

impl Default for Quantization {
    fn default() -> Self {
        Self::new(0, 1.0)
    }
}

impl Quantization {
    pub fn new(zero_point: i32, scale: f32) -> Self {
        Self {
            zero_point,
            scale,
            _pad: [0; 2],
        }
    }

    pub fn dequantize(&self, raw: i32) -> f32 {
        (raw - self.zero_point) as f32 * self.scale
    }
}


/// per-attribute-group dequantization parameters, uploaded as one uniform
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct GaussianQuantization {
    pub color_dc: Quantization,
    pub color_rest: Quantization,
    pub opacity: Quantization,
    pub scaling_factor: Quantization,
}


static_assertions::const_assert_eq!(std::mem::size_of::<Quantization>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<GaussianQuantization>(), 64);
