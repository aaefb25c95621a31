use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    camera::Camera,
    gaussian::cloud::PointCloud,
    sort::padded_size,
};


/// padding key, sorts after every finite depth
pub const SENTINEL_KEY: f32 = f32::INFINITY;


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum DepthOrder {
    /// key is view depth, nearest first
    #[default]
    FrontToBack,

    /// key is negated view depth, farthest first (painter's order)
    BackToFront,
}

impl DepthOrder {
    pub fn key_sign(&self) -> f32 {
        match self {
            DepthOrder::FrontToBack => 1.0,
            DepthOrder::BackToFront => -1.0,
        }
    }
}


/// per-frame sort keys, one per live point; payload is implicitly `0..len`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DepthKeys {
    keys: Vec<f32>,
}

impl DepthKeys {
    pub fn extract<C: Camera + ?Sized>(
        camera: &C,
        cloud: &PointCloud,
        order: DepthOrder,
    ) -> Self {
        let view = camera.view_matrix();
        let sign = order.key_sign();

        let keys = cloud
            .positions()
            .map(|position| sanitize_key(-view.transform_point3(position).z * sign))
            .collect();

        Self { keys }
    }

    /// NaN keys are replaced like extracted ones
    pub fn from_keys(mut keys: Vec<f32>) -> Self {
        keys.iter_mut().for_each(|key| *key = sanitize_key(*key));
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[f32] {
        &self.keys
    }

    pub fn padded_size(&self) -> usize {
        padded_size(self.keys.len())
    }

    pub fn padded_keys(&self) -> Vec<f32> {
        let mut padded = Vec::with_capacity(self.padded_size());
        padded.extend_from_slice(&self.keys);
        padded.resize(self.padded_size(), SENTINEL_KEY);
        padded
    }

    /// identity payload over the padded range
    pub fn payload(&self) -> Vec<u32> {
        (0..self.padded_size() as u32).collect()
    }
}

/// NaN lands after every finite key but ahead of the padding
fn sanitize_key(key: f32) -> f32 {
    if key.is_nan() {
        f32::MAX
    } else {
        key
    }
}
