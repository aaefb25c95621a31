use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    sort::{
        DepthOrder,
        SortMode,
    },
};


#[derive(
    Clone,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[serde(default)]
pub struct CloudSettings {
    /// decode at most this many points
    pub max_points: Option<usize>,
    pub sort_mode: SortMode,
    pub depth_order: DepthOrder,
    /// gpu key extraction drops points closer than this
    pub near_cull: f32,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            max_points: None,
            sort_mode: SortMode::default(),
            depth_order: DepthOrder::default(),
            near_cull: 0.0,
        }
    }
}

impl CloudSettings {
    pub fn from_json(json: &str) -> SplatResult<Self> {
        serde_json::from_str(json)
            .map_err(|err| SplatError::format(format!("invalid settings: {err}")))
    }
}
