use clap::Parser;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::SplatResult,
    gaussian::settings::CloudSettings,
    sort::{
        DepthOrder,
        SortMode,
    },
};


#[derive(
    Debug,
    Default,
    Serialize,
    Deserialize,
    Parser,
)]
#[command(about = "inspect a gaussian splat file and time its depth sort", version, long_about = None)]
pub struct SplatInfoArgs {
    /// .ply or .npz file, a random cloud is generated when empty
    #[arg(default_value = "")]
    pub input_file: String,

    /// json file with `CloudSettings`, flags below override it
    #[arg(long)]
    pub settings: Option<String>,

    #[arg(long)]
    pub max_points: Option<usize>,

    #[arg(long)]
    pub sort_mode: Option<SortMode>,

    #[arg(long)]
    pub back_to_front: bool,

    #[arg(long)]
    pub near_cull: Option<f32>,

    #[arg(long, default_value = "100000")]
    pub gaussian_count: usize,

    #[arg(long, default_value = "3")]
    pub frames: usize,
}

impl SplatInfoArgs {
    pub fn cloud_settings(&self) -> SplatResult<CloudSettings> {
        let mut settings = match &self.settings {
            Some(path) => CloudSettings::from_json(&std::fs::read_to_string(path)?)?,
            None => CloudSettings::default(),
        };

        if self.max_points.is_some() {
            settings.max_points = self.max_points;
        }

        if let Some(sort_mode) = self.sort_mode {
            settings.sort_mode = sort_mode;
        }

        if self.back_to_front {
            settings.depth_order = DepthOrder::BackToFront;
        }

        if let Some(near_cull) = self.near_cull {
            settings.near_cull = near_cull;
        }

        Ok(settings)
    }
}


/// installs a fmt subscriber filtered by `RUST_LOG`, `info` when unset
pub fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_settings() {
        let args = SplatInfoArgs::parse_from([
            "splat_info",
            "scene.ply",
            "--max-points",
            "64",
            "--sort-mode",
            "radix-host",
            "--back-to-front",
        ]);
        let settings = args.cloud_settings().unwrap();

        assert_eq!(args.input_file, "scene.ply");
        assert_eq!(settings.max_points, Some(64));
        assert_eq!(settings.sort_mode, SortMode::RadixHost);
        assert_eq!(settings.depth_order, DepthOrder::BackToFront);
        assert_eq!(settings.near_cull, 0.0);
    }
}
