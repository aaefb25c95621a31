pub use camera::{
    Camera,
    PerspectiveCamera,
};
pub use error::{
    SplatError,
    SplatResult,
};
pub use gaussian::{
    cloud::PointCloud,
    packed::{
        Gaussian,
        GaussianCompressed,
    },
    settings::CloudSettings,
};
pub use io::{
    DecodeSettings,
    decode,
    decode_with,
    loader::load_file,
};
pub use material::spherical_harmonics::ShCoefficients;
pub use profile::FrameProfiler;
pub use render::{
    GpuPointCloud,
    SortManager,
};
pub use sort::{
    DepthKeys,
    DepthOrder,
    DepthSorter,
    SortMode,
    SortedIndices,
};

pub mod camera;
pub mod error;
pub mod gaussian;
pub mod io;
pub mod material;
pub mod math;
pub mod profile;
pub mod render;
pub mod sort;

#[cfg(feature = "tooling")]
pub mod utils;
