use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::{
        cloud::PointCloud,
        settings::CloudSettings,
    },
};

pub mod loader;

#[cfg(feature = "io_npz")]
pub mod npy;

#[cfg(feature = "io_npz")]
pub mod npz;

#[cfg(feature = "io_ply")]
pub mod ply;


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
)]
pub struct DecodeSettings {
    /// keep only the first `max_points` records
    pub max_points: Option<usize>,
}

impl From<&CloudSettings> for DecodeSettings {
    fn from(settings: &CloudSettings) -> Self {
        Self {
            max_points: settings.max_points,
        }
    }
}

impl DecodeSettings {
    pub fn cap(&self, count: usize) -> usize {
        self.max_points.map_or(count, |max| count.min(max))
    }
}


pub trait PointCloudReader {
    fn magic_bytes(&self) -> &'static [u8];
    fn file_ending(&self) -> &'static str;
    fn read(&self, data: &[u8], settings: &DecodeSettings) -> SplatResult<PointCloud>;
}


#[allow(clippy::vec_init_then_push)]
pub fn readers() -> Vec<Box<dyn PointCloudReader>> {
    let mut readers: Vec<Box<dyn PointCloudReader>> = Vec::new();

    #[cfg(feature = "io_ply")]
    readers.push(Box::new(ply::PlyReader));

    #[cfg(feature = "io_npz")]
    readers.push(Box::new(npz::NpzReader));

    readers
}

pub fn decode(data: &[u8]) -> SplatResult<PointCloud> {
    decode_with(data, &DecodeSettings::default())
}

/// selects a reader by sniffing the leading magic bytes
pub fn decode_with(data: &[u8], settings: &DecodeSettings) -> SplatResult<PointCloud> {
    let reader = readers()
        .into_iter()
        .find(|reader| data.starts_with(reader.magic_bytes()))
        .ok_or_else(|| {
            let head = &data[..data.len().min(4)];
            SplatError::format(format!("unrecognized magic bytes {head:02x?}"))
        })?;

    tracing::debug!("decoding {} bytes as .{}", data.len(), reader.file_ending());

    reader.read(data, settings)
}
