use std::path::Path;

use crate::{
    error::SplatResult,
    gaussian::cloud::PointCloud,
    io::{
        DecodeSettings,
        decode_with,
        readers,
    },
};


pub fn extensions() -> Vec<&'static str> {
    readers()
        .iter()
        .map(|reader| reader.file_ending())
        .collect()
}

/// reads and decodes a point cloud file, format chosen by magic bytes
pub fn load_file(
    path: impl AsRef<Path>,
    settings: &DecodeSettings,
) -> SplatResult<PointCloud> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
    if !extensions().contains(&extension) {
        tracing::warn!("unexpected extension `{extension}` for {}, sniffing contents", path.display());
    }

    decode_with(&bytes, settings)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SplatError;

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_file("does/not/exist.ply", &DecodeSettings::default());
        assert!(matches!(result, Err(SplatError::Io(_))));
    }
}
