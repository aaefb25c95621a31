use std::{
    collections::HashMap,
    io::{
        Cursor,
        Read,
    },
    time::Instant,
};

use glam::Vec3;
use half::f16;

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::{
        cloud::{
            CloudMetadata,
            PointCloud,
        },
        covariance::{
            compute_covariance_3d,
            normalize_rotation,
        },
        packed::{
            Covariance3d,
            Gaussian,
            GaussianCompressed,
        },
        quantization::{
            GaussianQuantization,
            Quantization,
        },
    },
    io::{
        DecodeSettings,
        PointCloudReader,
        npy::NpyArray,
    },
    material::spherical_harmonics::{
        SH_CHANNELS,
        ShCoefficients,
        ShCoefficientsCompressed,
        sh_degree_from_coefficients,
    },
    math::sigmoid,
};


pub const NPZ_MAGIC: &[u8] = b"PK\x03\x04";

/// upper bound on buffer space reserved from an entry's declared size
const MAX_PREALLOCATION: u64 = 1 << 26;

const POSITION: &[&str] = &["xyz", "positions", "means"];
const OPACITY: &[&str] = &["opacity", "opacities"];
const SCALING: &[&str] = &["scaling", "scale", "scales"];
const ROTATION: &[&str] = &["rotation", "rotations", "quats"];
const FEATURES_DC: &[&str] = &["features_dc", "sh0", "colors_dc"];
const FEATURES_REST: &[&str] = &["features_rest", "shN", "sh_rest"];

/// any of these switches decoding into the compressed representation
const QUANTIZATION_KEYS: &[&str] = &[
    "opacity_scale",
    "opacity_zero_point",
    "scaling_scale",
    "scaling_zero_point",
    "rotation_scale",
    "rotation_zero_point",
    "features_dc_scale",
    "features_dc_zero_point",
    "features_rest_scale",
    "features_rest_zero_point",
    "scaling_factor_scale",
    "scaling_factor_zero_point",
];


pub struct NpzReader;

impl PointCloudReader for NpzReader {
    fn magic_bytes(&self) -> &'static [u8] {
        NPZ_MAGIC
    }

    fn file_ending(&self) -> &'static str {
        "npz"
    }

    fn read(&self, data: &[u8], settings: &DecodeSettings) -> SplatResult<PointCloud> {
        parse_npz(data, settings)
    }
}


/// named arrays of an npz archive
pub struct NpzArchive {
    arrays: HashMap<String, NpyArray>,
}

impl NpzArchive {
    pub fn parse(data: &[u8]) -> SplatResult<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))
            .map_err(|err| SplatError::format(format!("invalid npz archive: {err}")))?;

        let mut arrays = HashMap::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let mut entry = archive
                .by_index(idx)
                .map_err(|err| SplatError::format(format!("invalid npz entry {idx}: {err}")))?;

            if entry.is_dir() {
                continue;
            }

            let name = entry.name().trim_end_matches(".npy").to_string();
            let mut bytes = Vec::with_capacity(preallocation(entry.size()));
            entry.read_to_end(&mut bytes)?;

            arrays.insert(name, NpyArray::parse(&bytes)?);
        }

        Ok(Self { arrays })
    }

    pub fn get(&self, name: &str) -> Option<&NpyArray> {
        self.arrays.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    fn field(&self, aliases: &[&str]) -> SplatResult<&NpyArray> {
        aliases
            .iter()
            .find_map(|alias| self.arrays.get(*alias))
            .ok_or_else(|| SplatError::schema(format!("npz is missing array `{}`", aliases.join("`/`"))))
    }

    fn value(&self, name: &str) -> SplatResult<Option<f64>> {
        self.get(name).map(NpyArray::scalar).transpose()
    }

    fn quantization(&self, prefix: &str) -> SplatResult<Quantization> {
        let zero_point = self.value(&format!("{prefix}_zero_point"))?.unwrap_or(0.0);
        let scale = self.value(&format!("{prefix}_scale"))?.unwrap_or(1.0);

        Ok(Quantization::new(zero_point as i32, scale as f32))
    }

    fn metadata(&self) -> SplatResult<CloudMetadata> {
        let background_color = match self.get("background_color") {
            Some(array) => {
                let rgb = array.to_f32();
                let rgb: [f32; 3] = rgb.get(..3)
                    .and_then(|rgb| rgb.try_into().ok())
                    .ok_or_else(|| SplatError::schema("background_color needs three components"))?;
                Some(rgb)
            },
            None => None,
        };

        Ok(CloudMetadata {
            kernel_size: self.value("kernel_size")?.map(|v| v as f32),
            mip_splatting: self.value("mip_splatting")?.map(|v| v != 0.0),
            background_color,
        })
    }
}


pub fn parse_npz(data: &[u8], settings: &DecodeSettings) -> SplatResult<PointCloud> {
    let start = Instant::now();

    let archive = NpzArchive::parse(data)?;
    let fields = Fields::resolve(&archive)?;
    let metadata = archive.metadata()?;

    let compressed = QUANTIZATION_KEYS.iter().any(|key| archive.contains(key));
    let cloud = if compressed {
        read_compressed(&archive, &fields, settings, metadata)?
    } else {
        read_full(&fields, settings, metadata)?
    };

    tracing::info!(
        "decoded {} gaussians (sh degree {}, compressed: {}) from npz in {:?}",
        cloud.num_points(),
        cloud.sh_deg(),
        compressed,
        start.elapsed(),
    );

    Ok(cloud)
}


/// required arrays, validated against each other
struct Fields<'a> {
    num_points: usize,
    sh_deg: usize,
    num_rest: usize,
    position: &'a NpyArray,
    opacity: &'a NpyArray,
    scaling: &'a NpyArray,
    rotation: &'a NpyArray,
    features_dc: &'a NpyArray,
    features_rest: &'a NpyArray,
    gaussian_indices: Option<&'a NpyArray>,
    feature_indices: Option<&'a NpyArray>,
}

impl<'a> Fields<'a> {
    fn resolve(archive: &'a NpzArchive) -> SplatResult<Self> {
        let position = archive.field(POSITION)?;
        let opacity = archive.field(OPACITY)?;
        let scaling = archive.field(SCALING)?;
        let rotation = archive.field(ROTATION)?;
        let features_dc = archive.field(FEATURES_DC)?;
        let features_rest = archive.field(FEATURES_REST)?;
        let gaussian_indices = archive.get("gaussian_indices");
        let feature_indices = archive.get("feature_indices");

        let num_points = position.rows();

        expect_width("position", position, 3)?;
        expect_width("opacity", opacity, 1)?;
        expect_width("scaling", scaling, 3)?;
        expect_width("rotation", rotation, 4)?;
        expect_width("features_dc", features_dc, SH_CHANNELS)?;

        let rest_width = features_rest.row_width();
        if rest_width % SH_CHANNELS != 0 {
            return Err(SplatError::schema(format!(
                "features_rest rows hold {rest_width} values, not a multiple of {SH_CHANNELS}",
            )));
        }
        let num_rest = rest_width / SH_CHANNELS;
        let sh_deg = sh_degree_from_coefficients(num_rest + 1)?;

        expect_rows("opacity", opacity, num_points)?;

        // covariance and sh tables may be shared when indexed
        match gaussian_indices {
            Some(indices) => {
                expect_width("gaussian_indices", indices, 1)?;
                expect_rows("gaussian_indices", indices, num_points)?;
            },
            None => {
                expect_rows("scaling", scaling, num_points)?;
                expect_rows("rotation", rotation, num_points)?;
            },
        }
        if scaling.rows() != rotation.rows() {
            return Err(SplatError::schema(format!(
                "scaling has {} rows but rotation has {}",
                scaling.rows(),
                rotation.rows(),
            )));
        }

        match feature_indices {
            Some(indices) => {
                expect_width("feature_indices", indices, 1)?;
                expect_rows("feature_indices", indices, num_points)?;
            },
            None => {
                expect_rows("features_dc", features_dc, num_points)?;
                expect_rows("features_rest", features_rest, num_points)?;
            },
        }
        if features_dc.rows() != features_rest.rows() {
            return Err(SplatError::schema(format!(
                "features_dc has {} rows but features_rest has {}",
                features_dc.rows(),
                features_rest.rows(),
            )));
        }

        Ok(Self {
            num_points,
            sh_deg,
            num_rest,
            position,
            opacity,
            scaling,
            rotation,
            features_dc,
            features_rest,
            gaussian_indices,
            feature_indices,
        })
    }
}

fn expect_rows(name: &str, array: &NpyArray, rows: usize) -> SplatResult<()> {
    if array.rows() != rows {
        return Err(SplatError::schema(format!(
            "{name} has leading dimension {}, expected {rows}",
            array.rows(),
        )));
    }

    Ok(())
}

fn expect_width(name: &str, array: &NpyArray, width: usize) -> SplatResult<()> {
    if array.shape.is_empty() || array.row_width() != width {
        return Err(SplatError::schema(format!(
            "{name} has shape {:?}, expected {width} values per row",
            array.shape,
        )));
    }

    Ok(())
}


fn read_full(
    fields: &Fields,
    settings: &DecodeSettings,
    metadata: CloudMetadata,
) -> SplatResult<PointCloud> {
    if fields.gaussian_indices.is_some() || fields.feature_indices.is_some() {
        return Err(SplatError::CompressionState(
            "index tables require quantized attributes".to_string(),
        ));
    }

    let num_points = settings.cap(fields.num_points);

    let position = fields.position.to_f32();
    let opacity = fields.opacity.to_f32();
    let scaling = fields.scaling.to_f32();
    let rotation = fields.rotation.to_f32();
    let features_dc = fields.features_dc.to_f32();
    let features_rest = fields.features_rest.to_f32();
    let rest_width = fields.num_rest * SH_CHANNELS;

    let mut gaussians = Vec::with_capacity(num_points);
    let mut sh = Vec::with_capacity(num_points);

    for i in 0..num_points {
        let scale = Vec3::new(scaling[i * 3].exp(), scaling[i * 3 + 1].exp(), scaling[i * 3 + 2].exp());
        let q = &rotation[i * 4..i * 4 + 4];
        let rotation = normalize_rotation(q[0], q[1], q[2], q[3]);

        gaussians.push(Gaussian::new(
            Vec3::from_slice(&position[i * 3..i * 3 + 3]),
            sigmoid(opacity[i]),
            compute_covariance_3d(rotation, scale),
        ));

        let dc = [features_dc[i * 3], features_dc[i * 3 + 1], features_dc[i * 3 + 2]];
        sh.push(ShCoefficients::from_coefficient_major(
            dc,
            &features_rest[i * rest_width..(i + 1) * rest_width],
        ));
    }

    PointCloud::new(gaussians, sh, fields.sh_deg, metadata)
}


fn read_compressed(
    archive: &NpzArchive,
    fields: &Fields,
    settings: &DecodeSettings,
    metadata: CloudMetadata,
) -> SplatResult<PointCloud> {
    let num_points = settings.cap(fields.num_points);

    let quantization = GaussianQuantization {
        color_dc: archive.quantization("features_dc")?,
        color_rest: archive.quantization("features_rest")?,
        opacity: archive.quantization("opacity")?,
        scaling_factor: archive.quantization("scaling_factor")?,
    };
    let scaling_q = archive.quantization("scaling")?;
    let rotation_q = archive.quantization("rotation")?;

    let scaling_factor = match archive.get("scaling_factor") {
        Some(factor) => {
            expect_width("scaling_factor", factor, 1)?;
            expect_rows("scaling_factor", factor, fields.num_points)?;
            Some(factor.to_i64())
        },
        None => None,
    };

    // shared covariance table
    let scaling = fields.scaling.to_i64();
    let rotation = fields.rotation.to_i64();
    let covars = (0..fields.scaling.rows())
        .map(|i| {
            let raw = Vec3::new(
                scaling_q.dequantize(scaling[i * 3] as i32),
                scaling_q.dequantize(scaling[i * 3 + 1] as i32),
                scaling_q.dequantize(scaling[i * 3 + 2] as i32),
            );
            let scale = match scaling_factor {
                Some(_) => raw.max(Vec3::ZERO).normalize_or_zero(),
                None => Vec3::new(raw.x.exp(), raw.y.exp(), raw.z.exp()),
            };

            let q = &rotation[i * 4..i * 4 + 4];
            let rotation = normalize_rotation(
                rotation_q.dequantize(q[0] as i32),
                rotation_q.dequantize(q[1] as i32),
                rotation_q.dequantize(q[2] as i32),
                rotation_q.dequantize(q[3] as i32),
            );

            Covariance3d::from(compute_covariance_3d(rotation, scale))
        })
        .collect::<Vec<_>>();

    // shared sh table, raw quantized values
    let features_dc = fields.features_dc.to_i64();
    let features_rest = fields.features_rest.to_i64();
    let rest_width = fields.num_rest * SH_CHANNELS;
    let sh = (0..fields.features_dc.rows())
        .map(|i| {
            let dc = [
                to_i8(features_dc[i * 3]),
                to_i8(features_dc[i * 3 + 1]),
                to_i8(features_dc[i * 3 + 2]),
            ];
            let rest = features_rest[i * rest_width..(i + 1) * rest_width]
                .iter()
                .map(|&v| to_i8(v))
                .collect::<Vec<_>>();

            ShCoefficientsCompressed::from_quantized(dc, &rest)
        })
        .collect::<Vec<_>>();

    let position = fields.position.to_f32();
    let opacity = fields.opacity.to_i64();
    let gaussian_indices = fields.gaussian_indices.map(NpyArray::to_i64);
    let feature_indices = fields.feature_indices.map(NpyArray::to_i64);

    let gaussians = (0..num_points)
        .map(|i| {
            Ok(GaussianCompressed {
                xyz: [
                    f16::from_f32(position[i * 3]),
                    f16::from_f32(position[i * 3 + 1]),
                    f16::from_f32(position[i * 3 + 2]),
                ],
                opacity: to_i8(opacity[i]),
                scale_factor: scaling_factor.as_ref().map_or(0, |factor| to_i8(factor[i])),
                geometry_idx: to_index("gaussian_indices", gaussian_indices.as_deref(), i)?,
                sh_idx: to_index("feature_indices", feature_indices.as_deref(), i)?,
            })
        })
        .collect::<SplatResult<Vec<_>>>()?;

    PointCloud::compressed(
        gaussians,
        sh,
        fields.sh_deg,
        Some(covars),
        Some(quantization),
        metadata,
    )
}

fn preallocation(declared: u64) -> usize {
    declared.min(MAX_PREALLOCATION) as usize
}

/// keeps the low byte, so unsigned storage of quantized values reads back signed
fn to_i8(value: i64) -> i8 {
    value as i8
}

fn to_index(name: &str, indices: Option<&[i64]>, i: usize) -> SplatResult<u32> {
    let Some(indices) = indices else {
        return Ok(i as u32);
    };

    let index = *indices
        .get(i)
        .ok_or_else(|| SplatError::schema(format!("{name} has no entry for point {i}")))?;

    u32::try_from(index)
        .map_err(|_| SplatError::schema(format!("{name}[{i}] = {index} is not a valid index")))
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::io::npy::write_npy;

    fn f32_npy(shape: &[usize], values: &[f32]) -> Vec<u8> {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        write_npy("<f4", shape, &bytes)
    }

    fn archive(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        for (name, bytes) in entries {
            writer.start_file(format!("{name}.npy"), options).unwrap();
            writer.write_all(bytes).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }

    fn full_entries(n: usize) -> Vec<(&'static str, Vec<u8>)> {
        vec![
            ("means", f32_npy(&[n, 3], &vec![1.0; n * 3])),
            ("opacities", f32_npy(&[n], &vec![0.0; n])),
            ("scales", f32_npy(&[n, 3], &vec![0.0; n * 3])),
            ("quats", f32_npy(&[n, 4], &[1.0, 0.0, 0.0, 0.0].repeat(n))),
            ("sh0", f32_npy(&[n, 1, 3], &vec![0.5; n * 3])),
            ("shN", f32_npy(&[n, 3, 3], &vec![0.25; n * 9])),
        ]
    }

    #[test]
    fn test_aliases_resolve() {
        let data = archive(&full_entries(4));
        let cloud = parse_npz(&data, &DecodeSettings::default()).unwrap();

        assert_eq!(cloud.num_points(), 4);
        assert_eq!(cloud.sh_deg(), 1);
        assert!(!cloud.is_compressed());
        assert_eq!(cloud.position(3), Vec3::ONE);
    }

    #[test]
    fn test_leading_dimension_mismatch() {
        let mut entries = full_entries(4);
        entries[1] = ("opacities", f32_npy(&[3], &[0.0; 3]));

        let result = parse_npz(&archive(&entries), &DecodeSettings::default());
        assert!(matches!(result, Err(SplatError::Schema(_))));
    }

    #[test]
    fn test_missing_array() {
        let mut entries = full_entries(2);
        entries.retain(|(name, _)| *name != "quats");

        let result = parse_npz(&archive(&entries), &DecodeSettings::default());
        assert!(matches!(result, Err(SplatError::Schema(message)) if message.contains("rotation")));
    }

    #[test]
    fn test_declared_entry_size_is_capped() {
        assert_eq!(preallocation(128), 128);
        assert_eq!(preallocation(u64::MAX), 1 << 26);
    }

    #[test]
    fn test_not_a_zip() {
        let result = parse_npz(b"PK\x03\x04garbage", &DecodeSettings::default());
        assert!(matches!(result, Err(SplatError::Format(_))));
    }
}
