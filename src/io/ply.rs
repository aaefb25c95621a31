use std::{
    collections::HashMap,
    io::Cursor,
    time::Instant,
};

use glam::Vec3;
use ply_rs::{
    parser::Parser,
    ply::{
        DefaultElement,
        ElementDef,
        Encoding,
        PropertyType,
        ScalarType,
    },
};

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
        packed::Gaussian,
    },
    io::{
        DecodeSettings,
        PointCloudReader,
    },
    material::spherical_harmonics::{
        SH_CHANNELS,
        ShCoefficients,
        sh_degree_from_rest_scalars,
    },
    math::sigmoid,
};


pub const PLY_MAGIC: &[u8] = b"ply";

/// the header terminator must appear within this many leading bytes
pub const HEADER_SCAN_LIMIT: usize = 1 << 20;

const HEADER_END: &[u8] = b"end_header";
const VERTEX_ELEMENT: &str = "vertex";


pub struct PlyReader;

impl PointCloudReader for PlyReader {
    fn magic_bytes(&self) -> &'static [u8] {
        PLY_MAGIC
    }

    fn file_ending(&self) -> &'static str {
        "ply"
    }

    fn read(&self, data: &[u8], settings: &DecodeSettings) -> SplatResult<PointCloud> {
        parse_ply(data, settings)
    }
}


pub fn parse_ply(data: &[u8], settings: &DecodeSettings) -> SplatResult<PointCloud> {
    let start = Instant::now();

    let header_len = find_header_end(data)?;
    let mut header_reader = Cursor::new(&data[..header_len]);
    let header = Parser::<DefaultElement>::new()
        .read_header(&mut header_reader)
        .map_err(|err| SplatError::format(format!("invalid ply header: {err}")))?;

    match header.encoding {
        Encoding::BinaryLittleEndian => {},
        Encoding::Ascii => return Err(SplatError::format("ascii ply bodies are not supported")),
        Encoding::BinaryBigEndian => return Err(SplatError::format("big endian ply bodies are not supported")),
    }

    // byte length of the elements ahead of `vertex`, `None` once it overflows
    let mut skip = Some(0usize);
    let mut vertex = None;
    for (_key, element) in &header.elements {
        if element.name == VERTEX_ELEMENT {
            vertex = Some(element);
            break;
        }

        let stride = element_stride(element)?;
        skip = skip
            .zip(element.count.checked_mul(stride))
            .and_then(|(skip, size)| skip.checked_add(size));
    }
    let vertex = vertex.ok_or_else(|| SplatError::schema("ply has no vertex element"))?;

    let layout = VertexLayout::new(vertex)?;
    let sh_deg = layout.sh_deg;

    let count = vertex.count;
    let body_start = skip.and_then(|skip| skip.checked_add(header_len));
    let required = body_start
        .zip(count.checked_mul(layout.stride))
        .and_then(|(body_start, body)| body_start.checked_add(body));
    let (Some(body_start), Some(required)) = (body_start, required) else {
        return Err(SplatError::Truncation {
            declared: count,
            required: usize::MAX,
            available: data.len(),
        });
    };
    if required > data.len() {
        return Err(SplatError::Truncation {
            declared: count,
            required,
            available: data.len(),
        });
    }

    let num_points = settings.cap(count);
    if num_points < count {
        tracing::warn!("ply declares {count} vertices, decoding the first {num_points}");
    }

    let body = &data[body_start..];
    let mut gaussians = Vec::with_capacity(num_points);
    let mut sh = Vec::with_capacity(num_points);
    let mut rest = vec![0.0; layout.rest.len()];

    for record in body.chunks_exact(layout.stride).take(num_points) {
        let read = |offset: usize| {
            f32::from_le_bytes([
                record[offset],
                record[offset + 1],
                record[offset + 2],
                record[offset + 3],
            ])
        };

        let position = Vec3::from_array(layout.position.map(read));
        let dc = layout.dc.map(read);
        for (value, &offset) in rest.iter_mut().zip(&layout.rest) {
            *value = read(offset);
        }

        let opacity = sigmoid(read(layout.opacity));
        let scale = Vec3::from_array(layout.scale.map(|offset| read(offset).exp()));
        let [w, x, y, z] = layout.rotation.map(read);
        let rotation = normalize_rotation(w, x, y, z);

        gaussians.push(Gaussian::new(
            position,
            opacity,
            compute_covariance_3d(rotation, scale),
        ));
        sh.push(ShCoefficients::from_channel_major(dc, &rest, sh_deg));
    }

    let metadata = CloudMetadata {
        kernel_size: comment_value(&header.comments, "kernel_size").and_then(|raw| raw.parse().ok()),
        mip_splatting: comment_value(&header.comments, "mip").and_then(|raw| raw.parse().ok()),
        background_color: comment_value(&header.comments, "background_color").and_then(parse_rgb),
    };

    let cloud = PointCloud::new(gaussians, sh, sh_deg, metadata)?;

    tracing::info!(
        "decoded {} gaussians (sh degree {}) from ply in {:?}",
        cloud.num_points(),
        sh_deg,
        start.elapsed(),
    );

    Ok(cloud)
}


/// byte offset just past the header terminator line
fn find_header_end(data: &[u8]) -> SplatResult<usize> {
    let window = &data[..data.len().min(HEADER_SCAN_LIMIT)];

    let position = window
        .windows(HEADER_END.len())
        .position(|candidate| candidate == HEADER_END)
        .ok_or_else(|| SplatError::format(format!("no `end_header` within the first {HEADER_SCAN_LIMIT} bytes")))?;

    let newline = data[position..]
        .iter()
        .position(|&byte| byte == b'\n')
        .ok_or_else(|| SplatError::format("unterminated `end_header` line"))?;

    Ok(position + newline + 1)
}

fn scalar_size(scalar: &ScalarType) -> usize {
    match scalar {
        ScalarType::Char | ScalarType::UChar => 1,
        ScalarType::Short | ScalarType::UShort => 2,
        ScalarType::Int | ScalarType::UInt | ScalarType::Float => 4,
        ScalarType::Double => 8,
    }
}

fn element_stride(element: &ElementDef) -> SplatResult<usize> {
    element
        .properties
        .values()
        .map(|property| match &property.data_type {
            PropertyType::Scalar(scalar) => Ok(scalar_size(scalar)),
            PropertyType::List(..) => Err(SplatError::format(format!(
                "list property `{}` in element `{}` is not supported",
                property.name,
                element.name,
            ))),
        })
        .sum()
}


struct VertexLayout {
    stride: usize,
    sh_deg: usize,
    position: [usize; 3],
    dc: [usize; 3],
    rest: Vec<usize>,
    opacity: usize,
    scale: [usize; 3],
    rotation: [usize; 4],
}

impl VertexLayout {
    fn new(vertex: &ElementDef) -> SplatResult<Self> {
        let num_rest = vertex
            .properties
            .keys()
            .filter(|name| name.starts_with("f_rest_"))
            .count();
        let sh_deg = sh_degree_from_rest_scalars(num_rest)?;

        let mut offsets = HashMap::new();
        let mut offset = 0;
        for property in vertex.properties.values() {
            offsets.insert(property.name.as_str(), (offset, &property.data_type));
            if let PropertyType::Scalar(scalar) = &property.data_type {
                offset += scalar_size(scalar);
            }
        }

        let lookup = |name: &str| -> SplatResult<usize> {
            match offsets.get(name) {
                Some((offset, PropertyType::Scalar(ScalarType::Float))) => Ok(*offset),
                Some((_, data_type)) => Err(SplatError::schema(format!(
                    "vertex property `{name}` must be a float scalar, found {data_type:?}",
                ))),
                None => Err(SplatError::schema(format!("missing vertex property `{name}`"))),
            }
        };

        // every required property is validated before any record is read
        let position = [lookup("x")?, lookup("y")?, lookup("z")?];
        for normal in ["nx", "ny", "nz"] {
            lookup(normal)?;
        }
        let dc = [lookup("f_dc_0")?, lookup("f_dc_1")?, lookup("f_dc_2")?];
        let rest = (0..num_rest)
            .map(|i| lookup(&format!("f_rest_{i}")))
            .collect::<SplatResult<Vec<_>>>()?;
        let opacity = lookup("opacity")?;
        let scale = [lookup("scale_0")?, lookup("scale_1")?, lookup("scale_2")?];
        let rotation = [lookup("rot_0")?, lookup("rot_1")?, lookup("rot_2")?, lookup("rot_3")?];

        let stride = element_stride(vertex)?;

        debug_assert_eq!(rest.len() % SH_CHANNELS, 0);

        Ok(Self {
            stride,
            sh_deg,
            position,
            dc,
            rest,
            opacity,
            scale,
            rotation,
        })
    }
}


/// value after `=` in the first comment mentioning `key`
fn comment_value<'a>(comments: &'a [String], key: &str) -> Option<&'a str> {
    comments
        .iter()
        .filter(|comment| comment.contains(key))
        .find_map(|comment| comment.split_once('=').map(|(_, value)| value.trim()))
}

fn parse_rgb(raw: &str) -> Option<[f32; 3]> {
    let parts = raw
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<_>>>()?;

    parts.try_into().ok()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_end() {
        let data = b"ply\nformat binary_little_endian 1.0\nend_header\n\x01\x02";
        assert_eq!(find_header_end(data).unwrap(), data.len() - 2);

        assert!(matches!(
            find_header_end(b"ply\nformat binary_little_endian 1.0\n"),
            Err(SplatError::Format(_)),
        ));
    }

    #[test]
    fn test_header_end_beyond_scan_limit() {
        let mut data = b"ply\n".to_vec();
        data.resize(HEADER_SCAN_LIMIT + 16, b' ');
        data.extend_from_slice(b"end_header\n");

        assert!(matches!(find_header_end(&data), Err(SplatError::Format(_))));
    }

    #[test]
    fn test_comment_values() {
        let comments = vec![
            "generated by trainer".to_string(),
            "mip_splatting=true".to_string(),
            "kernel_size = 0.3".to_string(),
            "background_color=0.1, 0.2,0.3".to_string(),
        ];

        assert_eq!(comment_value(&comments, "mip"), Some("true"));
        assert_eq!(comment_value(&comments, "kernel_size"), Some("0.3"));
        assert_eq!(
            comment_value(&comments, "background_color").and_then(parse_rgb),
            Some([0.1, 0.2, 0.3]),
        );
        assert_eq!(parse_rgb("1,2"), None);
        assert_eq!(comment_value(&comments, "missing"), None);
    }
}
