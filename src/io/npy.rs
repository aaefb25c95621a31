use half::f16;

use crate::error::{
    SplatError,
    SplatResult,
};


pub const NPY_MAGIC: &[u8] = b"\x93NUMPY";


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
)]
pub enum DType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
}

impl DType {
    pub fn size(&self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    /// parses a numpy `descr` such as `<f4` or `|i1`
    fn parse(descr: &str) -> SplatResult<Self> {
        let mut chars = descr.chars();
        let order = chars.next();
        let kind = chars.next();
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| SplatError::format(format!("unsupported npy dtype `{descr}`")))?;

        let dtype = match (kind, size) {
            (Some('b'), 1) => DType::Bool,
            (Some('i'), 1) => DType::I8,
            (Some('u'), 1) => DType::U8,
            (Some('i'), 2) => DType::I16,
            (Some('u'), 2) => DType::U16,
            (Some('i'), 4) => DType::I32,
            (Some('u'), 4) => DType::U32,
            (Some('i'), 8) => DType::I64,
            (Some('u'), 8) => DType::U64,
            (Some('f'), 2) => DType::F16,
            (Some('f'), 4) => DType::F32,
            (Some('f'), 8) => DType::F64,
            _ => return Err(SplatError::format(format!("unsupported npy dtype `{descr}`"))),
        };

        let little_endian = match order {
            Some('<') | Some('|') => true,
            Some('=') => cfg!(target_endian = "little"),
            _ => false,
        };
        if !little_endian && dtype.size() > 1 {
            return Err(SplatError::format(format!("big endian npy dtype `{descr}` is not supported")));
        }

        Ok(dtype)
    }
}


/// a dense c-order array read from a `.npy` payload
#[derive(Clone, Debug, PartialEq)]
pub struct NpyArray {
    pub dtype: DType,
    pub shape: Vec<usize>,
    data: Vec<u8>,
}

impl NpyArray {
    pub fn parse(bytes: &[u8]) -> SplatResult<Self> {
        if !bytes.starts_with(NPY_MAGIC) || bytes.len() < 10 {
            return Err(SplatError::format("missing npy magic"));
        }

        let major = bytes[6];
        let (header_len, header_start) = match major {
            1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
            2 | 3 => {
                if bytes.len() < 12 {
                    return Err(SplatError::format("truncated npy header"));
                }
                (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
            },
            _ => return Err(SplatError::format(format!("unsupported npy version {major}"))),
        };

        let data_start = header_start + header_len;
        let header = bytes
            .get(header_start..data_start)
            .ok_or_else(|| SplatError::format("truncated npy header"))?;
        let header = std::str::from_utf8(header)
            .map_err(|_| SplatError::format("npy header is not utf-8"))?;

        let dtype = DType::parse(dict_value(header, "descr")?.trim_matches(|c| c == '\'' || c == '"'))?;

        if dict_value(header, "fortran_order")?.starts_with("True") {
            return Err(SplatError::format("fortran ordered npy arrays are not supported"));
        }

        let shape = parse_shape(dict_value(header, "shape")?)?;

        let row_width = checked_product(shape.get(1..).unwrap_or_default());
        let (Some(len), Some(_)) = (checked_product(&shape), row_width) else {
            return Err(SplatError::format(format!("npy shape {shape:?} overflows")));
        };
        let required = len.saturating_mul(dtype.size());
        let data = &bytes[data_start.min(bytes.len())..];
        if data.len() < required {
            return Err(SplatError::Truncation {
                declared: len,
                required: data_start + required,
                available: bytes.len(),
            });
        }

        Ok(Self {
            dtype,
            shape,
            data: data[..required].to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        checked_product(&self.shape).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// leading dimension, 1 for scalars
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// elements per leading-dimension row
    pub fn row_width(&self) -> usize {
        checked_product(self.shape.get(1..).unwrap_or_default()).unwrap_or(usize::MAX)
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.to_f64().into_iter().map(|v| v as f32).collect()
    }

    pub fn to_f64(&self) -> Vec<f64> {
        let size = self.dtype.size();

        self.data
            .chunks_exact(size)
            .map(|c| match self.dtype {
                DType::Bool => (c[0] != 0) as u8 as f64,
                DType::I8 => c[0] as i8 as f64,
                DType::U8 => c[0] as f64,
                DType::I16 => i16::from_le_bytes([c[0], c[1]]) as f64,
                DType::U16 => u16::from_le_bytes([c[0], c[1]]) as f64,
                DType::F16 => f16::from_le_bytes([c[0], c[1]]).to_f64(),
                DType::I32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                DType::U32 => u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                DType::F32 => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                DType::I64 => i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f64,
                DType::U64 => u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f64,
                DType::F64 => f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]),
            })
            .collect()
    }

    /// integer view, floats truncated toward zero
    pub fn to_i64(&self) -> Vec<i64> {
        self.to_f64().into_iter().map(|v| v as i64).collect()
    }

    pub fn scalar(&self) -> SplatResult<f64> {
        self.to_f64()
            .first()
            .copied()
            .ok_or_else(|| SplatError::schema("expected a scalar, found an empty array"))
    }
}


/// element count of `dims`, `None` on overflow
fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// raw text of `key`'s value in a python dict literal
fn dict_value<'a>(header: &'a str, key: &str) -> SplatResult<&'a str> {
    let missing = || SplatError::format(format!("npy header has no `{key}`"));

    let key_start = header
        .find(&format!("'{key}'"))
        .or_else(|| header.find(&format!("\"{key}\"")))
        .ok_or_else(missing)?;
    let rest = &header[key_start + key.len() + 2..];
    let colon = rest.find(':').ok_or_else(missing)?;
    let value = rest[colon + 1..].trim_start();

    let end = if value.starts_with('(') {
        value.find(')').map(|idx| idx + 1)
    } else {
        value.find([',', '}'])
    };

    Ok(value[..end.unwrap_or(value.len())].trim())
}

fn parse_shape(raw: &str) -> SplatResult<Vec<usize>> {
    raw.trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| SplatError::format(format!("invalid npy shape `{raw}`")))
        })
        .collect()
}


#[cfg(test)]
pub(crate) fn write_npy(descr: &str, shape: &[usize], data: &[u8]) -> Vec<u8> {
    let shape = match shape {
        [] => "()".to_string(),
        [n] => format!("({n},)"),
        dims => format!("({})", dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")),
    };

    let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = NPY_MAGIC.to_vec();
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(data);
    bytes
}
