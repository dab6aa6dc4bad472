//! Minimal `.npy` (format version 1.0) support for little-endian `f32`
//! arrays in C order.
//!
//! Layout: the magic string `\x93NUMPY`, the version bytes `1 0`, a `u16`
//! header length, then an ASCII dictionary padded with spaces and ended by
//! `\n` so that magic + header is a multiple of 64 bytes. The payload follows
//! directly.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

pub const MAGIC: &[u8; 6] = b"\x93NUMPY";
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;
const HEADER_ALIGN: usize = 64;

#[derive(Error, Debug)]
pub enum NpyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an npy file")]
    InvalidMagic,

    #[error("unsupported npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("invalid npy header: {0}")]
    InvalidHeader(String),

    #[error("shape {shape:?} needs {expected} values, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

fn check_shape(shape: &[usize], len: usize) -> Result<(), NpyError> {
    let expected: usize = shape.iter().product();
    if expected != len {
        return Err(NpyError::ShapeMismatch {
            shape: shape.to_vec(),
            expected,
            actual: len,
        });
    }
    Ok(())
}

impl NpyArray {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<NpyArray, NpyError> {
        check_shape(&shape, data.len())?;
        Ok(NpyArray { shape, data })
    }

    pub fn save(&self, path: &Path) -> Result<(), NpyError> {
        let mut writer = BufWriter::new(File::create(path)?);
        write_npy(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<NpyArray, NpyError> {
        read_npy(&mut BufReader::new(File::open(path)?))
    }
}

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [single] => format!("({},)", single),
        _ => format!(
            "({})",
            shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn header_text(shape: &[usize]) -> String {
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_literal(shape)
    );
    // +1 for the terminating newline
    let unpadded = PREAMBLE_LEN + header.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}

/// Fails without writing anything if the shape does not cover the data.
pub fn write_npy<W: Write>(writer: &mut W, array: &NpyArray) -> Result<(), NpyError> {
    check_shape(&array.shape, array.data.len())?;
    let header = header_text(&array.shape);
    let header_len = u16::try_from(header.len())
        .map_err(|_| NpyError::InvalidHeader(format!("header too long ({} bytes)", header.len())))?;
    writer.write_all(MAGIC)?;
    writer.write_u8(1)?;
    writer.write_u8(0)?;
    writer.write_u16::<LittleEndian>(header_len)?;
    writer.write_all(header.as_bytes())?;
    for value in &array.data {
        writer.write_f32::<LittleEndian>(*value)?;
    }
    Ok(())
}

/// Value of `key` in a header dictionary, up to the next top-level comma.
fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let start = header.find(&pattern)? + pattern.len();
    let rest = header[start..].trim_start();
    if rest.starts_with('(') {
        let end = rest.find(')')?;
        Some(&rest[..=end])
    } else {
        let end = rest.find([',', '}'])?;
        Some(rest[..end].trim())
    }
}

fn parse_shape(literal: &str) -> Result<Vec<usize>, NpyError> {
    let inner = literal
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| NpyError::InvalidHeader(format!("bad shape {}", literal)))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| NpyError::InvalidHeader(format!("bad dimension {}", s)))
        })
        .collect()
}

pub fn read_npy<R: Read>(reader: &mut R) -> Result<NpyArray, NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(NpyError::InvalidMagic);
    }
    let major = reader.read_u8()?;
    let minor = reader.read_u8()?;
    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 => reader.read_u32::<LittleEndian>()? as usize,
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8(header)
        .map_err(|_| NpyError::InvalidHeader("header is not ascii".to_string()))?;

    let descr = header_field(&header, "descr")
        .ok_or_else(|| NpyError::InvalidHeader("missing descr".to_string()))?;
    if descr.trim_matches('\'') != "<f4" {
        return Err(NpyError::InvalidHeader(format!("unsupported dtype {}", descr)));
    }
    if header_field(&header, "fortran_order") != Some("False") {
        return Err(NpyError::InvalidHeader("fortran order is not supported".to_string()));
    }
    let shape = parse_shape(
        header_field(&header, "shape")
            .ok_or_else(|| NpyError::InvalidHeader("missing shape".to_string()))?,
    )?;

    let count: usize = shape.iter().product();
    let mut data = vec![0f32; count];
    reader.read_f32_into::<LittleEndian>(&mut data)?;
    NpyArray::new(shape, data)
}
