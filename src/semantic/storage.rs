//! Reader for precomputed embedding matrices stored as NumPy `.npy` files.
//!
//! File format:
//!
//! - magic: `\x93NUMPY` (6 bytes)
//! - version: major u8, minor u8
//! - header_len: u16 little-endian (v1) or u32 little-endian (v2, v3)
//! - header: Python dict literal with `descr`, `fortran_order` and `shape`,
//!   padded with spaces and terminated by a newline
//! - payload: `rows * dimensions` little-endian floats
//!
//! Only 2-D `<f4` and `<f8` arrays are accepted. `<f8` is narrowed to f32.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::semantic::index::{EmbeddingMatrix, IndexError};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Errors that can occur while reading an embedding matrix.
#[derive(Debug, thiserror::Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported format version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("Unsupported dtype '{0}', expected '<f4' or '<f8'")]
    UnsupportedDtype(String),

    #[error("Expected a 2-D array, got shape {0:?}")]
    BadShape(Vec<usize>),

    #[error("Payload size mismatch: expected {expected} bytes, got {got}")]
    PayloadSize { expected: usize, got: usize },

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32,
    F64,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        match descr {
            "<f4" => Ok(Dtype::F32),
            "<f8" => Ok(Dtype::F64),
            other => Err(NpyError::UnsupportedDtype(other.to_string())),
        }
    }

    fn item_size(self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F64 => 8,
        }
    }
}

#[derive(Debug)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Read an embedding matrix from an `.npy` file.
pub fn read_matrix(path: &Path) -> Result<EmbeddingMatrix, NpyError> {
    let bytes = std::fs::read(path)?;
    parse_matrix(&bytes)
}

/// Parse an in-memory `.npy` buffer into an embedding matrix.
pub fn parse_matrix(bytes: &[u8]) -> Result<EmbeddingMatrix, NpyError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(NpyError::InvalidFormat("missing NUMPY magic".to_string()));
    }

    let (major, minor) = (bytes[6], bytes[7]);
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(NpyError::InvalidFormat("truncated header length".to_string()));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let payload_start = header_start + header_len;
    if bytes.len() < payload_start {
        return Err(NpyError::InvalidFormat("truncated header".to_string()));
    }

    let header_text = std::str::from_utf8(&bytes[header_start..payload_start])
        .map_err(|e| NpyError::InvalidFormat(format!("header is not valid text: {}", e)))?;
    let header = parse_header(header_text)?;

    let (rows, dimensions) = match header.shape.as_slice() {
        [rows, dimensions] => (*rows, *dimensions),
        _ => return Err(NpyError::BadShape(header.shape)),
    };

    let payload = &bytes[payload_start..];
    let expected = rows
        .checked_mul(dimensions)
        .and_then(|n| n.checked_mul(header.dtype.item_size()))
        .ok_or(NpyError::BadShape(vec![rows, dimensions]))?;
    if payload.len() != expected {
        return Err(NpyError::PayloadSize {
            expected,
            got: payload.len(),
        });
    }

    let values: Vec<f32> = match header.dtype {
        Dtype::F32 => payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F64 => payload
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
    };

    let values = if header.fortran_order {
        transpose(&values, rows, dimensions)
    } else {
        values
    };

    Ok(EmbeddingMatrix::new(values, rows, dimensions)?)
}

static DESCR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'descr'\s*:\s*'([^']*)'").expect("Failed to compile descr regex")
});

static FORTRAN_ORDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'fortran_order'\s*:\s*(True|False)")
        .expect("Failed to compile fortran_order regex")
});

static SHAPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").expect("Failed to compile shape regex")
});

fn parse_header(header: &str) -> Result<Header, NpyError> {
    let descr = capture(header, &DESCR_REGEX, "descr")?;
    let fortran_order = capture(header, &FORTRAN_ORDER_REGEX, "fortran_order")? == "True";
    let shape_text = capture(header, &SHAPE_REGEX, "shape")?;

    let shape = shape_text
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| NpyError::InvalidFormat(format!("invalid shape entry '{}'", dim)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        dtype: Dtype::parse(&descr)?,
        fortran_order,
        shape,
    })
}

fn capture(header: &str, re: &Regex, field: &str) -> Result<String, NpyError> {
    re.captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| NpyError::InvalidFormat(format!("header has no valid '{}' entry", field)))
}

/// Column-major `[rows, cols]` to row-major.
fn transpose(values: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    let mut out = vec![0.0; values.len()];
    for col in 0..cols {
        for row in 0..rows {
            out[row * cols + col] = values[col * rows + row];
        }
    }
    out
}

/// Encode a row-major f32 matrix as a version 1.0 `.npy` buffer.
#[cfg(test)]
pub fn encode_f32(rows: &[Vec<f32>]) -> Vec<u8> {
    let dimensions = rows.first().map(Vec::len).unwrap_or(0);
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows.len(),
        dimensions
    );
    encode_raw(&dict, &rows.concat().iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>())
}

/// Wrap a header dict and payload in a version 1.0 `.npy` envelope.
#[cfg(test)]
pub fn encode_raw(dict: &str, payload: &[u8]) -> Vec<u8> {
    // magic + version + len, header padded to a multiple of 64 including the newline
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header = format!("{}{}\n", dict, " ".repeat(padding));

    let mut bytes = Vec::new();
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_f32_matrix() {
        let bytes = encode_f32(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let m = parse_matrix(&bytes).unwrap();

        assert_eq!(m.rows(), 2);
        assert_eq!(m.dimensions(), 3);
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_parse_f64_matrix_narrows() {
        let payload: Vec<u8> = [0.5f64, -1.0, 2.0, 0.25]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = encode_raw(
            "{'descr': '<f8', 'fortran_order': False, 'shape': (2, 2), }",
            &payload,
        );

        let m = parse_matrix(&bytes).unwrap();
        assert_eq!(m.row(0), &[0.5, -1.0]);
        assert_eq!(m.row(1), &[2.0, 0.25]);
    }

    #[test]
    fn test_parse_fortran_order_is_transposed() {
        // logical [[1, 2, 3], [4, 5, 6]] stored column by column
        let payload: Vec<u8> = [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let bytes = encode_raw(
            "{'descr': '<f4', 'fortran_order': True, 'shape': (2, 3), }",
            &payload,
        );

        let m = parse_matrix(&bytes).unwrap();
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rejects_missing_magic() {
        let result = parse_matrix(b"not a numpy file at all");
        assert!(matches!(result, Err(NpyError::InvalidFormat(_))));
    }

    #[test]
    fn test_rejects_header_without_shape() {
        let bytes = encode_raw("{'descr': '<f4', 'fortran_order': False, }", &[]);
        match parse_matrix(&bytes) {
            Err(NpyError::InvalidFormat(message)) => assert!(message.contains("'shape'")),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }

        // the same patterns keep matching on later reads
        let bytes = encode_f32(&[vec![1.0, 2.0]]);
        assert_eq!(parse_matrix(&bytes).unwrap().row(0), &[1.0, 2.0]);
    }

    #[test]
    fn test_rejects_unsupported_dtype() {
        let bytes = encode_raw(
            "{'descr': '<i8', 'fortran_order': False, 'shape': (1, 1), }",
            &7i64.to_le_bytes(),
        );
        assert!(matches!(
            parse_matrix(&bytes),
            Err(NpyError::UnsupportedDtype(d)) if d == "<i8"
        ));
    }

    #[test]
    fn test_rejects_one_dimensional_shape() {
        let bytes = encode_raw(
            "{'descr': '<f4', 'fortran_order': False, 'shape': (2,), }",
            &[0u8; 8],
        );
        assert!(matches!(parse_matrix(&bytes), Err(NpyError::BadShape(s)) if s == vec![2]));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let mut bytes = encode_f32(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            parse_matrix(&bytes),
            Err(NpyError::PayloadSize {
                expected: 16,
                got: 12
            })
        ));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = encode_f32(&[vec![1.0]]);
        bytes[6] = 9;
        assert!(matches!(
            parse_matrix(&bytes),
            Err(NpyError::UnsupportedVersion(9, 0))
        ));
    }

    #[test]
    fn test_read_matrix_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_matrix(&dir.path().join("missing.npy"));
        assert!(matches!(result, Err(NpyError::Io(_))));
    }
}
