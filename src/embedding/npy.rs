// src/embedding/npy.rs
// Minimal NPY v1.0 codec for the f32 matrices this service ships on disk.
// Only little-endian f32, C-order, 1-D or 2-D arrays are supported.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, ServiceError};

const MAGIC: &[u8] = b"\x93NUMPY";

/// A dense row-major f32 matrix loaded from or written to an .npy file.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(ServiceError::Data(format!(
                "matrix shape ({rows}, {cols}) does not match {} values",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Copy a contiguous block of rows.
    pub fn rows_slice(&self, start: usize, count: usize) -> Vec<Vec<f32>> {
        (start..start + count).map(|i| self.row(i).to_vec()).collect()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Read an NPY v1.x file into a Matrix. 1-D arrays load as a single row.
pub fn read_matrix(path: &Path) -> Result<Matrix> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    parse_matrix(&buf).map_err(|e| ServiceError::Data(format!("{}: {}", path.display(), e)))
}

fn parse_matrix(buf: &[u8]) -> std::result::Result<Matrix, String> {
    if buf.len() < 10 || &buf[..6] != MAGIC {
        return Err("not an NPY file".into());
    }
    let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
    let header_end = 10 + header_len;
    if buf.len() < header_end {
        return Err("truncated NPY header".into());
    }
    let header = std::str::from_utf8(&buf[10..header_end]).map_err(|_| "non-utf8 header")?;

    if !header.contains("'descr': '<f4'") && !header.contains("'descr':'<f4'") {
        return Err(format!("unsupported dtype in header: {header}"));
    }
    if header.contains("'fortran_order': True") {
        return Err("fortran-order arrays are not supported".into());
    }

    let shape = parse_shape(header)?;
    let (rows, cols) = match shape.len() {
        1 => (1, shape[0]),
        2 => (shape[0], shape[1]),
        n => return Err(format!("unsupported array rank {n}")),
    };

    let payload = &buf[header_end..];
    let expected = rows * cols * 4;
    if payload.len() < expected {
        return Err(format!(
            "payload holds {} bytes, shape needs {expected}",
            payload.len()
        ));
    }

    let mut data = Vec::with_capacity(rows * cols);
    for chunk in payload[..expected].chunks_exact(4) {
        data.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Matrix::new(rows, cols, data).map_err(|e| e.to_string())
}

fn parse_shape(header: &str) -> std::result::Result<Vec<usize>, String> {
    let start = header.find("'shape':").ok_or("missing shape key")?;
    let open = header[start..].find('(').ok_or("missing shape tuple")? + start;
    let close = header[open..].find(')').ok_or("unterminated shape tuple")? + open;
    header[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| format!("bad dim '{s}'")))
        .collect()
}

/// Write a Matrix as NPY v1.0 (used by tests and fixture tooling).
pub fn write_matrix(path: &Path, matrix: &Matrix) -> Result<()> {
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        matrix.rows, matrix.cols
    );
    // Pad so the data section starts 64-byte aligned, newline-terminated.
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut file = File::create(path)?;
    file.write_all(MAGIC)?;
    file.write_all(&[0x01, 0x00])?;
    file.write_all(&(header.len() as u16).to_le_bytes())?;
    file.write_all(header.as_bytes())?;
    for value in &matrix.data {
        file.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.npy");
        let matrix = Matrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        write_matrix(&path, &matrix).unwrap();
        let loaded = read_matrix(&path).unwrap();
        assert_eq!(loaded, matrix);
        assert_eq!(loaded.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_matrix(b"not an npy file at all").is_err());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        assert!(Matrix::new(2, 2, vec![1.0]).is_err());
    }
}
