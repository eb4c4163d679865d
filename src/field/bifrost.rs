//! Loader for the raw Bifrost field format: an ASCII `key : value` header
//! next to a flat little- or big-endian float32 data file.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::field::Field;

const HEADER_SEPARATOR: char = ':';

/// Loads a scalar field from a Bifrost (header, data) file pair.
///
/// The header must describe 3-dimensional row-major float32 data whose byte
/// order matches the host. Fails with `BadHeader` when required entries are
/// missing or unparsable and `BadFieldData` when an entry contradicts what
/// the loader supports.
pub fn create_field_from_bifrost_file(
    name: &str,
    data_path: &Path,
    header_path: &Path,
) -> Result<Field> {
    let header_text = std::fs::read_to_string(header_path).map_err(|err| {
        EngineError::BadHeader(format!("could not read {}: {}", header_path.display(), err))
    })?;
    let header = parse_header(&header_text);

    let element_kind = char_entry(&header, "element_kind")?;
    let element_size = int_entry(&header, "element_size")?;
    let endianness = char_entry(&header, "endianness")?;
    let dimensions = int_entry(&header, "dimensions")?;
    let order = char_entry(&header, "order")?;
    let size_x = int_entry(&header, "x_size")?;
    let size_y = int_entry(&header, "y_size")?;
    let size_z = int_entry(&header, "z_size")?;
    let dx = float_entry(&header, "dx")?;
    let dy = float_entry(&header, "dy")?;
    let dz = float_entry(&header, "dz")?;

    if element_kind != 'f' {
        return Err(EngineError::BadFieldData(
            "field data must be floating-point".to_string(),
        ));
    }
    if element_size != 4 {
        return Err(EngineError::BadFieldData(
            "field data must have 4-byte precision".to_string(),
        ));
    }
    let host_endianness = if cfg!(target_endian = "little") { 'l' } else { 'b' };
    if endianness != host_endianness {
        return Err(EngineError::BadFieldData(format!(
            "field data endianness '{}' does not match host '{}'",
            endianness, host_endianness
        )));
    }
    if dimensions != 3 {
        return Err(EngineError::BadFieldData(
            "field data must be 3D".to_string(),
        ));
    }
    if order != 'C' {
        return Err(EngineError::BadFieldData(
            "field data must be laid out in row-major order".to_string(),
        ));
    }
    if size_x < 2 || size_y < 2 || size_z < 2 {
        return Err(EngineError::BadFieldData(
            "field dimensions cannot be smaller than 2 along any axis".to_string(),
        ));
    }
    if dx <= 0.0 || dy <= 0.0 || dz <= 0.0 {
        return Err(EngineError::BadFieldData(
            "voxel extents must be positive".to_string(),
        ));
    }

    let size = [size_x as usize, size_y as usize, size_z as usize];
    let data = read_float32_file(data_path, size[0] * size[1] * size[2])?;

    Field::from_raw_data(name, data, size, [dx, dy, dz])
}

fn parse_header(text: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(HEADER_SEPARATOR) {
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    entries
}

fn raw_entry<'a>(header: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    header
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| EngineError::BadHeader(format!("missing required entry \"{}\"", key)))
}

fn char_entry(header: &HashMap<String, String>, key: &str) -> Result<char> {
    let value = raw_entry(header, key)?;
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(EngineError::BadHeader(format!(
            "entry \"{}\" is not a single character: \"{}\"",
            key, value
        ))),
    }
}

fn int_entry(header: &HashMap<String, String>, key: &str) -> Result<i64> {
    let value = raw_entry(header, key)?;
    value.parse().map_err(|_| {
        EngineError::BadHeader(format!("entry \"{}\" is not an integer: \"{}\"", key, value))
    })
}

fn float_entry(header: &HashMap<String, String>, key: &str) -> Result<f32> {
    let value = raw_entry(header, key)?;
    value.parse().map_err(|_| {
        EngineError::BadHeader(format!("entry \"{}\" is not a number: \"{}\"", key, value))
    })
}

fn read_float32_file(path: &Path, expected_length: usize) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path).map_err(|err| {
        EngineError::BadFieldData(format!("could not read {}: {}", path.display(), err))
    })?;

    if bytes.len() != expected_length * std::mem::size_of::<f32>() {
        return Err(EngineError::BadFieldData(format!(
            "data file holds {} bytes but the header promises {} float32 values",
            bytes.len(),
            expected_length
        )));
    }

    Ok(bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
