pub mod bifrost;

mod tests;

use nalgebra::Vector3;

use crate::error::{EngineError, Result};

/// A normalised scalar volume.
///
/// Voxel values are rescaled to `[0, 1]` on construction; the original value
/// range is kept so that user input given in field units can be mapped to
/// texture units and back. Spatial extents are normalised so the largest
/// half extent of the bounding box is 1, centering the volume on the origin.
pub struct Field {
    name: String,
    data: Vec<f32>,
    size: [usize; 3],
    half_extent: Vector3<f32>,
    voxel_extent: Vector3<f32>,
    min_value: f32,
    max_value: f32,
}

impl Field {
    /// Wraps raw row-major (x fastest) voxel data into a normalised field.
    ///
    /// `voxel_spacing` is the physical size of one voxel along each axis.
    pub fn from_raw_data(
        name: impl Into<String>,
        mut data: Vec<f32>,
        size: [usize; 3],
        voxel_spacing: [f32; 3],
    ) -> Result<Self> {
        if size.iter().any(|&s| s < 2) {
            return Err(EngineError::BadFieldData(format!(
                "field dimensions cannot be smaller than 2 along any axis, got {:?}",
                size
            )));
        }
        if voxel_spacing.iter().any(|&d| d <= 0.0) {
            return Err(EngineError::BadFieldData(format!(
                "voxel extents must be positive, got {:?}",
                voxel_spacing
            )));
        }
        let length = size[0] * size[1] * size[2];
        if data.len() != length {
            return Err(EngineError::BadFieldData(format!(
                "data length {} does not match dimensions {:?}",
                data.len(),
                size
            )));
        }

        let physical_extent = Vector3::new(
            voxel_spacing[0] * size[0] as f32,
            voxel_spacing[1] * size[1] as f32,
            voxel_spacing[2] * size[2] as f32,
        );
        let max_physical_extent = physical_extent.max();
        let half_extent = physical_extent / max_physical_extent;
        let voxel_extent = Vector3::new(
            2.0 * half_extent.x / size[0] as f32,
            2.0 * half_extent.y / size[1] as f32,
            2.0 * half_extent.z / size[2] as f32,
        );

        let (min_value, max_value) = float_slice_limits(&data);
        if max_value <= min_value {
            return Err(EngineError::BadFieldData(
                "field values are constant, cannot normalise".to_string(),
            ));
        }
        scale_float_slice(&mut data, min_value, max_value);

        Ok(Self {
            name: name.into(),
            data,
            size,
            half_extent,
            voxel_extent,
            min_value,
            max_value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Unit-normalised half extents of the bounding box, largest component 1
    pub fn half_extent(&self) -> Vector3<f32> {
        self.half_extent
    }

    /// Model-space extent of a single voxel along each axis
    pub fn voxel_extent(&self) -> Vector3<f32> {
        self.voxel_extent
    }

    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    /// Model-space position of the lower corner of the bounding box
    pub fn lower_corner(&self) -> Vector3<f32> {
        -self.half_extent
    }

    pub fn voxel(&self, x: usize, y: usize, z: usize) -> f32 {
        debug_assert!(x < self.size[0] && y < self.size[1] && z < self.size[2]);
        self.data[(z * self.size[1] + y) * self.size[0] + x]
    }

    /// Maps a value in field units to the normalised texture range
    pub fn field_value_to_texture_value(&self, field_value: f32) -> f32 {
        (field_value - self.min_value) / (self.max_value - self.min_value)
    }

    /// Maps a normalised texture value back to field units
    pub fn texture_value_to_field_value(&self, texture_value: f32) -> f32 {
        self.min_value + texture_value * (self.max_value - self.min_value)
    }

    /// Clamps all voxels to the `[lower, upper]` interval given in field
    /// units and re-normalises the remaining range to `[0, 1]`.
    pub fn clip_values(&mut self, lower: f32, upper: f32) -> Result<()> {
        if upper <= lower {
            return Err(EngineError::InvalidConfig(format!(
                "clip range upper bound {} must exceed lower bound {}",
                upper, lower
            )));
        }

        let lower_tex = self.field_value_to_texture_value(lower).clamp(0.0, 1.0);
        let upper_tex = self.field_value_to_texture_value(upper).clamp(0.0, 1.0);
        if upper_tex <= lower_tex {
            return Err(EngineError::InvalidConfig(
                "clip range lies outside the field value range".to_string(),
            ));
        }

        let scale = 1.0 / (upper_tex - lower_tex);
        for value in &mut self.data {
            *value = (value.clamp(lower_tex, upper_tex) - lower_tex) * scale;
        }

        let full_range = self.max_value - self.min_value;
        self.max_value = self.min_value + upper_tex * full_range;
        self.min_value += lower_tex * full_range;
        Ok(())
    }
}

fn float_slice_limits(values: &[f32]) -> (f32, f32) {
    debug_assert!(!values.is_empty());
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for &value in values {
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
    }
    (min, max)
}

fn scale_float_slice(values: &mut [f32], zero_value: f32, unity_value: f32) {
    debug_assert!(unity_value > zero_value);
    let scale = 1.0 / (unity_value - zero_value);
    for value in values {
        *value = (*value - zero_value) * scale;
    }
}
