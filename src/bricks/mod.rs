/*
 * The volume data is subdivided into separate "bricks" before being
 * transferred to the GPU. This improves data locality on the GPU, and by
 * alternating the orientation of the bricks the memory access pattern can
 * be made more or less view independent (Weiskopf et al. (2004)
 * "Maintaining constant frame rates in 3D texture-based volume rendering").
 *
 * By storing bricks in a space-partitioning tree, they can be efficiently
 * sorted in back to front order when drawing, and invisible bricks can be
 * skipped (Salama and Kolb, 2005). Each brick is additionally subdivided
 * into even smaller parts, so that most of the empty regions can be skipped
 * (see Ruijters and Vilanova (2006) "Optimizing GPU Volume Rendering").
 */

pub(crate) mod layout;
pub mod tree;
pub mod types;

mod tests;

pub use types::{
    Brick, BrickOrientation, BrickTree, BrickTreeNode, BrickedField, RegionVisibility,
    SubBrickTree, SubBrickTreeNode,
};

use nalgebra::Vector3;

use crate::bricks::layout::{copy_subarray_with_cycled_layout, permuted_padded_size};
use crate::error::{EngineError, Result};
use crate::field::Field;
use crate::spatial::Aabb;

pub const DEFAULT_BRICK_SIZE: usize = 64;
pub const DEFAULT_KERNEL_SIZE: usize = 2;
pub const DEFAULT_MIN_SUB_BRICK_SIZE: usize = 6;

const MIN_PADDED_BRICK_SIZE: usize = 8;

/// Parameters of the bricking pipeline
#[derive(Clone, Copy, Debug)]
pub struct BrickingConfig {
    /// Requested unpadded brick size, a power of two
    pub brick_size: usize,
    /// Size of the GPU interpolation kernel; bricks are padded with
    /// `kernel_size - 1` voxels on each interior face
    pub kernel_size: usize,
    /// Sub-brick tree recursion stops before an axis span would drop below
    /// this size
    pub min_sub_brick_size: usize,
}

impl Default for BrickingConfig {
    fn default() -> Self {
        Self {
            brick_size: DEFAULT_BRICK_SIZE,
            kernel_size: DEFAULT_KERNEL_SIZE,
            min_sub_brick_size: DEFAULT_MIN_SUB_BRICK_SIZE,
        }
    }
}

impl BrickingConfig {
    fn validate(&self) -> Result<()> {
        if self.brick_size == 0 || !self.brick_size.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "requested brick size must be a power of two, got {}",
                self.brick_size
            )));
        }
        if self.kernel_size == 0 {
            return Err(EngineError::InvalidConfig(
                "kernel size must be positive".to_string(),
            ));
        }
        if self.min_sub_brick_size == 0 {
            return Err(EngineError::InvalidConfig(
                "minimum sub-brick size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits a field into padded bricks with cycled memory layout and builds
/// the brick tree and the per-brick sub-brick trees.
pub fn create_bricked_field(field: Field, config: &BrickingConfig) -> Result<BrickedField> {
    config.validate()?;

    let field_size = field.size();

    // The number of voxels to pad on each side is one less than the size of
    // the interpolation kernel. In the special case of a single brick that
    // exactly fits the field, no padding is needed.
    let mut pad_size = config.kernel_size - 1;
    if field_size.iter().all(|&s| s == config.brick_size) {
        pad_size = 0;
    }

    // Grow the unpadded brick size until the padded size is workable and
    // never smaller than the pad itself
    let mut brick_size = config.brick_size;
    while brick_size + 2 * pad_size < MIN_PADDED_BRICK_SIZE.max(3 * pad_size) {
        brick_size *= 2;
    }

    if field_size.iter().any(|&s| brick_size > s) {
        return Err(EngineError::InvalidConfig(format!(
            "brick dimensions ({0}, {0}, {0}) exceed field dimensions of {1:?}",
            brick_size, field_size
        )));
    }

    let n_bricks = [
        field_size[0].div_ceil(brick_size),
        field_size[1].div_ceil(brick_size),
        field_size[2].div_ceil(brick_size),
    ];

    // Values for all the bricks are stored in one shared array; each
    // interior brick boundary adds two pad layers per axis
    let padded_data_length = (0..3)
        .map(|axis| field_size[axis] + 2 * pad_size * (n_bricks[axis] - 1))
        .product();
    let mut data = vec![0.0f32; padded_data_length];

    let voxel_extent = field.voxel_extent();
    let lower_corner = field.lower_corner();
    let size_limit = 2 * config.min_sub_brick_size;

    let mut bricks = Vec::with_capacity(n_bricks[0] * n_bricks[1] * n_bricks[2]);
    let mut data_offset = 0;

    for k in 0..n_bricks[2] {
        for j in 0..n_bricks[1] {
            for i in 0..n_bricks[0] {
                // Cycling the orientation ensures no direct neighbours share
                // a storage layout
                let cycle = (i + j + k) % 3;
                let brick_idx = [i, j, k];

                let offset = [i * brick_size, j * brick_size, k * brick_size];

                // Truncate the brick size where it reaches the upper edges
                // of the field
                let size = [
                    brick_size.min(field_size[0] - offset[0]),
                    brick_size.min(field_size[1] - offset[1]),
                    brick_size.min(field_size[2] - offset[2]),
                ];

                // Only the faces interior to the field are padded
                let padded_size = std::array::from_fn(|axis| {
                    size[axis]
                        + (brick_idx[axis] > 0) as usize * pad_size
                        + (brick_idx[axis] < n_bricks[axis] - 1) as usize * pad_size
                });

                let data_length = padded_size[0] * padded_size[1] * padded_size[2];

                // Move the source offset down to include the padding data
                // unless this brick touches a lower field edge
                let src_offset = std::array::from_fn(|axis| {
                    offset[axis] - (brick_idx[axis] > 0) as usize * pad_size
                });

                copy_subarray_with_cycled_layout(
                    field.data(),
                    field_size[0],
                    field_size[1],
                    src_offset,
                    &mut data[data_offset..data_offset + data_length],
                    padded_size,
                    cycle,
                );

                let spatial_offset = lower_corner
                    + Vector3::new(
                        offset[0] as f32 * voxel_extent.x,
                        offset[1] as f32 * voxel_extent.y,
                        offset[2] as f32 * voxel_extent.z,
                    );
                let spatial_extent = Vector3::new(
                    size[0] as f32 * voxel_extent.x,
                    size[1] as f32 * voxel_extent.y,
                    size[2] as f32 * voxel_extent.z,
                );

                let pad_fractions = Vector3::new(
                    pad_size as f32 / padded_size[0] as f32,
                    pad_size as f32 / padded_size[1] as f32,
                    pad_size as f32 / padded_size[2] as f32,
                );

                let sub_tree = SubBrickTree::build(
                    offset,
                    size,
                    spatial_offset,
                    voxel_extent,
                    size_limit,
                );

                bricks.push(Brick {
                    data_offset,
                    data_length,
                    orientation: BrickOrientation::from_cycle(cycle),
                    offset,
                    size,
                    padded_size: permuted_padded_size(padded_size, cycle),
                    spatial: Aabb::new(spatial_offset, spatial_extent),
                    pad_fractions,
                    sub_tree,
                    texture: None,
                });

                data_offset += data_length;
            }
        }
    }

    let tree = BrickTree::build(&bricks, n_bricks);

    Ok(BrickedField {
        field,
        data,
        bricks,
        tree,
        n_bricks,
        brick_size,
        pad_size,
        field_boundary_indicator: None,
        brick_boundary_indicator: None,
        sub_brick_boundary_indicator: None,
    })
}
