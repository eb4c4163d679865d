//! Cycled memory layout for brick voxel data.
//!
//! A brick's storage order is one of three cyclic permutations of the field
//! axes; the permutation is driven by [`STORAGE_AXIS_ORDER`] instead of
//! separate hand-unrolled copy loops per cycle.

use crate::spatial::lut::STORAGE_AXIS_ORDER;

/// Copies a sub-region of `src` (row major, x fastest) into `dst` with the
/// axis order of the given cycle.
///
/// * `src_size_x`, `src_size_y` - x and y dimensions of the full source array
/// * `src_offset` - lower corner of the copied region within the source
/// * `dst_size` - size of the copied region, in field axis order
pub(crate) fn copy_subarray_with_cycled_layout(
    src: &[f32],
    src_size_x: usize,
    src_size_y: usize,
    src_offset: [usize; 3],
    dst: &mut [f32],
    dst_size: [usize; 3],
    cycle: usize,
) {
    debug_assert!(cycle < 3);
    debug_assert!(dst.len() == dst_size[0] * dst_size[1] * dst_size[2]);

    let storage_axes = STORAGE_AXIS_ORDER[cycle];
    let base_offset =
        (src_offset[2] * src_size_y + src_offset[1]) * src_size_x + src_offset[0];

    let mut coords = [0usize; 3];
    for k in 0..dst_size[2] {
        coords[2] = k;
        for j in 0..dst_size[1] {
            coords[1] = j;
            let row_offset = base_offset + (k * src_size_y + j) * src_size_x;
            for i in 0..dst_size[0] {
                coords[0] = i;
                let dst_idx = (coords[storage_axes[2]] * dst_size[storage_axes[1]]
                    + coords[storage_axes[1]])
                    * dst_size[storage_axes[0]]
                    + coords[storage_axes[0]];
                dst[dst_idx] = src[row_offset + i];
            }
        }
    }
}

/// Padded brick dimensions permuted into storage order, fastest axis first
pub(crate) fn permuted_padded_size(padded_size: [usize; 3], cycle: usize) -> [usize; 3] {
    let storage_axes = STORAGE_AXIS_ORDER[cycle];
    [
        padded_size[storage_axes[0]],
        padded_size[storage_axes[1]],
        padded_size[storage_axes[2]],
    ]
}
