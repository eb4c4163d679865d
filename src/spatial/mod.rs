/// As in: Look-up Tables
pub mod lut;

mod tests;

use nalgebra::Vector3;

use crate::spatial::lut::{BACK_CORNERS, CUBE_CORNERS, FRONT_CORNERS};

/// An axis aligned box given by its lower corner and its extent along each
/// axis, in model space.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub offset: Vector3<f32>,
    pub extent: Vector3<f32>,
}

impl Aabb {
    pub fn new(offset: Vector3<f32>, extent: Vector3<f32>) -> Self {
        Self { offset, extent }
    }

    /// Position of the given unit cube corner scaled into this box
    pub fn corner(&self, corner_idx: usize) -> Vector3<f32> {
        self.offset + self.extent.component_mul(&cube_corner(corner_idx))
    }

    pub fn volume(&self) -> f32 {
        self.extent.x * self.extent.y * self.extent.z
    }

    pub fn upper_corner(&self) -> Vector3<f32> {
        self.offset + self.extent
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        const EPS: f32 = 1e-5;
        let upper = self.upper_corner();
        let other_upper = other.upper_corner();
        (0..3).all(|axis| {
            other.offset[axis] >= self.offset[axis] - EPS
                && other_upper[axis] <= upper[axis] + EPS
        })
    }
}

pub fn cube_corner(corner_idx: usize) -> Vector3<f32> {
    let c = CUBE_CORNERS[corner_idx];
    Vector3::new(c[0], c[1], c[2])
}

/// Index of the unit cube corner first reached when moving along `direction`,
/// found from the sign pattern of the direction components.
pub fn back_corner_for_direction(direction: &Vector3<f32>) -> usize {
    BACK_CORNERS[(direction.x < 0.0) as usize][(direction.y < 0.0) as usize]
        [(direction.z < 0.0) as usize]
}

/// Index of the unit cube corner last reached when moving along `direction`
pub fn front_corner_for_direction(direction: &Vector3<f32>) -> usize {
    FRONT_CORNERS[(direction.x < 0.0) as usize][(direction.y < 0.0) as usize]
        [(direction.z < 0.0) as usize]
}
