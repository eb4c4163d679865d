//! User clip planes and the axis-aligned-box culling test used during
//! traversal.
//!
//! Each plane clips away the half space behind it. The CPU-side cull only
//! has to inspect the front-most corner of a box with respect to the plane
//! normal: if even that corner is behind the plane, the whole box is.

use nalgebra::Vector3;

use crate::error::{EngineError, Result};
use crate::shadergen::ShaderSource;
use crate::spatial::{cube_corner, front_corner_for_direction, Aabb};

pub const MAX_CLIP_PLANES: usize = 3;

pub const ACTIVE_CLIP_PLANE_COUNT_UNIFORM: &str = "active_clip_plane_count";
pub const CLIP_PLANE_NORMALS_UNIFORM: &str = "clip_plane_normals";
pub const CLIP_PLANE_ORIGIN_DISTANCES_UNIFORM: &str = "clip_plane_origin_distances";

pub struct ClipPlaneSet {
    active_count: usize,
    origins: [Vector3<f32>; MAX_CLIP_PLANES],
    normals: [Vector3<f32>; MAX_CLIP_PLANES],
    origin_distances: [f32; MAX_CLIP_PLANES],
    front_corners: [usize; MAX_CLIP_PLANES],
}

impl Default for ClipPlaneSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipPlaneSet {
    pub fn new() -> Self {
        let mut planes = Self {
            active_count: 0,
            origins: [Vector3::zeros(); MAX_CLIP_PLANES],
            normals: [Vector3::zeros(); MAX_CLIP_PLANES],
            origin_distances: [0.0; MAX_CLIP_PLANES],
            front_corners: [0; MAX_CLIP_PLANES],
        };
        planes.reset();
        planes
    }

    /// Deactivates all planes and restores the default axis-aligned normals
    pub fn reset(&mut self) {
        self.active_count = 0;
        self.origins = [Vector3::zeros(); MAX_CLIP_PLANES];
        self.normals = [-Vector3::x(), -Vector3::y(), -Vector3::z()];
        for plane_idx in 0..MAX_CLIP_PLANES {
            self.recompute_derived(plane_idx);
        }
    }

    pub fn set_plane(
        &mut self,
        plane_idx: usize,
        origin: Vector3<f32>,
        normal: Vector3<f32>,
    ) -> Result<()> {
        if plane_idx >= MAX_CLIP_PLANES {
            return Err(EngineError::InvalidConfig(format!(
                "clip plane index {} exceeds the maximum of {}",
                plane_idx, MAX_CLIP_PLANES
            )));
        }
        if normal.norm_squared() < 1e-12 {
            return Err(EngineError::InvalidConfig(
                "clip plane normal must be non-zero".to_string(),
            ));
        }

        self.origins[plane_idx] = origin;
        self.normals[plane_idx] = normal.normalize();
        self.recompute_derived(plane_idx);
        Ok(())
    }

    pub fn set_active_count(&mut self, count: usize) -> Result<()> {
        if count > MAX_CLIP_PLANES {
            return Err(EngineError::InvalidConfig(format!(
                "cannot activate {} clip planes, the maximum is {}",
                count, MAX_CLIP_PLANES
            )));
        }
        self.active_count = count;
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn normals_array(&self) -> [[f32; 3]; MAX_CLIP_PLANES] {
        std::array::from_fn(|idx| self.normals[idx].into())
    }

    pub fn origin_distances(&self) -> [f32; MAX_CLIP_PLANES] {
        self.origin_distances
    }

    /// Whether the box lies entirely inside the clipped-away half space of
    /// any active plane
    pub fn box_is_clipped(&self, aabb: &Aabb) -> bool {
        for plane_idx in 0..self.active_count {
            let front_corner = aabb.offset
                + aabb
                    .extent
                    .component_mul(&cube_corner(self.front_corners[plane_idx]));

            if front_corner.dot(&self.normals[plane_idx]) < self.origin_distances[plane_idx] {
                return true;
            }
        }
        false
    }

    /// Registers the clip-distance snippet against the vertex position
    /// variable of the volume program
    pub fn register_shader_code(
        &self,
        source: &mut ShaderSource,
        position_variable: usize,
    ) -> Result<()> {
        source.add_clip_distance_output(MAX_CLIP_PLANES);
        source.add_uniform("uint", ACTIVE_CLIP_PLANE_COUNT_UNIFORM);
        source.add_array_uniform("vec3", CLIP_PLANE_NORMALS_UNIFORM, MAX_CLIP_PLANES);
        source.add_array_uniform("float", CLIP_PLANE_ORIGIN_DISTANCES_UNIFORM, MAX_CLIP_PLANES);

        let snippet = format!(
            "    uint clip_plane_idx;\n\
             \x20   for (clip_plane_idx = 0; clip_plane_idx < {count}; clip_plane_idx++)\n\
             \x20   {{\n\
             \x20       gl_ClipDistance[clip_plane_idx] = dot(variable_{position}.xyz, {normals}[clip_plane_idx]) - {distances}[clip_plane_idx];\n\
             \x20   }}\n\
             \x20   for (clip_plane_idx = {count}; clip_plane_idx < {max}; clip_plane_idx++)\n\
             \x20   {{\n\
             \x20       gl_ClipDistance[clip_plane_idx] = 1.0;\n\
             \x20   }}\n",
            count = ACTIVE_CLIP_PLANE_COUNT_UNIFORM,
            position = position_variable,
            normals = CLIP_PLANE_NORMALS_UNIFORM,
            distances = CLIP_PLANE_ORIGIN_DISTANCES_UNIFORM,
            max = MAX_CLIP_PLANES,
        );

        source.append_output_snippet(
            position_variable,
            &snippet,
            &[
                "gl_PerVertex",
                ACTIVE_CLIP_PLANE_COUNT_UNIFORM,
                CLIP_PLANE_NORMALS_UNIFORM,
                CLIP_PLANE_ORIGIN_DISTANCES_UNIFORM,
            ],
        )
    }

    fn recompute_derived(&mut self, plane_idx: usize) {
        self.origin_distances[plane_idx] = self.origins[plane_idx].dot(&self.normals[plane_idx]);
        self.front_corners[plane_idx] = front_corner_for_direction(&self.normals[plane_idx]);
    }
}
