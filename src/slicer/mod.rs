/*
 * The slicing of view aligned planes through a box is implemented in the
 * vertex shader, based on Salama and Kolb (2005) "A Vertex Program for
 * Efficient Box-Plane Intersection". This allows a large number of small
 * boxes to be sliced per frame since very little data has to be sent to
 * the GPU for each box.
 */


use nalgebra::Vector3;

use crate::bricks::types::{BrickTreeNode, SubBrickTreeNode, NO_NODE};
use crate::bricks::{Brick, BrickedField, RegionVisibility};
use crate::clip::ClipPlaneSet;
use crate::error::{EngineError, Result};
use crate::gpu::{GeometryHandle, GpuContext, PlaneVertex, PrimitiveKind, ProgramHandle};
use crate::shadergen::{ShaderSource, Uniform};
use crate::spatial;
use crate::spatial::lut::{
    CORNER_PERMUTATIONS, CUBE_CORNERS, EDGE_ENDS, EDGE_STARTS, OPPOSITE_CORNERS,
    ORIENTATION_PERMUTATIONS,
};
use crate::textures::VOLUME_TEXTURE_UNIT;
use crate::transform::Transformation;

pub const DEFAULT_LOWER_VISIBILITY_THRESHOLD: f32 = 0.0;
pub const DEFAULT_UPPER_VISIBILITY_THRESHOLD: f32 = 0.9;
pub const DEFAULT_PLANE_SEPARATION_MULTIPLIER: f32 = 1.0;

pub const SAMPLING_CORRECTION_UNIFORM: &str = "sampling_correction";

/// Vertices and triangle indices for a lazily grown stack of view aligned
/// slicing quads. Each plane is a fan of 6 potential hexagon corners; the
/// world positions come out of the vertex shader.
struct PlaneStack {
    n_planes: usize,
    geometry: Option<GeometryHandle>,
}

impl PlaneStack {
    fn new() -> Self {
        Self {
            n_planes: 0,
            geometry: None,
        }
    }

    fn grow(&mut self, gpu: &mut dyn GpuContext, n_planes: usize) -> Result<()> {
        let mut vertices = Vec::with_capacity(6 * n_planes);
        let mut indices = Vec::with_capacity(12 * n_planes);

        for plane_idx in 0..n_planes {
            for vertex_idx in 0..6u32 {
                vertices.push(PlaneVertex {
                    vertex_idx,
                    plane_idx: plane_idx as u32,
                });
            }

            let offset = (6 * plane_idx) as u32;
            for triangle in [[0, 2, 4], [0, 1, 2], [2, 3, 4], [4, 5, 0]] {
                indices.extend(triangle.map(|corner| offset + corner));
            }
        }

        if let Some(geometry) = self.geometry.take() {
            gpu.delete_geometry(geometry);
        }
        self.geometry = Some(gpu.create_plane_geometry(&vertices, &indices)?);
        self.n_planes = n_planes;
        Ok(())
    }
}

struct PlaneSeparation {
    value: f32,
    original_value: f32,
    multiplier: f32,
}

struct SlicerUniforms {
    plane_separation: Uniform,
    corners: Uniform,
    corner_permutations: Uniform,
    edge_starts: Uniform,
    edge_ends: Uniform,
    orientation_permutations: Uniform,
    brick_offset: Uniform,
    brick_extent: Uniform,
    pad_fractions: Uniform,
    sub_brick_offset: Uniform,
    sub_brick_extent: Uniform,
    back_plane_dist: Uniform,
    back_corner_idx: Uniform,
    orientation: Uniform,
    sampling_correction: Uniform,
}

impl SlicerUniforms {
    fn new() -> Self {
        Self {
            plane_separation: Uniform::new("plane_separation"),
            corners: Uniform::new("corners"),
            corner_permutations: Uniform::new("corner_permutations"),
            edge_starts: Uniform::new("edge_starts"),
            edge_ends: Uniform::new("edge_ends"),
            orientation_permutations: Uniform::new("orientation_permutations"),
            brick_offset: Uniform::new("brick_offset"),
            brick_extent: Uniform::new("brick_extent"),
            pad_fractions: Uniform::new("pad_fractions"),
            sub_brick_offset: Uniform::new("sub_brick_offset"),
            sub_brick_extent: Uniform::new("sub_brick_extent"),
            back_plane_dist: Uniform::new("back_plane_dist"),
            back_corner_idx: Uniform::new("back_corner_idx"),
            orientation: Uniform::new("orientation"),
            sampling_correction: Uniform::new(SAMPLING_CORRECTION_UNIFORM),
        }
    }
}

/// Runs the back-to-front traversal of the active bricked field and emits
/// one slab of slicing planes per visible sub-brick.
pub struct Slicer {
    plane_stack: PlaneStack,
    separation: PlaneSeparation,
    lower_visibility_threshold: f32,
    upper_visibility_threshold: f32,
    uniforms: SlicerUniforms,
    position_variable: usize,
}

impl Default for Slicer {
    fn default() -> Self {
        Self::new()
    }
}

impl Slicer {
    pub fn new() -> Self {
        Self {
            plane_stack: PlaneStack::new(),
            separation: PlaneSeparation {
                value: 0.0,
                original_value: 0.0,
                multiplier: 0.0,
            },
            lower_visibility_threshold: DEFAULT_LOWER_VISIBILITY_THRESHOLD,
            upper_visibility_threshold: DEFAULT_UPPER_VISIBILITY_THRESHOLD,
            uniforms: SlicerUniforms::new(),
            position_variable: 0,
        }
    }

    /// Number of the vertex shader variable holding the model-space plane
    /// vertex position, for other subsystems (clipping) to hook onto
    pub fn position_variable(&self) -> usize {
        self.position_variable
    }

    pub fn lower_visibility_threshold(&self) -> f32 {
        self.lower_visibility_threshold
    }

    pub fn upper_visibility_threshold(&self) -> f32 {
        self.upper_visibility_threshold
    }

    pub fn set_lower_visibility_threshold(&mut self, threshold: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) || threshold > self.upper_visibility_threshold {
            return Err(EngineError::InvalidConfig(format!(
                "lower visibility threshold {} must lie in [0, {}]",
                threshold, self.upper_visibility_threshold
            )));
        }
        self.lower_visibility_threshold = threshold;
        Ok(())
    }

    pub fn set_upper_visibility_threshold(&mut self, threshold: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) || threshold < self.lower_visibility_threshold {
            return Err(EngineError::InvalidConfig(format!(
                "upper visibility threshold {} must lie in [{}, 1]",
                threshold, self.lower_visibility_threshold
            )));
        }
        self.upper_visibility_threshold = threshold;
        Ok(())
    }

    pub fn plane_separation_multiplier(&self) -> f32 {
        self.separation.multiplier
    }

    pub fn max_plane_count(&self) -> usize {
        self.plane_stack.n_planes
    }

    /// Current sampling correction factor relative to the first configured
    /// separation
    pub fn sampling_correction(&self) -> f32 {
        if self.separation.original_value > 0.0 {
            self.separation.value / self.separation.original_value
        } else {
            1.0
        }
    }

    /// Derives the plane separation from the field's smallest voxel extent
    /// and grows the plane stack when a finer spacing needs more planes.
    pub fn set_plane_separation(
        &mut self,
        gpu: &mut dyn GpuContext,
        program: ProgramHandle,
        bricked: &BrickedField,
        spacing_multiplier: f32,
    ) -> Result<()> {
        if spacing_multiplier <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "plane spacing multiplier must be positive, got {}",
                spacing_multiplier
            )));
        }

        let voxel_extent = bricked.field().voxel_extent();
        let min_voxel_extent = voxel_extent.x.min(voxel_extent.y).min(voxel_extent.z);
        let voxel_diagonal = voxel_extent.norm();

        self.separation.value = min_voxel_extent * spacing_multiplier;
        self.separation.multiplier = spacing_multiplier;
        if self.separation.original_value == 0.0 {
            self.separation.original_value = self.separation.value;
        }

        let max_n_planes =
            (bricked.brick_size() as f32 * voxel_diagonal / self.separation.value) as usize + 1;
        if max_n_planes < 2 {
            return Err(EngineError::InvalidConfig(
                "cannot create fewer than two planes".to_string(),
            ));
        }

        if max_n_planes > self.plane_stack.n_planes {
            self.plane_stack.grow(gpu, max_n_planes)?;
        }

        gpu.bind_program(Some(program));
        set_f32(gpu, &self.uniforms.plane_separation, self.separation.value);
        set_f32(gpu, &self.uniforms.sampling_correction, self.sampling_correction());
        gpu.bind_program(None);
        Ok(())
    }

    /// Registers the box-plane intersection vertex code and the texture
    /// coordinate mapping, and declares the fragment-stage inputs the
    /// colour pipeline builds on.
    pub fn register_shader_code(
        &mut self,
        vertex_source: &mut ShaderSource,
        fragment_source: &mut ShaderSource,
        transformation_matrix_name: &str,
        look_axis_name: &str,
    ) -> Result<()> {
        vertex_source.add_vertex_input("uint", "vertex_idx", 0);
        vertex_source.add_vertex_input("uint", "plane_idx", 1);

        vertex_source.add_uniform("float", self.uniforms.plane_separation.name());
        vertex_source.add_array_uniform("vec3", self.uniforms.corners.name(), 8);
        vertex_source.add_array_uniform("uint", self.uniforms.corner_permutations.name(), 64);
        vertex_source.add_array_uniform("uint", self.uniforms.edge_starts.name(), 24);
        vertex_source.add_array_uniform("uint", self.uniforms.edge_ends.name(), 24);
        vertex_source.add_array_uniform("uint", self.uniforms.orientation_permutations.name(), 9);

        vertex_source.add_uniform("vec3", self.uniforms.brick_offset.name());
        vertex_source.add_uniform("vec3", self.uniforms.brick_extent.name());
        vertex_source.add_uniform("vec3", self.uniforms.pad_fractions.name());
        vertex_source.add_uniform("vec3", self.uniforms.sub_brick_offset.name());
        vertex_source.add_uniform("vec3", self.uniforms.sub_brick_extent.name());

        vertex_source.add_uniform("float", self.uniforms.back_plane_dist.name());
        vertex_source.add_uniform("uint", self.uniforms.back_corner_idx.name());
        vertex_source.add_uniform("uint", self.uniforms.orientation.name());

        let position_code = format!(
            "    float plane_dist = back_plane_dist + plane_idx*plane_separation;\n\
             \n\
             \x20   vec4 position;\n\
             \n\
             \x20   for (uint edge_idx = 0; edge_idx < 4; edge_idx++)\n\
             \x20   {{\n\
             \x20       uint edge_start_idx = edge_starts[4*vertex_idx + edge_idx];\n\
             \x20       uint edge_end_idx   = edge_ends[4*vertex_idx + edge_idx];\n\
             \n\
             \x20       vec3 edge_start = sub_brick_extent*corners[corner_permutations[8*back_corner_idx + edge_start_idx]];\n\
             \x20       vec3 edge_end   = sub_brick_extent*corners[corner_permutations[8*back_corner_idx + edge_end_idx]];\n\
             \n\
             \x20       vec3 edge_origin = edge_start + sub_brick_offset;\n\
             \x20       vec3 edge_vector = edge_end - edge_start;\n\
             \n\
             \x20       float denom = dot(edge_vector, {look_axis});\n\
             \x20       float lambda = (denom != 0.0) ? (plane_dist - dot(edge_origin, {look_axis}))/denom : -1.0;\n\
             \n\
             \x20       if (lambda >= 0.0 && lambda <= 1.0)\n\
             \x20       {{\n\
             \x20           position.xyz = edge_origin + lambda*edge_vector;\n\
             \x20           position.w = 1.0;\n\
             \x20           break;\n\
             \x20       }}\n\
             \x20   }}",
            look_axis = look_axis_name,
        );

        self.position_variable = vertex_source.add_snippet_variable(
            "vec4",
            "position",
            &position_code,
            &[
                "vertex_idx",
                "plane_idx",
                self.uniforms.plane_separation.name(),
                self.uniforms.corners.name(),
                self.uniforms.corner_permutations.name(),
                self.uniforms.edge_starts.name(),
                self.uniforms.edge_ends.name(),
                self.uniforms.sub_brick_offset.name(),
                self.uniforms.sub_brick_extent.name(),
                self.uniforms.back_plane_dist.name(),
                self.uniforms.back_corner_idx.name(),
                look_axis_name,
            ],
            &[],
        );

        vertex_source.assign_transformed_variable_to_output(
            transformation_matrix_name,
            self.position_variable,
            "gl_Position",
        )?;

        let tex_coord_code = format!(
            "    vec3 tex_coord;\n\
             \x20   vec3 position_within_brick = (variable_{position}.xyz - brick_offset)/brick_extent;\n\
             \x20   vec3 scale = vec3(1.0) - 2.0*pad_fractions;\n\
             \x20   for (uint component = 0; component < 3; component++)\n\
             \x20   {{\n\
             \x20       uint permuted_component = orientation_permutations[3*orientation + component];\n\
             \x20       tex_coord[component] = scale[permuted_component]*position_within_brick[permuted_component] + pad_fractions[permuted_component];\n\
             \x20   }}",
            position = self.position_variable,
        );

        let tex_coord_variable = vertex_source.add_snippet_variable(
            "vec3",
            "tex_coord",
            &tex_coord_code,
            &[
                self.uniforms.brick_offset.name(),
                self.uniforms.brick_extent.name(),
                self.uniforms.pad_fractions.name(),
                self.uniforms.orientation_permutations.name(),
                self.uniforms.orientation.name(),
            ],
            &[self.position_variable],
        );

        vertex_source.assign_variable_to_new_output("vec3", tex_coord_variable, "out_tex_coord")?;
        fragment_source.add_input("vec3", "out_tex_coord");
        fragment_source.add_uniform("float", SAMPLING_CORRECTION_UNIFORM);
        Ok(())
    }

    /// Resolves all uniform locations and uploads the constant geometry
    /// lookup tables
    pub fn load_uniforms(&mut self, gpu: &mut dyn GpuContext, program: ProgramHandle) {
        let uniforms = &mut self.uniforms;
        uniforms.plane_separation.load(gpu, program);
        uniforms.corners.load(gpu, program);
        uniforms.corner_permutations.load(gpu, program);
        uniforms.edge_starts.load(gpu, program);
        uniforms.edge_ends.load(gpu, program);
        uniforms.orientation_permutations.load(gpu, program);
        uniforms.brick_offset.load(gpu, program);
        uniforms.brick_extent.load(gpu, program);
        uniforms.pad_fractions.load(gpu, program);
        uniforms.sub_brick_offset.load(gpu, program);
        uniforms.sub_brick_extent.load(gpu, program);
        uniforms.back_plane_dist.load(gpu, program);
        uniforms.back_corner_idx.load(gpu, program);
        uniforms.orientation.load(gpu, program);
        uniforms.sampling_correction.load(gpu, program);

        gpu.bind_program(Some(program));
        if let Some(location) = uniforms.corners.location() {
            gpu.set_uniform_vec3_array(location, &CUBE_CORNERS);
        }
        if let Some(location) = uniforms.corner_permutations.location() {
            gpu.set_uniform_u32_array(location, &CORNER_PERMUTATIONS);
        }
        if let Some(location) = uniforms.edge_starts.location() {
            gpu.set_uniform_u32_array(location, &EDGE_STARTS);
        }
        if let Some(location) = uniforms.edge_ends.location() {
            gpu.set_uniform_u32_array(location, &EDGE_ENDS);
        }
        if let Some(location) = uniforms.orientation_permutations.location() {
            gpu.set_uniform_u32_array(location, &ORIENTATION_PERMUTATIONS);
        }
        gpu.bind_program(None);
    }

    /// Walks the brick tree of the field back to front and draws every
    /// sufficiently visible, unclipped sub-brick as a stack of planes.
    pub fn draw_bricked_field(
        &mut self,
        gpu: &mut dyn GpuContext,
        program: ProgramHandle,
        bricked: &mut BrickedField,
        transformation: &Transformation,
        clip_planes: &ClipPlaneSet,
    ) -> Result<()> {
        if self.plane_stack.n_planes == 0 {
            return Err(EngineError::InvalidConfig(
                "the plane separation has not been configured".to_string(),
            ));
        }

        let look_axis = transformation.look_axis();
        let back_corner_idx = spatial::back_corner_for_direction(&look_axis);
        let front_corner_idx = OPPOSITE_CORNERS[back_corner_idx];

        gpu.bind_program(Some(program));
        gpu.bind_geometry(self.plane_stack.geometry);
        set_u32(gpu, &self.uniforms.back_corner_idx, back_corner_idx as u32);

        let BrickedField {
            ref mut tree,
            ref mut bricks,
            ..
        } = *bricked;

        let mut traversal = Traversal {
            gpu: &mut *gpu,
            transformation,
            clip_planes,
            uniforms: &self.uniforms,
            look_axis,
            back_corner_idx,
            front_corner_idx,
            separation: self.separation.value,
            max_n_planes: self.plane_stack.n_planes,
            lower_threshold: self.lower_visibility_threshold,
            upper_threshold: self.upper_visibility_threshold,
        };
        traversal.draw_brick_tree_nodes(&mut tree.nodes, bricks, tree.root)?;

        gpu.bind_geometry(None);
        gpu.bind_program(None);
        Ok(())
    }
}

struct Traversal<'a> {
    gpu: &'a mut dyn GpuContext,
    transformation: &'a Transformation,
    clip_planes: &'a ClipPlaneSet,
    uniforms: &'a SlicerUniforms,
    look_axis: Vector3<f32>,
    back_corner_idx: usize,
    front_corner_idx: usize,
    separation: f32,
    max_n_planes: usize,
    lower_threshold: f32,
    upper_threshold: f32,
}

impl Traversal<'_> {
    fn draw_brick_tree_nodes(
        &mut self,
        nodes: &mut [BrickTreeNode],
        bricks: &mut [Brick],
        node_idx: u32,
    ) -> Result<()> {
        // An invisible region stops traversal of the whole branch
        if nodes[node_idx as usize].visibility_ratio <= self.lower_threshold {
            nodes[node_idx as usize].visibility = RegionVisibility::Invisible;
            return Ok(());
        }

        let (lower_child, upper_child, brick_idx, split_axis) = {
            let node = &nodes[node_idx as usize];
            (node.lower_child, node.upper_child, node.brick_idx, node.split_axis)
        };

        if lower_child == NO_NODE {
            self.draw_brick(&mut bricks[brick_idx as usize])?;
            nodes[node_idx as usize].visibility = RegionVisibility::Visible;
            return Ok(());
        }

        // Fully clipped children do not have to be drawn
        let lower_is_clipped = self.clip_planes.box_is_clipped(&nodes[lower_child as usize].spatial);
        let upper_is_clipped = self.clip_planes.box_is_clipped(&nodes[upper_child as usize].spatial);

        // The child on the camera side of the separating plane is closer,
        // so the other one is visited first
        let upper_offset = nodes[upper_child as usize].spatial.offset;
        let upper_is_closer = self
            .transformation
            .camera_delta_component(&upper_offset, split_axis)
            >= 0.0;

        let visit_order = if upper_is_closer {
            [(lower_child, lower_is_clipped), (upper_child, upper_is_clipped)]
        } else {
            [(upper_child, upper_is_clipped), (lower_child, lower_is_clipped)]
        };

        for (child, is_clipped) in visit_order {
            if is_clipped {
                nodes[child as usize].visibility = RegionVisibility::Clipped;
            } else {
                self.draw_brick_tree_nodes(nodes, bricks, child)?;
            }
        }

        nodes[node_idx as usize].visibility = RegionVisibility::Undetermined;
        Ok(())
    }

    fn draw_brick(&mut self, brick: &mut Brick) -> Result<()> {
        set_u32(self.gpu, &self.uniforms.orientation, brick.orientation.cycle() as u32);
        set_vec3(self.gpu, &self.uniforms.brick_offset, brick.spatial.offset);
        set_vec3(self.gpu, &self.uniforms.brick_extent, brick.spatial.extent);
        set_vec3(self.gpu, &self.uniforms.pad_fractions, brick.pad_fractions);

        let texture = brick.texture.ok_or_else(|| {
            EngineError::Gpu("cannot draw a brick whose texture was never created".to_string())
        })?;
        self.gpu.bind_texture_3d(VOLUME_TEXTURE_UNIT, texture);

        let root = brick.sub_tree.root;
        self.draw_sub_brick_tree_nodes(&mut brick.sub_tree.nodes, root);
        Ok(())
    }

    fn draw_sub_brick_tree_nodes(&mut self, nodes: &mut [SubBrickTreeNode], node_idx: u32) {
        if nodes[node_idx as usize].visibility_ratio <= self.lower_threshold {
            nodes[node_idx as usize].visibility = RegionVisibility::Invisible;
            return;
        }

        let (lower_child, upper_child, split_axis, ratio) = {
            let node = &nodes[node_idx as usize];
            (node.lower_child, node.upper_child, node.split_axis, node.visibility_ratio)
        };

        // A not-sufficiently-visible interior region is refined further;
        // leaves and sufficiently visible regions are drawn directly
        if ratio < self.upper_threshold && lower_child != NO_NODE {
            let lower_is_clipped =
                self.clip_planes.box_is_clipped(&nodes[lower_child as usize].spatial);
            let upper_is_clipped =
                self.clip_planes.box_is_clipped(&nodes[upper_child as usize].spatial);

            let upper_offset = nodes[upper_child as usize].spatial.offset;
            let upper_is_closer = self
                .transformation
                .camera_delta_component(&upper_offset, split_axis)
                >= 0.0;

            let visit_order = if upper_is_closer {
                [(lower_child, lower_is_clipped), (upper_child, upper_is_clipped)]
            } else {
                [(upper_child, upper_is_clipped), (lower_child, lower_is_clipped)]
            };

            for (child, is_clipped) in visit_order {
                if is_clipped {
                    nodes[child as usize].visibility = RegionVisibility::Clipped;
                } else {
                    self.draw_sub_brick_tree_nodes(nodes, child);
                }
            }

            nodes[node_idx as usize].visibility = RegionVisibility::Undetermined;
        } else {
            self.draw_sub_brick(&nodes[node_idx as usize]);
            nodes[node_idx as usize].visibility = RegionVisibility::Visible;
        }
    }

    /// Projects the sub-brick onto the look axis and submits the planes
    /// spanning its depth.
    ///
    /// The camera views along the negative look axis, so the corner with
    /// the smallest projection is the back corner and the projection
    /// difference to the front corner is the depth to cover:
    ///
    /// ```text
    ///  5   1   7   4   2   0   6   3
    /// -|---|---|---|---|---|---|---|-- look axis -->    <-- (> [camera]
    ///  ^
    /// back corner
    /// ```
    fn draw_sub_brick(&mut self, node: &SubBrickTreeNode) {
        set_vec3(self.gpu, &self.uniforms.sub_brick_offset, node.spatial.offset);
        set_vec3(self.gpu, &self.uniforms.sub_brick_extent, node.spatial.extent);

        let mut back_plane_dist = node.spatial.corner(self.back_corner_idx).dot(&self.look_axis);
        let front_plane_dist = node.spatial.corner(self.front_corner_idx).dot(&self.look_axis);

        // Offset the start distance by half a plane spacing so the first
        // plane gets a non-zero area
        back_plane_dist += 0.5 * self.separation;

        set_f32(self.gpu, &self.uniforms.back_plane_dist, back_plane_dist);

        // Planes needed to traverse the brick back to front, capped by the
        // stack size to absorb round-off
        let n_required_planes = ((((front_plane_dist - back_plane_dist) / self.separation).max(0.0))
            as usize
            + 1)
            .min(self.max_n_planes);

        self.gpu
            .draw_indexed(PrimitiveKind::Triangles, 0, 12 * n_required_planes);
    }
}

fn set_f32(gpu: &mut dyn GpuContext, uniform: &Uniform, value: f32) {
    if let Some(location) = uniform.location() {
        gpu.set_uniform_f32(location, value);
    }
}

fn set_u32(gpu: &mut dyn GpuContext, uniform: &Uniform, value: u32) {
    if let Some(location) = uniform.location() {
        gpu.set_uniform_u32(location, value);
    }
}

fn set_vec3(gpu: &mut dyn GpuContext, uniform: &Uniform, value: Vector3<f32>) {
    if let Some(location) = uniform.location() {
        gpu.set_uniform_vec3(location, value.into());
    }
}
