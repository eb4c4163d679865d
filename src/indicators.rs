//! Wireframe boundary indicators for fields, bricks and sub-bricks.
//!
//! Indicators are named edge sets kept in a registry. The field boundary is
//! drawn in two passes split by face visibility so the front faces overlay
//! the volume; brick and sub-brick overlays only draw regions the last
//! traversal actually found visible.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::bricks::types::NO_NODE;
use crate::bricks::{BrickedField, RegionVisibility};
use crate::error::{EngineError, Result};
use crate::gpu::{GeometryHandle, GpuContext, IndicatorVertex, PrimitiveKind};
use crate::shadergen::ShaderSource;
use crate::spatial::lut::{
    ADJACENT_CUBE_FACES, CUBE_CORNERS, CUBE_EDGES, CUBE_FACE_LOOPS, CUBE_FACE_NORMAL_SIGNS,
};
use crate::transform::Transformation;

const BOUNDARY_INDICATOR_ALPHA: f32 = 0.15;

pub const FIELD_BOUNDARY_COLOR: [f32; 4] = [1.0, 1.0, 1.0, BOUNDARY_INDICATOR_ALPHA];
pub const BRICK_BOUNDARY_COLOR: [f32; 4] = [1.0, 1.0, 0.0, BOUNDARY_INDICATOR_ALPHA];
pub const SUB_BRICK_BOUNDARY_COLOR: [f32; 4] = [0.0, 1.0, 1.0, BOUNDARY_INDICATOR_ALPHA];

/// Which half of the face-visibility split of a boundary indicator to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPass {
    Back,
    Front,
}

/// A named wireframe edge set with uploaded geometry
pub struct Indicator {
    name: String,
    vertices: Vec<IndicatorVertex>,
    indices: Vec<u32>,
    geometry: Option<GeometryHandle>,
}

impl Indicator {
    fn new(name: String, n_vertices: usize, n_indices: usize) -> Self {
        Self {
            name,
            vertices: Vec::with_capacity(n_vertices),
            indices: Vec::with_capacity(n_indices),
            geometry: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[IndicatorVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn geometry(&self) -> Option<GeometryHandle> {
        self.geometry
    }

    /// Appends the 8 corners of a box, returning the first vertex index
    pub fn push_cube_vertices(&mut self, lower_corner: Vector3<f32>, extent: Vector3<f32>) -> usize {
        let start_vertex = self.vertices.len();
        for corner in CUBE_CORNERS {
            let position = lower_corner + extent.component_mul(&Vector3::from(corner));
            self.vertices.push(IndicatorVertex {
                position: [position.x, position.y, position.z, 1.0],
                color: [0.0, 0.0, 0.0, 1.0],
            });
        }
        start_vertex
    }

    /// Appends the 12 cube edges over vertices starting at `start_vertex`,
    /// returning the first index position
    pub fn push_cube_edges(&mut self, start_vertex: usize) -> usize {
        let first_index = self.indices.len();
        for edge in CUBE_EDGES {
            self.indices.push((start_vertex + edge[0]) as u32);
            self.indices.push((start_vertex + edge[1]) as u32);
        }
        first_index
    }

    /// Appends the corner loop of each cube face (4 indices per face) so
    /// faces can be drawn individually as line loops
    pub fn push_cube_face_loops(&mut self, start_vertex: usize) -> usize {
        let first_index = self.indices.len();
        for face_loop in CUBE_FACE_LOOPS {
            for corner in face_loop {
                self.indices.push((start_vertex + corner) as u32);
            }
        }
        first_index
    }

    pub fn set_vertex_colors(&mut self, start_vertex: usize, n_vertices: usize, color: [f32; 4]) {
        for vertex in &mut self.vertices[start_vertex..start_vertex + n_vertices] {
            vertex.color = color;
        }
    }
}

/// Owns all indicators and their GPU geometry
#[derive(Default)]
pub struct IndicatorRegistry {
    indicators: HashMap<String, Indicator>,
    created_count: usize,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty indicator under a unique generated name
    pub fn create(&mut self, name_prefix: &str, n_vertices: usize, n_indices: usize) -> String {
        let name = format!("{}_{}", name_prefix, self.created_count);
        self.created_count += 1;
        self.indicators
            .insert(name.clone(), Indicator::new(name.clone(), n_vertices, n_indices));
        name
    }

    pub fn get(&self, name: &str) -> Result<&Indicator> {
        self.indicators
            .get(name)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Indicator> {
        self.indicators
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))
    }

    /// Uploads (or re-uploads) the indicator's geometry
    pub fn upload(&mut self, gpu: &mut dyn GpuContext, name: &str) -> Result<()> {
        let indicator = self
            .indicators
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))?;

        if let Some(geometry) = indicator.geometry.take() {
            gpu.delete_geometry(geometry);
        }
        indicator.geometry =
            Some(gpu.create_indicator_geometry(&indicator.vertices, &indicator.indices)?);
        Ok(())
    }

    pub fn destroy(&mut self, gpu: &mut dyn GpuContext, name: &str) -> Result<()> {
        let indicator = self
            .indicators
            .remove(name)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))?;
        if let Some(geometry) = indicator.geometry {
            gpu.delete_geometry(geometry);
        }
        Ok(())
    }

    pub fn cleanup(&mut self, gpu: &mut dyn GpuContext) {
        for (_, indicator) in self.indicators.drain() {
            if let Some(geometry) = indicator.geometry {
                gpu.delete_geometry(geometry);
            }
        }
    }
}

/// Registers the pass-through colour shader of the indicator program
pub fn register_indicator_shader_code(
    vertex_source: &mut ShaderSource,
    fragment_source: &mut ShaderSource,
    transformation_matrix_name: &str,
) -> Result<()> {
    vertex_source.add_vertex_input("vec4", "in_position", 0);
    vertex_source.add_vertex_input("vec4", "in_color", 1);
    vertex_source.add_uniform("mat4", transformation_matrix_name);

    let position =
        vertex_source.add_matrix_transformed_variable(transformation_matrix_name, "in_position");
    vertex_source.assign_variable_to_output(position, "gl_Position")?;
    vertex_source.assign_input_to_new_output("vec4", "in_color", "ex_color");

    fragment_source.add_input("vec4", "ex_color");
    fragment_source.assign_input_to_new_output("vec4", "ex_color", "out_color");
    Ok(())
}

/// Builds the field bounding-box indicator and records its name on the
/// bricked field
pub fn create_field_boundary_indicator(
    registry: &mut IndicatorRegistry,
    gpu: &mut dyn GpuContext,
    bricked: &mut BrickedField,
) -> Result<()> {
    let name = registry.create("field_boundaries", 8, 24);
    let indicator = registry.get_mut(&name)?;

    let half_extent = bricked.field().half_extent();
    let start_vertex = indicator.push_cube_vertices(-half_extent, 2.0 * half_extent);
    indicator.push_cube_face_loops(start_vertex);
    indicator.set_vertex_colors(start_vertex, 8, FIELD_BOUNDARY_COLOR);

    registry.upload(gpu, &name)?;
    bricked.field_boundary_indicator = Some(name);
    Ok(())
}

/// Builds one edge set covering every brick boundary
pub fn create_brick_boundary_indicator(
    registry: &mut IndicatorRegistry,
    gpu: &mut dyn GpuContext,
    bricked: &mut BrickedField,
) -> Result<()> {
    let n_bricks = bricked.brick_count();
    let name = registry.create("brick_boundaries", 8 * n_bricks, 24 * n_bricks);
    let indicator = registry.get_mut(&name)?;

    for brick in &bricked.bricks {
        let start_vertex = indicator.push_cube_vertices(brick.spatial.offset, brick.spatial.extent);
        indicator.push_cube_edges(start_vertex);
        indicator.set_vertex_colors(start_vertex, 8, BRICK_BOUNDARY_COLOR);
    }

    registry.upload(gpu, &name)?;
    bricked.brick_boundary_indicator = Some(name);
    Ok(())
}

/// Builds one edge set covering every sub-brick tree node and remembers
/// each node's index range for the visibility-gated draw
pub fn create_sub_brick_boundary_indicator(
    registry: &mut IndicatorRegistry,
    gpu: &mut dyn GpuContext,
    bricked: &mut BrickedField,
) -> Result<()> {
    let n_sub_bricks: usize = bricked.bricks.iter().map(|brick| brick.sub_tree.len()).sum();
    let name = registry.create("sub_brick_boundaries", 8 * n_sub_bricks, 24 * n_sub_bricks);
    let indicator = registry.get_mut(&name)?;

    for brick in &mut bricked.bricks {
        let root = brick.sub_tree.root;
        push_sub_brick_indicator_data(&mut brick.sub_tree.nodes, root, indicator);
    }

    registry.upload(gpu, &name)?;
    bricked.sub_brick_boundary_indicator = Some(name);
    Ok(())
}

fn push_sub_brick_indicator_data(
    nodes: &mut [crate::bricks::SubBrickTreeNode],
    node_idx: u32,
    indicator: &mut Indicator,
) {
    let (lower_child, upper_child) = {
        let node = &nodes[node_idx as usize];
        (node.lower_child, node.upper_child)
    };

    if lower_child != NO_NODE {
        push_sub_brick_indicator_data(nodes, lower_child, indicator);
        push_sub_brick_indicator_data(nodes, upper_child, indicator);
    }

    let node = &mut nodes[node_idx as usize];
    node.indicator_first_index = indicator.indices.len();
    let start_vertex = indicator.push_cube_vertices(node.spatial.offset, node.spatial.extent);
    indicator.push_cube_edges(start_vertex);
    indicator.set_vertex_colors(start_vertex, 8, SUB_BRICK_BOUNDARY_COLOR);
}

/// Draws the three faces adjacent to the reference corner that point toward
/// (front pass) or away from (back pass) the camera
pub fn draw_field_boundary_indicator(
    registry: &IndicatorRegistry,
    gpu: &mut dyn GpuContext,
    bricked: &BrickedField,
    transformation: &Transformation,
    reference_corner_idx: usize,
    pass: IndicatorPass,
) -> Result<()> {
    debug_assert!(reference_corner_idx < 8);

    let Some(name) = bricked.field_boundary_indicator.as_deref() else {
        return Ok(());
    };
    let indicator = registry.get(name)?;
    gpu.bind_geometry(indicator.geometry());

    let reference_corner = indicator.vertices()[reference_corner_idx].position;
    let reference_corner = Vector3::new(reference_corner[0], reference_corner[1], reference_corner[2]);

    let mut face_is_visible = [false; 6];
    for dim in 0..3 {
        let adjacent_face_idx = ADJACENT_CUBE_FACES[reference_corner_idx][dim];
        face_is_visible[adjacent_face_idx] = CUBE_FACE_NORMAL_SIGNS[adjacent_face_idx]
            * transformation.camera_delta_component(&reference_corner, dim)
            >= 0.0;
    }

    for (face_idx, &is_visible) in face_is_visible.iter().enumerate() {
        let draw_in_this_pass = match pass {
            IndicatorPass::Front => is_visible,
            IndicatorPass::Back => !is_visible,
        };
        if draw_in_this_pass {
            gpu.draw_indexed(PrimitiveKind::LineLoop, 4 * face_idx, 4);
        }
    }

    gpu.bind_geometry(None);
    Ok(())
}

/// Draws the boundaries of all bricks
pub fn draw_brick_boundary_indicator(
    registry: &IndicatorRegistry,
    gpu: &mut dyn GpuContext,
    bricked: &BrickedField,
) -> Result<()> {
    let Some(name) = bricked.brick_boundary_indicator.as_deref() else {
        return Ok(());
    };
    let indicator = registry.get(name)?;

    gpu.bind_geometry(indicator.geometry());
    gpu.draw_indexed(PrimitiveKind::Lines, 0, indicator.indices().len());
    gpu.bind_geometry(None);
    Ok(())
}

/// Draws the boundaries of the sub-bricks the last traversal marked
/// visible, skipping invisible and clipped branches
pub fn draw_sub_brick_boundary_indicator(
    registry: &IndicatorRegistry,
    gpu: &mut dyn GpuContext,
    bricked: &BrickedField,
) -> Result<()> {
    let Some(name) = bricked.sub_brick_boundary_indicator.as_deref() else {
        return Ok(());
    };
    let indicator = registry.get(name)?;
    gpu.bind_geometry(indicator.geometry());

    draw_visible_brick_boundaries(bricked, gpu, bricked.tree().root());

    gpu.bind_geometry(None);
    Ok(())
}

fn draw_visible_brick_boundaries(bricked: &BrickedField, gpu: &mut dyn GpuContext, node_idx: u32) {
    let node = bricked.tree().node(node_idx);

    if node.visibility == RegionVisibility::Invisible || node.visibility == RegionVisibility::Clipped
    {
        return;
    }

    if node.is_leaf() {
        let brick = &bricked.bricks()[node.brick_idx as usize];
        draw_visible_sub_brick_boundaries(brick, gpu, brick.sub_tree.root);
    } else {
        draw_visible_brick_boundaries(bricked, gpu, node.lower_child);
        draw_visible_brick_boundaries(bricked, gpu, node.upper_child);
    }
}

fn draw_visible_sub_brick_boundaries(
    brick: &crate::bricks::Brick,
    gpu: &mut dyn GpuContext,
    node_idx: u32,
) {
    let node = brick.sub_tree.node(node_idx);

    match node.visibility {
        RegionVisibility::Invisible | RegionVisibility::Clipped => {}
        RegionVisibility::Visible => {
            gpu.draw_indexed(PrimitiveKind::Lines, node.indicator_first_index, 24);
        }
        RegionVisibility::Undetermined => {
            if !node.is_leaf() {
                draw_visible_sub_brick_boundaries(brick, gpu, node.lower_child);
                draw_visible_sub_brick_boundaries(brick, gpu, node.upper_child);
            }
        }
    }
}

#[cfg(test)]
mod indicator_tests {
    use super::*;
    use crate::bricks::{create_bricked_field, BrickingConfig};
    use crate::field::Field;
    use crate::gpu::HeadlessGpu;

    fn bricked_test_field() -> BrickedField {
        let data = (0..16 * 16 * 16).map(|i| (i % 13) as f32).collect();
        let field = Field::from_raw_data("indicator", data, [16, 16, 16], [1.0, 1.0, 1.0])
            .ok()
            .unwrap();
        create_bricked_field(
            field,
            &BrickingConfig {
                brick_size: 8,
                min_sub_brick_size: 2,
                ..BrickingConfig::default()
            },
        )
        .ok()
        .unwrap()
    }

    #[test]
    fn test_field_boundary_indicator_shape() {
        let mut gpu = HeadlessGpu::new();
        let mut registry = IndicatorRegistry::new();
        let mut bricked = bricked_test_field();

        create_field_boundary_indicator(&mut registry, &mut gpu, &mut bricked).ok().unwrap();

        let name = bricked.field_boundary_indicator.as_deref().unwrap();
        let indicator = registry.get(name).ok().unwrap();

        assert!(indicator.vertices().len() == 8);
        // 6 faces of 4 loop indices each
        assert!(indicator.indices().len() == 24);
        assert!(indicator.geometry().is_some());
        assert!(indicator.vertices().iter().all(|v| v.color == FIELD_BOUNDARY_COLOR));
    }

    #[test]
    fn test_brick_boundary_indicator_covers_all_bricks() {
        let mut gpu = HeadlessGpu::new();
        let mut registry = IndicatorRegistry::new();
        let mut bricked = bricked_test_field();

        create_brick_boundary_indicator(&mut registry, &mut gpu, &mut bricked).ok().unwrap();

        let name = bricked.brick_boundary_indicator.as_deref().unwrap();
        let indicator = registry.get(name).ok().unwrap();
        assert!(indicator.vertices().len() == 8 * bricked.brick_count());
        assert!(indicator.indices().len() == 24 * bricked.brick_count());
    }

    #[test]
    fn test_sub_brick_indicator_assigns_disjoint_index_ranges() {
        let mut gpu = HeadlessGpu::new();
        let mut registry = IndicatorRegistry::new();
        let mut bricked = bricked_test_field();

        create_sub_brick_boundary_indicator(&mut registry, &mut gpu, &mut bricked).ok().unwrap();

        let mut first_indices = Vec::new();
        for brick in bricked.bricks() {
            for idx in 0..brick.sub_tree().len() as u32 {
                first_indices.push(brick.sub_tree().node(idx).indicator_first_index);
            }
        }
        first_indices.sort_unstable();
        for pair in first_indices.windows(2) {
            assert!(pair[1] - pair[0] == 24);
        }
    }

    #[test]
    fn test_field_boundary_passes_split_faces() {
        let mut gpu = HeadlessGpu::new();
        let mut registry = IndicatorRegistry::new();
        let mut bricked = bricked_test_field();
        let mut transformation = Transformation::new();
        transformation.set_view_distance(2.0);

        create_field_boundary_indicator(&mut registry, &mut gpu, &mut bricked).ok().unwrap();

        draw_field_boundary_indicator(
            &registry,
            &mut gpu,
            &bricked,
            &transformation,
            0,
            IndicatorPass::Back,
        )
        .ok()
        .unwrap();
        let back_draws = gpu.draw_count();

        draw_field_boundary_indicator(
            &registry,
            &mut gpu,
            &bricked,
            &transformation,
            7,
            IndicatorPass::Front,
        )
        .ok()
        .unwrap();
        let front_draws = gpu.draw_count() - back_draws;

        // each pass draws a subset of the 6 faces; together with the
        // opposite corner they cover the silhouette
        assert!(back_draws >= 3);
        assert!(front_draws >= 1);
        assert!(gpu.draws.iter().all(|d| d.primitive == PrimitiveKind::LineLoop));
    }

    #[test]
    fn test_missing_indicator_name_is_an_error() {
        let registry = IndicatorRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(crate::error::EngineError::UnknownName(_))
        ));
    }
}
