//! The GPU-API seam of the renderer core.
//!
//! The core never talks to a graphics API directly; everything it needs is
//! captured by [`GpuContext`] so that a desktop OpenGL backend and a
//! wgpu-style backend can both be plugged in without touching the core. The
//! crate ships [`HeadlessGpu`], a recording backend used by the tests and
//! benches to observe exactly what a real backend would be asked to do.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::error::Result;

/// Handle to a GPU texture object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u32);

/// Handle to an uploaded vertex/index buffer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub(crate) u32);

/// Location of a uniform within a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation(pub(crate) i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Linear,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureWrap {
    ClampToEdge,
    ClampToBorder,
}

/// Creation parameters of a single-channel float 3D texture
#[derive(Debug, Clone, Copy)]
pub struct Texture3dDesc {
    /// Texel counts, fastest varying dimension first
    pub size: [usize; 3],
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap: TextureWrap,
    pub border_value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Triangles,
    Lines,
    LineLoop,
}

/// Per-vertex attributes of the plane stack: which of the six hexagon
/// corners this vertex is, and which slicing plane it belongs to. The
/// world-space position is reconstructed in the vertex shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PlaneVertex {
    pub vertex_idx: u32,
    pub plane_idx: u32,
}

/// Position and colour of one wireframe indicator vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct IndicatorVertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
}

/// Everything the renderer core asks of a graphics backend.
///
/// Errors returned from trait methods are treated as fatal by the renderer
/// driver; a silently broken backend is worse than a crash.
pub trait GpuContext {
    fn create_texture_3d(&mut self, desc: &Texture3dDesc, data: &[f32]) -> Result<TextureHandle>;

    /// Creates a linearly filtered, clamp-to-edge RGBA 1D texture
    fn create_texture_1d_rgba(&mut self, n_texels: usize, data: &[f32]) -> Result<TextureHandle>;

    fn update_texture_1d_rgba(&mut self, texture: TextureHandle, data: &[f32]) -> Result<()>;

    fn delete_texture(&mut self, texture: TextureHandle);

    fn create_plane_geometry(
        &mut self,
        vertices: &[PlaneVertex],
        indices: &[u32],
    ) -> Result<GeometryHandle>;

    fn create_indicator_geometry(
        &mut self,
        vertices: &[IndicatorVertex],
        indices: &[u32],
    ) -> Result<GeometryHandle>;

    fn update_indicator_geometry(
        &mut self,
        geometry: GeometryHandle,
        vertices: &[IndicatorVertex],
    ) -> Result<()>;

    fn delete_geometry(&mut self, geometry: GeometryHandle);

    fn compile_program(&mut self, vertex_source: &str, fragment_source: &str)
        -> Result<ProgramHandle>;

    fn delete_program(&mut self, program: ProgramHandle);

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    fn bind_program(&mut self, program: Option<ProgramHandle>);
    fn bind_geometry(&mut self, geometry: Option<GeometryHandle>);
    fn bind_texture_3d(&mut self, unit: u32, texture: TextureHandle);
    fn bind_texture_1d(&mut self, unit: u32, texture: TextureHandle);

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32);
    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32);
    fn set_uniform_u32(&mut self, location: UniformLocation, value: u32);
    fn set_uniform_vec3(&mut self, location: UniformLocation, value: [f32; 3]);
    /// Matrix given in column-major order
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: [[f32; 4]; 4]);
    fn set_uniform_f32_array(&mut self, location: UniformLocation, values: &[f32]);
    fn set_uniform_u32_array(&mut self, location: UniformLocation, values: &[u32]);
    fn set_uniform_vec3_array(&mut self, location: UniformLocation, values: &[[f32; 3]]);

    fn set_clear_color(&mut self, color: [f32; 4]);
    fn set_alpha_blending(&mut self, enabled: bool);
    fn set_depth_test(&mut self, enabled: bool);
    fn clear(&mut self);

    fn draw_indexed(&mut self, primitive: PrimitiveKind, first_index: usize, index_count: usize);
}

/// One draw call as seen by the headless backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    pub primitive: PrimitiveKind,
    pub first_index: usize,
    pub index_count: usize,
    pub program: Option<ProgramHandle>,
    pub bound_texture_3d: Option<TextureHandle>,
}

/// Recording backend without a GPU behind it.
///
/// Hands out handles, remembers resource sizes and logs every draw call so
/// tests can assert on the submitted stream.
#[derive(Default)]
pub struct HeadlessGpu {
    next_handle: u32,
    textures_3d: HashMap<u32, [usize; 3]>,
    textures_1d: HashMap<u32, usize>,
    geometries: HashMap<u32, usize>,
    programs: HashMap<u32, (String, String)>,
    uniform_locations: HashMap<(u32, String), UniformLocation>,
    next_uniform_location: i32,
    bound_program: Option<ProgramHandle>,
    bound_geometry: Option<GeometryHandle>,
    bound_texture_3d: Option<TextureHandle>,
    bound_texture_1d: Option<TextureHandle>,
    pub draws: Vec<DrawRecord>,
    pub clear_count: usize,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    pub fn reset_draws(&mut self) {
        self.draws.clear();
    }

    pub fn program_sources(&self, program: ProgramHandle) -> Option<&(String, String)> {
        self.programs.get(&program.0)
    }

    pub fn texture_3d_size(&self, texture: TextureHandle) -> Option<[usize; 3]> {
        self.textures_3d.get(&texture.0).copied()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures_3d.len() + self.textures_1d.len()
    }

    pub fn bound_texture_1d(&self) -> Option<TextureHandle> {
        self.bound_texture_1d
    }
}

impl GpuContext for HeadlessGpu {
    fn create_texture_3d(&mut self, desc: &Texture3dDesc, data: &[f32]) -> Result<TextureHandle> {
        debug_assert!(data.len() == desc.size[0] * desc.size[1] * desc.size[2]);
        let handle = self.allocate_handle();
        self.textures_3d.insert(handle, desc.size);
        Ok(TextureHandle(handle))
    }

    fn create_texture_1d_rgba(&mut self, n_texels: usize, data: &[f32]) -> Result<TextureHandle> {
        debug_assert!(data.len() == 4 * n_texels);
        let handle = self.allocate_handle();
        self.textures_1d.insert(handle, n_texels);
        Ok(TextureHandle(handle))
    }

    fn update_texture_1d_rgba(&mut self, texture: TextureHandle, data: &[f32]) -> Result<()> {
        debug_assert!(self.textures_1d.get(&texture.0).is_some_and(|n| data.len() == 4 * n));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures_3d.remove(&texture.0);
        self.textures_1d.remove(&texture.0);
    }

    fn create_plane_geometry(
        &mut self,
        vertices: &[PlaneVertex],
        indices: &[u32],
    ) -> Result<GeometryHandle> {
        debug_assert!(!vertices.is_empty());
        let handle = self.allocate_handle();
        self.geometries.insert(handle, indices.len());
        Ok(GeometryHandle(handle))
    }

    fn create_indicator_geometry(
        &mut self,
        vertices: &[IndicatorVertex],
        indices: &[u32],
    ) -> Result<GeometryHandle> {
        debug_assert!(!vertices.is_empty());
        let handle = self.allocate_handle();
        self.geometries.insert(handle, indices.len());
        Ok(GeometryHandle(handle))
    }

    fn update_indicator_geometry(
        &mut self,
        geometry: GeometryHandle,
        _vertices: &[IndicatorVertex],
    ) -> Result<()> {
        debug_assert!(self.geometries.contains_key(&geometry.0));
        Ok(())
    }

    fn delete_geometry(&mut self, geometry: GeometryHandle) {
        self.geometries.remove(&geometry.0);
    }

    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle> {
        let handle = self.allocate_handle();
        self.programs
            .insert(handle, (vertex_source.to_string(), fragment_source.to_string()));
        Ok(ProgramHandle(handle))
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        // a real backend reports locations only for uniforms that survive
        // into the linked program; the headless one hands out stable
        // locations for any requested name
        let key = (program.0, name.to_string());
        if let Some(&location) = self.uniform_locations.get(&key) {
            return Some(location);
        }
        let location = UniformLocation(self.next_uniform_location);
        self.next_uniform_location += 1;
        self.uniform_locations.insert(key, location);
        Some(location)
    }

    fn bind_program(&mut self, program: Option<ProgramHandle>) {
        self.bound_program = program;
    }

    fn bind_geometry(&mut self, geometry: Option<GeometryHandle>) {
        self.bound_geometry = geometry;
    }

    fn bind_texture_3d(&mut self, _unit: u32, texture: TextureHandle) {
        self.bound_texture_3d = Some(texture);
    }

    fn bind_texture_1d(&mut self, _unit: u32, texture: TextureHandle) {
        self.bound_texture_1d = Some(texture);
    }

    fn set_uniform_f32(&mut self, _location: UniformLocation, _value: f32) {}
    fn set_uniform_i32(&mut self, _location: UniformLocation, _value: i32) {}
    fn set_uniform_u32(&mut self, _location: UniformLocation, _value: u32) {}
    fn set_uniform_vec3(&mut self, _location: UniformLocation, _value: [f32; 3]) {}
    fn set_uniform_mat4(&mut self, _location: UniformLocation, _value: [[f32; 4]; 4]) {}
    fn set_uniform_f32_array(&mut self, _location: UniformLocation, _values: &[f32]) {}
    fn set_uniform_u32_array(&mut self, _location: UniformLocation, _values: &[u32]) {}
    fn set_uniform_vec3_array(&mut self, _location: UniformLocation, _values: &[[f32; 3]]) {}

    fn set_clear_color(&mut self, _color: [f32; 4]) {}
    fn set_alpha_blending(&mut self, _enabled: bool) {}
    fn set_depth_test(&mut self, _enabled: bool) {}

    fn clear(&mut self) {
        self.clear_count += 1;
    }

    fn draw_indexed(&mut self, primitive: PrimitiveKind, first_index: usize, index_count: usize) {
        self.draws.push(DrawRecord {
            primitive,
            first_index,
            index_count,
            program: self.bound_program,
            bound_texture_3d: self.bound_texture_3d,
        });
    }
}

// Lets tests hold onto the backend while the renderer owns a boxed clone of
// the same recording state
#[cfg(test)]
impl GpuContext for std::rc::Rc<std::cell::RefCell<HeadlessGpu>> {
    fn create_texture_3d(&mut self, desc: &Texture3dDesc, data: &[f32]) -> Result<TextureHandle> {
        self.borrow_mut().create_texture_3d(desc, data)
    }

    fn create_texture_1d_rgba(&mut self, n_texels: usize, data: &[f32]) -> Result<TextureHandle> {
        self.borrow_mut().create_texture_1d_rgba(n_texels, data)
    }

    fn update_texture_1d_rgba(&mut self, texture: TextureHandle, data: &[f32]) -> Result<()> {
        self.borrow_mut().update_texture_1d_rgba(texture, data)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.borrow_mut().delete_texture(texture)
    }

    fn create_plane_geometry(
        &mut self,
        vertices: &[PlaneVertex],
        indices: &[u32],
    ) -> Result<GeometryHandle> {
        self.borrow_mut().create_plane_geometry(vertices, indices)
    }

    fn create_indicator_geometry(
        &mut self,
        vertices: &[IndicatorVertex],
        indices: &[u32],
    ) -> Result<GeometryHandle> {
        self.borrow_mut().create_indicator_geometry(vertices, indices)
    }

    fn update_indicator_geometry(
        &mut self,
        geometry: GeometryHandle,
        vertices: &[IndicatorVertex],
    ) -> Result<()> {
        self.borrow_mut().update_indicator_geometry(geometry, vertices)
    }

    fn delete_geometry(&mut self, geometry: GeometryHandle) {
        self.borrow_mut().delete_geometry(geometry)
    }

    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle> {
        self.borrow_mut().compile_program(vertex_source, fragment_source)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.borrow_mut().delete_program(program)
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.borrow_mut().uniform_location(program, name)
    }

    fn bind_program(&mut self, program: Option<ProgramHandle>) {
        self.borrow_mut().bind_program(program)
    }

    fn bind_geometry(&mut self, geometry: Option<GeometryHandle>) {
        self.borrow_mut().bind_geometry(geometry)
    }

    fn bind_texture_3d(&mut self, unit: u32, texture: TextureHandle) {
        self.borrow_mut().bind_texture_3d(unit, texture)
    }

    fn bind_texture_1d(&mut self, unit: u32, texture: TextureHandle) {
        self.borrow_mut().bind_texture_1d(unit, texture)
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        self.borrow_mut().set_uniform_f32(location, value)
    }

    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32) {
        self.borrow_mut().set_uniform_i32(location, value)
    }

    fn set_uniform_u32(&mut self, location: UniformLocation, value: u32) {
        self.borrow_mut().set_uniform_u32(location, value)
    }

    fn set_uniform_vec3(&mut self, location: UniformLocation, value: [f32; 3]) {
        self.borrow_mut().set_uniform_vec3(location, value)
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: [[f32; 4]; 4]) {
        self.borrow_mut().set_uniform_mat4(location, value)
    }

    fn set_uniform_f32_array(&mut self, location: UniformLocation, values: &[f32]) {
        self.borrow_mut().set_uniform_f32_array(location, values)
    }

    fn set_uniform_u32_array(&mut self, location: UniformLocation, values: &[u32]) {
        self.borrow_mut().set_uniform_u32_array(location, values)
    }

    fn set_uniform_vec3_array(&mut self, location: UniformLocation, values: &[[f32; 3]]) {
        self.borrow_mut().set_uniform_vec3_array(location, values)
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.borrow_mut().set_clear_color(color)
    }

    fn set_alpha_blending(&mut self, enabled: bool) {
        self.borrow_mut().set_alpha_blending(enabled)
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.borrow_mut().set_depth_test(enabled)
    }

    fn clear(&mut self) {
        self.borrow_mut().clear()
    }

    fn draw_indexed(&mut self, primitive: PrimitiveKind, first_index: usize, index_count: usize) {
        self.borrow_mut().draw_indexed(primitive, first_index, index_count)
    }
}
