//! The renderer driver: owns the GPU and window collaborators, the two
//! shader programs (volume and indicators) and every registry, wires the
//! subsystems' shader snippets together at startup and drives the per-frame
//! sequence from the dirty bits set by the host surface.

use log::info;
use nalgebra::Matrix4;

use crate::bricks::{create_bricked_field, BrickedField, BrickingConfig};
use crate::clip::{
    ClipPlaneSet, ACTIVE_CLIP_PLANE_COUNT_UNIFORM, CLIP_PLANE_NORMALS_UNIFORM,
    CLIP_PLANE_ORIGIN_DISTANCES_UNIFORM,
};
use crate::error::{EngineError, Result};
use crate::field::Field;
use crate::gpu::{GpuContext, ProgramHandle};
use crate::indicators::{
    create_brick_boundary_indicator, create_field_boundary_indicator,
    create_sub_brick_boundary_indicator, draw_brick_boundary_indicator,
    draw_field_boundary_indicator, draw_sub_brick_boundary_indicator,
    register_indicator_shader_code, IndicatorPass, IndicatorRegistry,
};
use crate::shadergen::{ShaderProgram, Uniform};
use crate::slicer::{Slicer, DEFAULT_PLANE_SEPARATION_MULTIPLIER, SAMPLING_CORRECTION_UNIFORM};
use crate::spatial;
use crate::spatial::lut::OPPOSITE_CORNERS;
use crate::textures::{
    FieldTextureRegistry, TRANSFER_FUNCTION_TEXTURE_UNIT, VOLUME_TEXTURE_UNIT,
};
use crate::transfer::{update_visibility_ratios, TransferFunctionRegistry};
use crate::transform::controller::{CameraController, SeparationChange};
use crate::transform::trackball::Trackball;
use crate::transform::Transformation;

pub const TRANSFORMATION_MATRIX_UNIFORM: &str = "MVP_matrix";
pub const LOOK_AXIS_UNIFORM: &str = "look_axis";
pub const FIELD_TEXTURE_UNIFORM: &str = "field_texture";
pub const TRANSFER_FUNCTION_UNIFORM: &str = "transfer_function";
pub const TF_LOWER_LIMIT_UNIFORM: &str = "tf_lower_limit";
pub const TF_UPPER_LIMIT_UNIFORM: &str = "tf_upper_limit";

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
const DEFAULT_VIEW_DISTANCE: f32 = 2.0;

/// Input and lifecycle events delivered by the window collaborator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    CloseRequested,
    FramebufferResized { width: u32, height: u32 },
    MouseButtonPressed { x: f64, y: f64 },
    MouseButtonReleased,
    CursorMoved { x: f64, y: f64 },
    Scrolled { delta: f64 },
}

/// The window/input layer the renderer runs against. A real implementation
/// wraps a desktop windowing library; tests use [`HeadlessWindow`].
pub trait WindowSystem {
    fn poll_events(&mut self) -> Vec<WindowEvent>;
    fn swap_buffers(&mut self);
    fn should_close(&self) -> bool;
    fn bring_to_front(&mut self);
    fn size_in_screen_coordinates(&self) -> (u32, u32);
}

/// Window double for driving the renderer without a display
#[derive(Default)]
pub struct HeadlessWindow {
    pub queued_events: Vec<WindowEvent>,
    pub close_requested: bool,
    pub swap_count: usize,
    pub focus_count: usize,
    pub size: (u32, u32),
}

impl HeadlessWindow {
    pub fn new() -> Self {
        Self {
            size: (600, 600),
            ..Self::default()
        }
    }
}

impl WindowSystem for HeadlessWindow {
    fn poll_events(&mut self) -> Vec<WindowEvent> {
        let events = std::mem::take(&mut self.queued_events);
        if events.contains(&WindowEvent::CloseRequested) {
            self.close_requested = true;
        }
        events
    }

    fn swap_buffers(&mut self) {
        self.swap_count += 1;
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn bring_to_front(&mut self) {
        self.focus_count += 1;
    }

    fn size_in_screen_coordinates(&self) -> (u32, u32) {
        self.size
    }
}

struct VolumeProgramUniforms {
    transformation: Uniform,
    look_axis: Uniform,
    field_texture: Uniform,
    transfer_function: Uniform,
    tf_lower_limit: Uniform,
    tf_upper_limit: Uniform,
    clip_plane_count: Uniform,
    clip_plane_normals: Uniform,
    clip_plane_origin_distances: Uniform,
}

struct IndicatorProgramUniforms {
    transformation: Uniform,
}

/// Everything that used to be file-scope singletons in older renderers of
/// this kind, gathered into one aggregate owned by the embedder.
pub struct RenderContext {
    gpu: Box<dyn GpuContext>,
    window: Box<dyn WindowSystem>,

    volume_program: ShaderProgram,
    indicator_program: ShaderProgram,
    volume_uniforms: VolumeProgramUniforms,
    indicator_uniforms: IndicatorProgramUniforms,

    slicer: Slicer,
    clip_planes: ClipPlaneSet,
    transformation: Transformation,
    trackball: Trackball,
    controller: CameraController,

    field_textures: FieldTextureRegistry,
    transfer_functions: TransferFunctionRegistry,
    indicators: IndicatorRegistry,

    bricking_config: BrickingConfig,
    create_field_boundary: bool,
    create_brick_boundary: bool,
    create_sub_brick_boundary: bool,

    bricked_field: Option<BrickedField>,
    active_transfer_function: Option<String>,

    autorefresh: bool,
    needs_visibility_recompute: bool,
    needs_redraw: bool,
}

impl RenderContext {
    /// Builds both shader programs from the subsystems' snippets, resolves
    /// all uniforms and configures the fixed pipeline state.
    pub fn new(
        mut gpu: Box<dyn GpuContext>,
        window: Box<dyn WindowSystem>,
    ) -> Result<Self> {
        let mut slicer = Slicer::new();
        let clip_planes = ClipPlaneSet::new();

        let mut volume_program = ShaderProgram::new();
        let mut indicator_program = ShaderProgram::new();

        register_volume_shader_code(&mut volume_program, &mut slicer, &clip_planes)?;
        register_indicator_shader_code(
            &mut indicator_program.vertex_source,
            &mut indicator_program.fragment_source,
            TRANSFORMATION_MATRIX_UNIFORM,
        )?;

        let volume_handle = volume_program.build(gpu.as_mut())?;
        let indicator_handle = indicator_program.build(gpu.as_mut())?;
        info!("compiled volume and indicator shader programs");

        let mut volume_uniforms = VolumeProgramUniforms {
            transformation: Uniform::new(TRANSFORMATION_MATRIX_UNIFORM),
            look_axis: Uniform::new(LOOK_AXIS_UNIFORM),
            field_texture: Uniform::new(FIELD_TEXTURE_UNIFORM),
            transfer_function: Uniform::new(TRANSFER_FUNCTION_UNIFORM),
            tf_lower_limit: Uniform::new(TF_LOWER_LIMIT_UNIFORM),
            tf_upper_limit: Uniform::new(TF_UPPER_LIMIT_UNIFORM),
            clip_plane_count: Uniform::new(ACTIVE_CLIP_PLANE_COUNT_UNIFORM),
            clip_plane_normals: Uniform::new(CLIP_PLANE_NORMALS_UNIFORM),
            clip_plane_origin_distances: Uniform::new(CLIP_PLANE_ORIGIN_DISTANCES_UNIFORM),
        };
        let mut indicator_uniforms = IndicatorProgramUniforms {
            transformation: Uniform::new(TRANSFORMATION_MATRIX_UNIFORM),
        };

        slicer.load_uniforms(gpu.as_mut(), volume_handle);
        volume_uniforms.transformation.load(gpu.as_mut(), volume_handle);
        volume_uniforms.look_axis.load(gpu.as_mut(), volume_handle);
        volume_uniforms.field_texture.load(gpu.as_mut(), volume_handle);
        volume_uniforms.transfer_function.load(gpu.as_mut(), volume_handle);
        volume_uniforms.tf_lower_limit.load(gpu.as_mut(), volume_handle);
        volume_uniforms.tf_upper_limit.load(gpu.as_mut(), volume_handle);
        volume_uniforms.clip_plane_count.load(gpu.as_mut(), volume_handle);
        volume_uniforms.clip_plane_normals.load(gpu.as_mut(), volume_handle);
        volume_uniforms
            .clip_plane_origin_distances
            .load(gpu.as_mut(), volume_handle);
        indicator_uniforms.transformation.load(gpu.as_mut(), indicator_handle);

        // samplers are bound to fixed units
        gpu.bind_program(Some(volume_handle));
        if let Some(location) = volume_uniforms.field_texture.location() {
            gpu.set_uniform_i32(location, VOLUME_TEXTURE_UNIT as i32);
        }
        if let Some(location) = volume_uniforms.transfer_function.location() {
            gpu.set_uniform_i32(location, TRANSFER_FUNCTION_TEXTURE_UNIT as i32);
        }
        gpu.bind_program(None);

        gpu.set_clear_color(CLEAR_COLOR);
        gpu.set_alpha_blending(true);
        gpu.set_depth_test(false);

        let mut transformation = Transformation::new();
        transformation.set_view_distance(DEFAULT_VIEW_DISTANCE);
        let (width, height) = window.size_in_screen_coordinates();
        transformation.set_aspect_ratio(width as f32 / height as f32);

        Ok(Self {
            gpu,
            window,
            volume_program,
            indicator_program,
            volume_uniforms,
            indicator_uniforms,
            slicer,
            clip_planes,
            transformation,
            trackball: Trackball::new(),
            controller: CameraController::new(),
            field_textures: FieldTextureRegistry::new(),
            transfer_functions: TransferFunctionRegistry::new(),
            indicators: IndicatorRegistry::new(),
            bricking_config: BrickingConfig::default(),
            create_field_boundary: true,
            create_brick_boundary: false,
            create_sub_brick_boundary: false,
            bricked_field: None,
            active_transfer_function: None,
            autorefresh: true,
            needs_visibility_recompute: false,
            needs_redraw: false,
        })
    }

    pub fn bricking_config_mut(&mut self) -> &mut BrickingConfig {
        &mut self.bricking_config
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn transformation_mut(&mut self) -> &mut Transformation {
        &mut self.transformation
    }

    pub fn clip_planes_mut(&mut self) -> &mut ClipPlaneSet {
        &mut self.clip_planes
    }

    pub fn slicer(&self) -> &Slicer {
        &self.slicer
    }

    pub fn slicer_mut(&mut self) -> &mut Slicer {
        &mut self.slicer
    }

    pub fn bricked_field(&self) -> Option<&BrickedField> {
        self.bricked_field.as_ref()
    }

    pub fn bricked_field_mut(&mut self) -> Option<&mut BrickedField> {
        self.bricked_field.as_mut()
    }

    pub fn active_transfer_function(&self) -> Option<&str> {
        self.active_transfer_function.as_deref()
    }

    pub fn transfer_functions(&self) -> &TransferFunctionRegistry {
        &self.transfer_functions
    }

    pub fn transfer_functions_mut(&mut self) -> &mut TransferFunctionRegistry {
        &mut self.transfer_functions
    }

    pub fn set_autorefresh(&mut self, enabled: bool) {
        self.autorefresh = enabled;
    }

    pub fn autorefresh(&self) -> bool {
        self.autorefresh
    }

    pub fn set_field_boundary_indicator_creation(&mut self, enabled: bool) {
        self.create_field_boundary = enabled;
    }

    pub fn set_brick_boundary_indicator_creation(&mut self, enabled: bool) {
        self.create_brick_boundary = enabled;
    }

    pub fn set_sub_brick_boundary_indicator_creation(&mut self, enabled: bool) {
        self.create_sub_brick_boundary = enabled;
    }

    pub fn bring_window_to_front(&mut self) {
        self.window.bring_to_front();
    }

    /// Marks the visibility ratios stale; recomputed at the next step
    pub fn require_visibility_recompute(&mut self) {
        self.needs_visibility_recompute = true;
    }

    /// Marks the frame stale; redrawn at the next step
    pub fn require_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Called after a transfer-function or field edit: the ratios are
    /// always stale, the redraw follows the autorefresh setting
    pub fn note_edit(&mut self) {
        self.needs_visibility_recompute = true;
        if self.autorefresh {
            self.needs_redraw = true;
        }
    }

    /// Called after a purely visual change (camera, thresholds)
    pub fn note_visual_change(&mut self) {
        if self.autorefresh {
            self.needs_redraw = true;
        }
    }

    /// Destroys any previously loaded field and installs the new one:
    /// bricking, texture upload, a fresh transfer function and the
    /// configured boundary indicators.
    pub fn load_field(&mut self, field: Field) -> Result<()> {
        self.unload_field()?;

        info!(
            "bricking field \"{}\" of size {:?}",
            field.name(),
            field.size()
        );
        let mut bricked = create_bricked_field(field, &self.bricking_config)?;
        self.field_textures
            .create_brick_textures(self.gpu.as_mut(), &mut bricked)?;

        let transfer_function_name = self.transfer_functions.create();
        let texel_data = self
            .transfer_functions
            .get(&transfer_function_name)
            .map(|function| function.texel_data())
            .ok_or_else(|| EngineError::UnknownName(transfer_function_name.clone()))?;
        let texture = self
            .field_textures
            .create_transfer_function_texture(self.gpu.as_mut(), &texel_data)?;
        self.transfer_functions
            .set_texture(&transfer_function_name, texture)?;

        if self.create_field_boundary {
            create_field_boundary_indicator(&mut self.indicators, self.gpu.as_mut(), &mut bricked)?;
        }
        if self.create_brick_boundary {
            create_brick_boundary_indicator(&mut self.indicators, self.gpu.as_mut(), &mut bricked)?;
        }
        if self.create_sub_brick_boundary {
            create_sub_brick_boundary_indicator(
                &mut self.indicators,
                self.gpu.as_mut(),
                &mut bricked,
            )?;
        }

        let volume_handle = self.program_handle(&self.volume_program)?;
        self.slicer.set_plane_separation(
            self.gpu.as_mut(),
            volume_handle,
            &bricked,
            DEFAULT_PLANE_SEPARATION_MULTIPLIER,
        )?;

        self.bricked_field = Some(bricked);
        self.active_transfer_function = Some(transfer_function_name);
        self.needs_visibility_recompute = true;
        self.needs_redraw = true;
        Ok(())
    }

    /// Releases the active field's textures, indicators and transfer
    /// function
    pub fn unload_field(&mut self) -> Result<()> {
        self.take_field().map(|_| ())
    }

    /// Clamps the loaded field's values to a range given in field units and
    /// rebuilds bricks, textures and indicators from the clipped data
    pub fn clip_field_values(&mut self, lower: f32, upper: f32) -> Result<()> {
        let Some(bricked) = self.bricked_field.as_mut() else {
            return Err(EngineError::InvalidConfig("no field is loaded".to_string()));
        };
        bricked.field_mut().clip_values(lower, upper)?;

        let field = self.take_field()?.ok_or_else(|| {
            EngineError::InvalidConfig("no field is loaded".to_string())
        })?;
        self.load_field(field)
    }

    /// Tears down the active field's GPU resources and hands back the bare
    /// field
    fn take_field(&mut self) -> Result<Option<Field>> {
        let Some(mut bricked) = self.bricked_field.take() else {
            return Ok(None);
        };

        self.field_textures
            .release_brick_textures(self.gpu.as_mut(), &mut bricked);

        for indicator_name in [
            bricked.field_boundary_indicator.take(),
            bricked.brick_boundary_indicator.take(),
            bricked.sub_brick_boundary_indicator.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.indicators.destroy(self.gpu.as_mut(), &indicator_name)?;
        }

        if let Some(name) = self.active_transfer_function.take() {
            if let Some(texture) = self.transfer_functions.remove(&name)? {
                self.field_textures.release_texture(self.gpu.as_mut(), texture);
            }
        }
        Ok(Some(bricked.into_field()))
    }

    /// Applies a plane separation multiplier to the slicer, keeping the
    /// sampling correction consistent
    pub fn set_plane_separation_multiplier(&mut self, multiplier: f32) -> Result<()> {
        let Some(bricked) = self.bricked_field.as_ref() else {
            return Err(EngineError::InvalidConfig(
                "no field is loaded".to_string(),
            ));
        };
        let volume_handle = self.program_handle(&self.volume_program)?;
        self.slicer
            .set_plane_separation(self.gpu.as_mut(), volume_handle, bricked, multiplier)
    }

    /// Processes one frame: input, deferred visibility recompute, deferred
    /// redraw, buffer swap. Returns whether the main loop should continue.
    pub fn step(&mut self) -> Result<bool> {
        let events = self.window.poll_events();
        for event in events {
            self.handle_window_event(event)?;
        }

        if self.needs_visibility_recompute {
            self.recompute_visibility_ratios();
            self.needs_visibility_recompute = false;
        }

        if self.needs_redraw {
            self.render_frame()?;
            self.needs_redraw = false;
        }

        self.window.swap_buffers();
        Ok(!self.window.should_close())
    }

    /// Runs `step` until the window collaborator requests a close
    pub fn run(&mut self) -> Result<()> {
        while self.step()? {}
        Ok(())
    }

    /// Recomputes the visibility ratios of the active field from its
    /// transfer function
    pub fn recompute_visibility_ratios(&mut self) {
        let (Some(bricked), Some(name)) = (
            self.bricked_field.as_mut(),
            self.active_transfer_function.as_deref(),
        ) else {
            return;
        };
        if let Some(function) = self.transfer_functions.get(name) {
            update_visibility_ratios(function, bricked);
        }
    }

    pub fn cleanup(&mut self) -> Result<()> {
        self.unload_field()?;
        self.indicators.cleanup(self.gpu.as_mut());
        self.volume_program.destroy(self.gpu.as_mut());
        self.indicator_program.destroy(self.gpu.as_mut());
        Ok(())
    }

    fn handle_window_event(&mut self, event: WindowEvent) -> Result<()> {
        match event {
            WindowEvent::CloseRequested => {}
            WindowEvent::FramebufferResized { width, height } => {
                if width > 0 && height > 0 {
                    self.transformation
                        .set_aspect_ratio(width as f32 / height as f32);
                    self.needs_redraw = true;
                }
            }
            WindowEvent::MouseButtonPressed { x, y } => {
                let change = self.controller.begin_drag(
                    &mut self.trackball,
                    x,
                    y,
                    self.window.size_in_screen_coordinates(),
                    self.slicer.plane_separation_multiplier(),
                );
                self.apply_separation_change(change)?;
            }
            WindowEvent::MouseButtonReleased => {
                let change = self.controller.end_drag();
                self.apply_separation_change(change)?;
                self.needs_redraw = true;
            }
            WindowEvent::CursorMoved { x, y } => {
                if self.controller.is_dragging() {
                    self.controller.drag(
                        &mut self.trackball,
                        &mut self.transformation,
                        x,
                        y,
                        self.window.size_in_screen_coordinates(),
                    );
                    self.needs_redraw = true;
                }
            }
            WindowEvent::Scrolled { delta } => {
                self.controller
                    .scroll(&mut self.trackball, &mut self.transformation, delta);
                self.needs_redraw = true;
            }
        }
        Ok(())
    }

    fn apply_separation_change(&mut self, change: SeparationChange) -> Result<()> {
        if let SeparationChange::Set(multiplier) = change {
            if self.bricked_field.is_some() && multiplier > 0.0 {
                self.set_plane_separation_multiplier(multiplier)?;
            }
        }
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        self.gpu.clear();

        if self.bricked_field.is_none() {
            return Ok(());
        }

        self.sync_volume_program_state()?;
        self.sync_indicator_program_state()?;

        let look_axis = self.transformation.look_axis();
        let back_corner_idx = spatial::back_corner_for_direction(&look_axis);
        let front_corner_idx = OPPOSITE_CORNERS[back_corner_idx];

        let indicator_handle = self.program_handle(&self.indicator_program)?;
        let volume_handle = self.program_handle(&self.volume_program)?;

        // the back faces of the field boundary render under the volume,
        // the front faces over it
        let bricked = self.bricked_field.as_mut().expect("field checked above");

        self.gpu.bind_program(Some(indicator_handle));
        draw_field_boundary_indicator(
            &self.indicators,
            self.gpu.as_mut(),
            bricked,
            &self.transformation,
            back_corner_idx,
            IndicatorPass::Back,
        )?;
        self.gpu.bind_program(None);

        self.slicer.draw_bricked_field(
            self.gpu.as_mut(),
            volume_handle,
            bricked,
            &self.transformation,
            &self.clip_planes,
        )?;

        self.gpu.bind_program(Some(indicator_handle));
        draw_sub_brick_boundary_indicator(&self.indicators, self.gpu.as_mut(), bricked)?;
        draw_brick_boundary_indicator(&self.indicators, self.gpu.as_mut(), bricked)?;
        draw_field_boundary_indicator(
            &self.indicators,
            self.gpu.as_mut(),
            bricked,
            &self.transformation,
            front_corner_idx,
            IndicatorPass::Front,
        )?;
        self.gpu.bind_program(None);

        Ok(())
    }

    /// Uploads the per-frame uniforms of the volume program: transform,
    /// camera, clip planes, transfer-function window and table
    fn sync_volume_program_state(&mut self) -> Result<()> {
        let volume_handle = self.program_handle(&self.volume_program)?;
        let gpu = self.gpu.as_mut();
        gpu.bind_program(Some(volume_handle));

        if let Some(location) = self.volume_uniforms.transformation.location() {
            gpu.set_uniform_mat4(
                location,
                matrix_to_columns(self.transformation.model_view_projection_matrix()),
            );
        }
        if let Some(location) = self.volume_uniforms.look_axis.location() {
            gpu.set_uniform_vec3(location, self.transformation.look_axis().into());
        }
        if let Some(location) = self.volume_uniforms.clip_plane_count.location() {
            gpu.set_uniform_u32(location, self.clip_planes.active_count() as u32);
        }
        if let Some(location) = self.volume_uniforms.clip_plane_normals.location() {
            gpu.set_uniform_vec3_array(location, &self.clip_planes.normals_array());
        }
        if let Some(location) = self.volume_uniforms.clip_plane_origin_distances.location() {
            gpu.set_uniform_f32_array(location, &self.clip_planes.origin_distances());
        }

        if let Some(name) = self.active_transfer_function.as_deref() {
            if let Some(function) = self.transfer_functions.get(name) {
                if let Some(location) = self.volume_uniforms.tf_lower_limit.location() {
                    gpu.set_uniform_f32(location, function.lower_limit());
                }
                if let Some(location) = self.volume_uniforms.tf_upper_limit.location() {
                    gpu.set_uniform_f32(location, function.upper_limit());
                }
            }

            if self.transfer_functions.needs_sync(name) {
                if let (Some(function), Some(texture)) = (
                    self.transfer_functions.get(name),
                    self.transfer_functions.texture(name),
                ) {
                    gpu.update_texture_1d_rgba(texture, &function.texel_data())?;
                }
                self.transfer_functions.mark_synced(name);
            }
            if let Some(texture) = self.transfer_functions.texture(name) {
                gpu.bind_texture_1d(TRANSFER_FUNCTION_TEXTURE_UNIT, texture);
            }
        }

        gpu.bind_program(None);
        Ok(())
    }

    fn sync_indicator_program_state(&mut self) -> Result<()> {
        let indicator_handle = self.program_handle(&self.indicator_program)?;
        let gpu = self.gpu.as_mut();
        gpu.bind_program(Some(indicator_handle));
        if let Some(location) = self.indicator_uniforms.transformation.location() {
            gpu.set_uniform_mat4(
                location,
                matrix_to_columns(self.transformation.model_view_projection_matrix()),
            );
        }
        gpu.bind_program(None);
        Ok(())
    }

    fn program_handle(&self, program: &ShaderProgram) -> Result<ProgramHandle> {
        program.handle().ok_or_else(|| {
            EngineError::ShaderLink("shader program was never compiled".to_string())
        })
    }
}

/// Assembles the volume program: the slicer's box-plane intersection and
/// texture-coordinate vertex code, the clip-distance outputs, and a
/// fragment pipeline sampling the field, applying the windowed transfer
/// function and the opacity sampling correction.
fn register_volume_shader_code(
    program: &mut ShaderProgram,
    slicer: &mut Slicer,
    clip_planes: &ClipPlaneSet,
) -> Result<()> {
    program
        .vertex_source
        .add_uniform("mat4", TRANSFORMATION_MATRIX_UNIFORM);
    program.vertex_source.add_uniform("vec3", LOOK_AXIS_UNIFORM);

    slicer.register_shader_code(
        &mut program.vertex_source,
        &mut program.fragment_source,
        TRANSFORMATION_MATRIX_UNIFORM,
        LOOK_AXIS_UNIFORM,
    )?;

    clip_planes.register_shader_code(&mut program.vertex_source, slicer.position_variable())?;

    let fragment = &mut program.fragment_source;
    fragment.add_sampler_3d(FIELD_TEXTURE_UNIFORM);
    fragment.add_sampler_1d(TRANSFER_FUNCTION_UNIFORM);
    fragment.add_uniform("float", TF_LOWER_LIMIT_UNIFORM);
    fragment.add_uniform("float", TF_UPPER_LIMIT_UNIFORM);

    let sampled_value =
        fragment.add_texture_sampling_variable(FIELD_TEXTURE_UNIFORM, "out_tex_coord");
    let mapped_color = fragment.add_transfer_function_variable(
        TRANSFER_FUNCTION_UNIFORM,
        TF_LOWER_LIMIT_UNIFORM,
        TF_UPPER_LIMIT_UNIFORM,
        sampled_value,
    );

    // compositing transparency scales with the sampling density so the
    // integrated opacity is independent of the plane separation
    let corrected_color = fragment.add_snippet_variable(
        "vec4",
        "color",
        &format!(
            "    vec4 color;\n\
             \x20   color.rgb = variable_{mapped}.rgb;\n\
             \x20   color.a = 1.0 - pow(1.0 - variable_{mapped}.a, {correction});",
            mapped = mapped_color,
            correction = SAMPLING_CORRECTION_UNIFORM,
        ),
        &[SAMPLING_CORRECTION_UNIFORM],
        &[mapped_color],
    );
    fragment.assign_variable_to_new_output("vec4", corrected_color, "out_color")?;
    Ok(())
}

fn matrix_to_columns(matrix: &Matrix4<f32>) -> [[f32; 4]; 4] {
    (*matrix).into()
}

#[cfg(test)]
impl WindowSystem for std::rc::Rc<std::cell::RefCell<HeadlessWindow>> {
    fn poll_events(&mut self) -> Vec<WindowEvent> {
        self.borrow_mut().poll_events()
    }

    fn swap_buffers(&mut self) {
        self.borrow_mut().swap_buffers()
    }

    fn should_close(&self) -> bool {
        self.borrow().should_close()
    }

    fn bring_to_front(&mut self) {
        self.borrow_mut().bring_to_front()
    }

    fn size_in_screen_coordinates(&self) -> (u32, u32) {
        self.borrow().size_in_screen_coordinates()
    }
}

#[cfg(test)]
mod renderer_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::field::Field;
    use crate::gpu::{HeadlessGpu, PrimitiveKind};

    fn shared_setup() -> (
        RenderContext,
        Rc<RefCell<HeadlessGpu>>,
        Rc<RefCell<HeadlessWindow>>,
    ) {
        let gpu = Rc::new(RefCell::new(HeadlessGpu::new()));
        let window = Rc::new(RefCell::new(HeadlessWindow::new()));
        let context = RenderContext::new(Box::new(gpu.clone()), Box::new(window.clone()))
            .ok()
            .unwrap();
        (context, gpu, window)
    }

    fn test_field() -> Field {
        let length = 32 * 32 * 32;
        let mut data: Vec<f32> = (0..length).map(|i| ((i * 7) % 53) as f32).collect();
        data[0] = 0.0;
        data[length - 1] = 52.0;
        Field::from_raw_data("renderer", data, [32, 32, 32], [1.0, 1.0, 1.0]).ok().unwrap()
    }

    fn load_test_field(context: &mut RenderContext) {
        context.bricking_config_mut().brick_size = 16;
        context.load_field(test_field()).ok().unwrap();
    }

    #[test]
    fn test_initialization_compiles_both_programs() {
        let (_context, gpu, _window) = shared_setup();
        // two programs were compiled and their sources carry the expected
        // pipeline pieces
        let gpu = gpu.borrow();
        let sources: Vec<&(String, String)> = (1..=16)
            .filter_map(|handle| gpu.program_sources(crate::gpu::ProgramHandle(handle)))
            .collect();
        assert!(sources.len() == 2);

        let (volume_vertex, volume_fragment) = sources[0];
        assert!(volume_vertex.contains("back_plane_dist"));
        assert!(volume_vertex.contains("gl_ClipDistance"));
        assert!(volume_vertex.contains("orientation_permutations"));
        assert!(volume_fragment.contains("texture(field_texture, out_tex_coord).r"));
        assert!(volume_fragment.contains("sampling_correction"));
        assert!(volume_fragment.contains("out_color"));

        let (indicator_vertex, indicator_fragment) = sources[1];
        assert!(indicator_vertex.contains("in_color"));
        assert!(indicator_fragment.contains("out_color = ex_color;"));
    }

    #[test]
    fn test_step_without_field_swaps_and_continues() {
        let (mut context, gpu, window) = shared_setup();

        assert!(context.step().ok().unwrap());
        assert!(window.borrow().swap_count == 1);
        assert!(gpu.borrow().draw_count() == 0);
    }

    #[test]
    fn test_close_event_stops_the_loop() {
        let (mut context, _gpu, window) = shared_setup();
        window.borrow_mut().queued_events.push(WindowEvent::CloseRequested);
        assert!(!context.step().ok().unwrap());
    }

    #[test]
    fn test_loaded_field_is_drawn_next_step() {
        let (mut context, gpu, _window) = shared_setup();
        load_test_field(&mut context);

        gpu.borrow_mut().reset_draws();
        assert!(context.step().ok().unwrap());

        let gpu = gpu.borrow();
        let volume_draws = gpu
            .draws
            .iter()
            .filter(|draw| draw.primitive == PrimitiveKind::Triangles)
            .count();
        let boundary_draws = gpu
            .draws
            .iter()
            .filter(|draw| draw.primitive == PrimitiveKind::LineLoop)
            .count();

        // default alpha is fully opaque, so the volume and the two field
        // boundary passes are all drawn; with the camera on the z axis the
        // back pass covers six faces and the front pass one
        assert!(volume_draws > 0);
        assert!(boundary_draws == 7);
        assert!(gpu.clear_count == 1);
    }

    #[test]
    fn test_redraw_only_happens_when_marked() {
        let (mut context, gpu, _window) = shared_setup();
        load_test_field(&mut context);
        context.step().ok().unwrap();

        gpu.borrow_mut().reset_draws();
        context.step().ok().unwrap();
        assert!(gpu.borrow().draw_count() == 0);

        context.require_redraw();
        context.step().ok().unwrap();
        assert!(gpu.borrow().draw_count() > 0);
    }

    #[test]
    fn test_reloading_a_field_releases_old_resources() {
        let (mut context, gpu, _window) = shared_setup();
        load_test_field(&mut context);
        let first_count = gpu.borrow().live_texture_count();

        load_test_field(&mut context);
        assert!(gpu.borrow().live_texture_count() == first_count);

        context.cleanup().ok().unwrap();
        assert!(gpu.borrow().live_texture_count() == 0);
    }

    #[test]
    fn test_drag_events_rotate_the_camera() {
        let (mut context, _gpu, window) = shared_setup();
        load_test_field(&mut context);
        context.step().ok().unwrap();
        let before = context.transformation().camera_position();

        window.borrow_mut().queued_events.extend([
            WindowEvent::MouseButtonPressed { x: 300.0, y: 300.0 },
            WindowEvent::CursorMoved { x: 380.0, y: 300.0 },
            WindowEvent::MouseButtonReleased,
        ]);
        context.step().ok().unwrap();

        assert!((context.transformation().camera_position() - before).norm() > 1e-4);
    }

    #[test]
    fn test_drag_degrades_sampling_until_release() {
        let (mut context, _gpu, window) = shared_setup();
        load_test_field(&mut context);
        context.step().ok().unwrap();
        let resting_multiplier = context.slicer().plane_separation_multiplier();

        window
            .borrow_mut()
            .queued_events
            .push(WindowEvent::MouseButtonPressed { x: 300.0, y: 300.0 });
        context.step().ok().unwrap();
        assert!(
            context.slicer().plane_separation_multiplier() > resting_multiplier
        );

        window.borrow_mut().queued_events.push(WindowEvent::MouseButtonReleased);
        context.step().ok().unwrap();
        assert!(
            (context.slicer().plane_separation_multiplier() - resting_multiplier).abs() < 1e-6
        );
    }

    #[test]
    fn test_resize_updates_aspect_ratio_and_redraws() {
        let (mut context, gpu, window) = shared_setup();
        load_test_field(&mut context);
        context.step().ok().unwrap();

        gpu.borrow_mut().reset_draws();
        window
            .borrow_mut()
            .queued_events
            .push(WindowEvent::FramebufferResized { width: 800, height: 400 });
        context.step().ok().unwrap();

        assert!(gpu.borrow().draw_count() > 0);
    }

    #[test]
    fn test_clip_field_values_rebricks() {
        let (mut context, _gpu, _window) = shared_setup();
        load_test_field(&mut context);

        let field = context.bricked_field().unwrap().field();
        let lower = field.texture_value_to_field_value(0.25);
        let upper = field.texture_value_to_field_value(0.75);

        context.clip_field_values(lower, upper).ok().unwrap();

        let bricked = context.bricked_field().unwrap();
        assert!(bricked.brick_count() > 0);
        assert!((bricked.field().min_value() - lower).abs() < 1e-3);
        assert!((bricked.field().max_value() - upper).abs() < 1e-3);
    }
}
