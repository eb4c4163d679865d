//! The host operation surface exposed to an embedding layer.
//!
//! A thin facade over [`RenderContext`]: it validates argument ranges,
//! converts field units to texture units at the boundary, routes edits to
//! the registries and sets the dirty bits that defer work to the next
//! frame. All operations are synchronous and must run on the thread owning
//! the GPU context.

use std::path::Path;

use log::warn;

use crate::error::{EngineError, Result};
use crate::field::bifrost::create_field_from_bifrost_file;
use crate::gpu::GpuContext;
use crate::renderer::{RenderContext, WindowSystem};
use crate::transfer::{TfComponent, TransferFunction, TF_END_NODE, TF_SIZE, TF_START_NODE};
use crate::transform::ProjectionType;

/// Entry point for embedders: owns the renderer once `initialize` has run
#[derive(Default)]
pub struct Host {
    context: Option<RenderContext>,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the renderer against the given GPU and window collaborators
    /// and enters the ready state
    pub fn initialize(
        &mut self,
        gpu: Box<dyn GpuContext>,
        window: Box<dyn WindowSystem>,
    ) -> Result<()> {
        if self.context.is_some() {
            return Err(EngineError::InvalidConfig(
                "the renderer is already initialized".to_string(),
            ));
        }
        self.context = Some(RenderContext::new(gpu, window)?);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&RenderContext> {
        self.context.as_ref()
    }

    fn ready_context(&mut self) -> Result<&mut RenderContext> {
        self.context.as_mut().ok_or_else(|| {
            EngineError::InvalidConfig("the renderer has not been initialized".to_string())
        })
    }

    /// Sets the requested brick size to `2^exponent` voxels, applied at the
    /// next field load
    pub fn set_brick_size_power_of_two(&mut self, exponent: u32) -> Result<()> {
        if exponent >= usize::BITS {
            return Err(EngineError::InvalidConfig(format!(
                "brick size exponent {} is out of range",
                exponent
            )));
        }
        self.ready_context()?.bricking_config_mut().brick_size = 1usize << exponent;
        Ok(())
    }

    /// Sets the sub-brick recursion terminator, applied at the next field
    /// load
    pub fn set_minimum_sub_brick_size(&mut self, min_sub_brick_size: usize) -> Result<()> {
        if min_sub_brick_size == 0 {
            return Err(EngineError::InvalidConfig(
                "minimum sub brick size must be positive".to_string(),
            ));
        }
        self.ready_context()?.bricking_config_mut().min_sub_brick_size = min_sub_brick_size;
        Ok(())
    }

    /// Destroys any prior field, loads `<file_base>.raw`/`<file_base>.dat`,
    /// bricks the new field and schedules a visibility update and redraw
    pub fn set_field_from_bifrost_file(&mut self, field_name: &str, file_base: &str) -> Result<()> {
        let context = self.ready_context()?;

        let data_path = format!("{}.raw", file_base);
        let header_path = format!("{}.dat", file_base);
        let field = create_field_from_bifrost_file(
            field_name,
            Path::new(&data_path),
            Path::new(&header_path),
        )?;
        context.load_field(field)
    }

    /// Clamps the field values to a range given in field units and rebuilds
    /// the bricks from the clipped data
    pub fn set_field_value_clip_range(&mut self, lower: f32, upper: f32) -> Result<()> {
        if upper <= lower {
            return Err(EngineError::InvalidConfig(format!(
                "clip range upper bound {} must exceed lower bound {}",
                upper, lower
            )));
        }
        self.ready_context()?.clip_field_values(lower, upper)
    }

    /// Processes one frame and reports whether the main loop should
    /// continue
    pub fn step(&mut self) -> Result<bool> {
        self.ready_context()?.step()
    }

    /// Steps until the window requests a close
    pub fn run(&mut self) -> Result<()> {
        self.ready_context()?.run()
    }

    /// Schedules a recomputation of all visibility ratios
    pub fn refresh_visibility(&mut self) -> Result<()> {
        let context = self.ready_context()?;
        context.require_visibility_recompute();
        context.require_redraw();
        Ok(())
    }

    /// Schedules a redraw of the next frame
    pub fn refresh_frame(&mut self) -> Result<()> {
        self.ready_context()?.require_redraw();
        Ok(())
    }

    pub fn enable_autorefresh(&mut self) -> Result<()> {
        self.ready_context()?.set_autorefresh(true);
        Ok(())
    }

    pub fn disable_autorefresh(&mut self) -> Result<()> {
        self.ready_context()?.set_autorefresh(false);
        Ok(())
    }

    /// Moves the transfer function's lower window limit; the value is given
    /// in field units and converted at the boundary
    pub fn set_transfer_function_lower_limit(&mut self, field_value: f32) -> Result<()> {
        let context = self.ready_context()?;
        let Some(texture_value) = field_to_texture_value(context, field_value) else {
            return Ok(());
        };
        edit_active_transfer_function(context, |function| {
            function.set_lower_limit(texture_value.clamp(0.0, 1.0))
        })
    }

    pub fn set_transfer_function_upper_limit(&mut self, field_value: f32) -> Result<()> {
        let context = self.ready_context()?;
        let Some(texture_value) = field_to_texture_value(context, field_value) else {
            return Ok(());
        };
        edit_active_transfer_function(context, |function| {
            function.set_upper_limit(texture_value.clamp(0.0, 1.0))
        })
    }

    /// Sets the value of the first lookup-table node of a component
    pub fn update_transfer_function_lower_node_value(
        &mut self,
        component: usize,
        value: f32,
    ) -> Result<()> {
        let component = validated_component(component)?;
        let value = validated_value(value)?;
        edit_active_transfer_function(self.ready_context()?, |function| {
            function.set_node(component, 0, value)
        })
    }

    /// Sets the value of the last lookup-table node of a component
    pub fn update_transfer_function_upper_node_value(
        &mut self,
        component: usize,
        value: f32,
    ) -> Result<()> {
        let component = validated_component(component)?;
        let value = validated_value(value)?;
        edit_active_transfer_function(self.ready_context()?, |function| {
            function.set_node(component, TF_SIZE - 1, value)
        })
    }

    /// Inserts or replaces an interior piecewise-linear control node
    pub fn update_transfer_function_node_value(
        &mut self,
        component: usize,
        node: usize,
        value: f32,
    ) -> Result<()> {
        let component = validated_component(component)?;
        let node = validated_interior_node(node)?;
        let value = validated_value(value)?;
        edit_active_transfer_function(self.ready_context()?, |function| {
            function.set_node(component, node, value)
        })
    }

    /// Removes an interior piecewise-linear control node
    pub fn remove_transfer_function_node(&mut self, component: usize, node: usize) -> Result<()> {
        let component = validated_component(component)?;
        let node = validated_interior_node(node)?;
        edit_active_transfer_function(self.ready_context()?, |function| {
            function.remove_node(component, node)
        })
    }

    /// Replaces the component with a logarithmic ramp from 0 to 1
    pub fn use_logarithmic_transfer_function_component(&mut self, component: usize) -> Result<()> {
        let component = validated_component(component)?;
        edit_active_transfer_function(self.ready_context()?, |function| {
            function.set_logarithmic(component, 0.0, 1.0)
        })
    }

    /// Installs a custom table for the interior nodes of the component
    pub fn set_custom_transfer_function_component(
        &mut self,
        component: usize,
        values: &[f32],
    ) -> Result<()> {
        let component = validated_component(component)?;
        if values.len() != TF_SIZE - 2 {
            return Err(EngineError::InvalidConfig(format!(
                "custom transfer function component needs {} values, got {}",
                TF_SIZE - 2,
                values.len()
            )));
        }
        edit_active_transfer_function(self.ready_context()?, |function| {
            function.set_custom(component, values)
        })
    }

    /// Reverts the component to the linear ramp (alpha: constant 1)
    pub fn reset_transfer_function_component(&mut self, component: usize) -> Result<()> {
        let component = validated_component(component)?;
        edit_active_transfer_function(self.ready_context()?, |function| {
            function.reset_component(component);
            Ok(())
        })
    }

    pub fn set_camera_field_of_view(&mut self, field_of_view: f32) -> Result<()> {
        if field_of_view <= 0.0 || field_of_view >= 180.0 {
            return Err(EngineError::InvalidConfig(format!(
                "field of view {} must lie strictly between 0 and 180 degrees",
                field_of_view
            )));
        }
        let context = self.ready_context()?;
        context.transformation_mut().set_field_of_view(field_of_view);
        context.note_visual_change();
        Ok(())
    }

    pub fn set_clip_plane_distances(&mut self, near_distance: f32, far_distance: f32) -> Result<()> {
        if near_distance <= 0.0 || far_distance <= near_distance {
            return Err(EngineError::InvalidConfig(format!(
                "clip plane distances ({}, {}) must satisfy 0 < near < far",
                near_distance, far_distance
            )));
        }
        let context = self.ready_context()?;
        context
            .transformation_mut()
            .set_clip_plane_distances(near_distance, far_distance);
        context.note_visual_change();
        Ok(())
    }

    pub fn use_perspective_camera_projection(&mut self) -> Result<()> {
        let context = self.ready_context()?;
        context
            .transformation_mut()
            .set_projection_type(ProjectionType::Perspective);
        context.note_visual_change();
        Ok(())
    }

    pub fn use_orthographic_camera_projection(&mut self) -> Result<()> {
        let context = self.ready_context()?;
        context
            .transformation_mut()
            .set_projection_type(ProjectionType::Orthographic);
        context.note_visual_change();
        Ok(())
    }

    pub fn set_lower_visibility_threshold(&mut self, threshold: f32) -> Result<()> {
        let context = self.ready_context()?;
        context.slicer_mut().set_lower_visibility_threshold(threshold)?;
        context.note_visual_change();
        Ok(())
    }

    pub fn set_upper_visibility_threshold(&mut self, threshold: f32) -> Result<()> {
        let context = self.ready_context()?;
        context.slicer_mut().set_upper_visibility_threshold(threshold)?;
        context.note_visual_change();
        Ok(())
    }

    /// Toggles creation of the field boundary wireframe at the next
    /// bricking
    pub fn set_field_boundary_indicator_creation(&mut self, state: i32) -> Result<()> {
        let enabled = validated_toggle_state(state)?;
        self.ready_context()?.set_field_boundary_indicator_creation(enabled);
        Ok(())
    }

    pub fn set_brick_boundary_indicator_creation(&mut self, state: i32) -> Result<()> {
        let enabled = validated_toggle_state(state)?;
        self.ready_context()?.set_brick_boundary_indicator_creation(enabled);
        Ok(())
    }

    pub fn set_sub_brick_boundary_indicator_creation(&mut self, state: i32) -> Result<()> {
        let enabled = validated_toggle_state(state)?;
        self.ready_context()?.set_sub_brick_boundary_indicator_creation(enabled);
        Ok(())
    }

    pub fn bring_window_to_front(&mut self) -> Result<()> {
        self.ready_context()?.bring_window_to_front();
        Ok(())
    }

    /// Tears the renderer down, releasing every GPU resource
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(mut context) = self.context.take() {
            context.cleanup()?;
        }
        Ok(())
    }
}

fn validated_component(component: usize) -> Result<TfComponent> {
    TfComponent::from_index(component).ok_or_else(|| {
        EngineError::InvalidConfig(format!(
            "transfer function component {} must lie in 0..4",
            component
        ))
    })
}

fn validated_value(value: f32) -> Result<f32> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EngineError::InvalidConfig(format!(
            "transfer function value {} must lie in [0, 1]",
            value
        )));
    }
    Ok(value)
}

fn validated_interior_node(node: usize) -> Result<usize> {
    if !(TF_START_NODE..=TF_END_NODE).contains(&node) {
        return Err(EngineError::InvalidConfig(format!(
            "transfer function node {} must lie in [{}, {}]",
            node, TF_START_NODE, TF_END_NODE
        )));
    }
    Ok(node)
}

fn validated_toggle_state(state: i32) -> Result<bool> {
    if state == 0 || state == 1 {
        Ok(state == 1)
    } else {
        Err(EngineError::InvalidConfig(format!(
            "indicator creation state {} must be 0 or 1",
            state
        )))
    }
}

/// Converts a field-unit value to texture units against the loaded field.
/// Without a field the edit has nothing to address, so it is warned about
/// and dropped like any other edit on an inactive transfer function.
fn field_to_texture_value(context: &RenderContext, field_value: f32) -> Option<f32> {
    match context.bricked_field() {
        Some(bricked) => Some(bricked.field().field_value_to_texture_value(field_value)),
        None => {
            warn!("cannot convert field value before a field is loaded");
            None
        }
    }
}

/// Routes an edit to the active transfer function. Semantic edit failures
/// are non-fatal: they are logged and the edit is dropped.
fn edit_active_transfer_function(
    context: &mut RenderContext,
    edit: impl FnOnce(&mut TransferFunction) -> Result<()>,
) -> Result<()> {
    let Some(name) = context.active_transfer_function().map(String::from) else {
        warn!("cannot modify inactive transfer function");
        return Ok(());
    };

    if let Err(error) = context.transfer_functions_mut().edit(&name, edit) {
        warn!("transfer function edit ignored: {}", error);
        return Ok(());
    }

    context.note_edit();
    Ok(())
}

#[cfg(test)]
mod host_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::gpu::{HeadlessGpu, PrimitiveKind};
    use crate::renderer::HeadlessWindow;
    use crate::transfer::TfComponent;

    fn initialized_host() -> (Host, Rc<RefCell<HeadlessGpu>>, Rc<RefCell<HeadlessWindow>>) {
        let gpu = Rc::new(RefCell::new(HeadlessGpu::new()));
        let window = Rc::new(RefCell::new(HeadlessWindow::new()));
        let mut host = Host::new();
        host.initialize(Box::new(gpu.clone()), Box::new(window.clone()))
            .ok()
            .unwrap();
        (host, gpu, window)
    }

    fn write_bifrost_files(stem: &str) -> String {
        let size = 16usize;
        let endianness = if cfg!(target_endian = "little") { 'l' } else { 'b' };
        let header = format!(
            "element_kind : f\nelement_size : 4\nendianness : {}\ndimensions : 3\norder : C\n\
             x_size : {s}\ny_size : {s}\nz_size : {s}\ndx : 1.0\ndy : 1.0\ndz : 1.0\n",
            endianness,
            s = size
        );

        let base = std::env::temp_dir().join(stem);
        let base = base.to_str().unwrap().to_string();
        std::fs::write(format!("{}.dat", base), header).ok().unwrap();

        let length = size * size * size;
        let bytes: Vec<u8> = (0..length)
            .map(|i| ((i * 11) % 101) as f32)
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        std::fs::write(format!("{}.raw", base), bytes).ok().unwrap();
        base
    }

    fn load_test_field(host: &mut Host, stem: &str) {
        let base = write_bifrost_files(stem);
        host.set_brick_size_power_of_two(3).ok().unwrap();
        host.set_minimum_sub_brick_size(2).ok().unwrap();
        host.set_field_from_bifrost_file("test_field", &base).ok().unwrap();
    }

    #[test]
    fn test_operations_require_initialization() {
        let mut host = Host::new();
        assert!(!host.is_initialized());
        assert!(host.step().is_err());
        assert!(host.refresh_frame().is_err());
        assert!(host.set_camera_field_of_view(45.0).is_err());
    }

    #[test]
    fn test_initialize_enters_ready_state_once() {
        let (mut host, _gpu, _window) = initialized_host();
        assert!(host.is_initialized());

        let gpu = Box::new(HeadlessGpu::new());
        let window = Box::new(HeadlessWindow::new());
        assert!(host.initialize(gpu, window).is_err());
    }

    #[test]
    fn test_field_load_and_step() {
        let (mut host, gpu, _window) = initialized_host();
        load_test_field(&mut host, "host_step");

        assert!(host.context().unwrap().bricked_field().is_some());
        assert!(host.step().ok().unwrap());
        assert!(gpu.borrow().draw_count() > 0);
    }

    #[test]
    fn test_argument_range_validation() {
        let (mut host, _gpu, _window) = initialized_host();

        assert!(host.set_camera_field_of_view(0.0).is_err());
        assert!(host.set_camera_field_of_view(180.0).is_err());
        assert!(host.set_camera_field_of_view(90.0).is_ok());

        assert!(host.set_clip_plane_distances(0.0, 1.0).is_err());
        assert!(host.set_clip_plane_distances(1.0, 0.5).is_err());
        assert!(host.set_clip_plane_distances(0.1, 10.0).is_ok());

        assert!(host.update_transfer_function_node_value(4, 10, 0.5).is_err());
        assert!(host.update_transfer_function_node_value(0, 0, 0.5).is_err());
        assert!(host.update_transfer_function_node_value(0, 255, 0.5).is_err());
        assert!(host.update_transfer_function_node_value(0, 10, 1.5).is_err());

        assert!(host.set_minimum_sub_brick_size(0).is_err());

        // state flags accept exactly 0 and 1
        assert!(host.set_field_boundary_indicator_creation(0).is_ok());
        assert!(host.set_field_boundary_indicator_creation(1).is_ok());
        assert!(host.set_brick_boundary_indicator_creation(2).is_err());
        assert!(host.set_sub_brick_boundary_indicator_creation(-1).is_err());
    }

    #[test]
    fn test_edits_without_a_field_are_ignored() {
        let (mut host, _gpu, _window) = initialized_host();

        assert!(host.update_transfer_function_node_value(3, 128, 0.5).is_ok());
        assert!(host.set_transfer_function_lower_limit(0.2).is_ok());
        assert!(host.reset_transfer_function_component(0).is_ok());
    }

    #[test]
    fn test_transfer_function_edit_reaches_the_registry() {
        let (mut host, _gpu, _window) = initialized_host();
        load_test_field(&mut host, "host_tf_edit");

        host.update_transfer_function_node_value(3, 128, 0.25).ok().unwrap();

        let context = host.context().unwrap();
        let name = context.active_transfer_function().unwrap();
        let function = context.transfer_functions().get(name).unwrap();
        assert!((function.node_value(TfComponent::Alpha, 128) - 0.25).abs() < 1e-6);
        assert!(function.is_fixed_node(TfComponent::Alpha, 128));
    }

    #[test]
    fn test_window_limits_are_converted_from_field_units() {
        let (mut host, _gpu, _window) = initialized_host();
        load_test_field(&mut host, "host_tf_window");

        // the field values span [0, 100]; field value 25 is texture 0.25
        host.set_transfer_function_lower_limit(25.0).ok().unwrap();
        host.set_transfer_function_upper_limit(75.0).ok().unwrap();

        let context = host.context().unwrap();
        let name = context.active_transfer_function().unwrap();
        let function = context.transfer_functions().get(name).unwrap();
        assert!((function.lower_limit() - 0.25).abs() < 1e-6);
        assert!((function.upper_limit() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_autorefresh_deferral_matches_eager_refresh() {
        let edits = |host: &mut Host| {
            host.update_transfer_function_node_value(3, 100, 0.3).ok().unwrap();
            host.update_transfer_function_node_value(3, 200, 0.8).ok().unwrap();
            host.update_transfer_function_lower_node_value(3, 0.1).ok().unwrap();
        };

        let volume_draws = |gpu: &Rc<RefCell<HeadlessGpu>>| {
            gpu.borrow()
                .draws
                .iter()
                .filter(|draw| draw.primitive == PrimitiveKind::Triangles)
                .map(|draw| (draw.index_count, draw.bound_texture_3d.map(|t| t.0)))
                .collect::<Vec<_>>()
        };

        let (mut eager, eager_gpu, _window) = initialized_host();
        load_test_field(&mut eager, "host_autorefresh_on");
        eager.step().ok().unwrap();
        eager_gpu.borrow_mut().reset_draws();
        edits(&mut eager);
        eager.step().ok().unwrap();
        let eager_draws = volume_draws(&eager_gpu);
        assert!(!eager_draws.is_empty());

        let (mut deferred, deferred_gpu, _window) = initialized_host();
        load_test_field(&mut deferred, "host_autorefresh_off");
        deferred.step().ok().unwrap();
        deferred.disable_autorefresh().ok().unwrap();
        deferred_gpu.borrow_mut().reset_draws();
        edits(&mut deferred);
        deferred.step().ok().unwrap();
        // no redraw happened while autorefresh was off
        assert!(volume_draws(&deferred_gpu).is_empty());

        deferred.refresh_frame().ok().unwrap();
        deferred.step().ok().unwrap();
        assert!(volume_draws(&deferred_gpu) == eager_draws);
    }

    #[test]
    fn test_refresh_visibility_schedules_recompute() {
        let (mut host, gpu, _window) = initialized_host();
        load_test_field(&mut host, "host_refresh_visibility");
        host.step().ok().unwrap();

        gpu.borrow_mut().reset_draws();
        host.refresh_visibility().ok().unwrap();
        assert!(host.step().ok().unwrap());
        assert!(gpu.borrow().draw_count() > 0);
    }

    #[test]
    fn test_field_value_clip_range() {
        let (mut host, _gpu, _window) = initialized_host();
        load_test_field(&mut host, "host_clip_range");

        assert!(host.set_field_value_clip_range(60.0, 40.0).is_err());
        host.set_field_value_clip_range(20.0, 80.0).ok().unwrap();

        let field_range = {
            let context = host.context().unwrap();
            let field = context.bricked_field().unwrap().field();
            (field.min_value(), field.max_value())
        };
        assert!((field_range.0 - 20.0).abs() < 1.0);
        assert!((field_range.1 - 80.0).abs() < 1.0);
    }

    #[test]
    fn test_window_controls() {
        let (mut host, _gpu, window) = initialized_host();

        host.bring_window_to_front().ok().unwrap();
        assert!(window.borrow().focus_count == 1);

        host.cleanup().ok().unwrap();
        assert!(!host.is_initialized());
    }

    #[test]
    fn test_run_terminates_on_close() {
        let (mut host, _gpu, window) = initialized_host();
        window
            .borrow_mut()
            .queued_events
            .push(crate::renderer::WindowEvent::CloseRequested);

        host.run().ok().unwrap();
        assert!(window.borrow().swap_count == 1);
    }
}
