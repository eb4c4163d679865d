//! Camera controller translating drag and scroll input into view rotation,
//! model scaling and temporary sampling degradation.

use crate::transform::trackball::Trackball;
use crate::transform::Transformation;

pub const DEFAULT_ZOOM_RATE: f64 = 1e-2;
pub const DEFAULT_DRAG_SEPARATION_FACTOR: f32 = 2.0;

/// What the controller wants done to the slicer's plane separation
/// multiplier in response to an input event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeparationChange {
    Unchanged,
    Set(f32),
}

pub struct CameraController {
    enabled: bool,
    dragging: bool,
    zoom_rate: f64,
    /// While dragging, the plane separation is multiplied by this factor to
    /// trade sampling density for frame rate
    drag_separation_factor: f32,
    saved_separation_multiplier: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraController {
    pub fn new() -> Self {
        Self {
            enabled: true,
            dragging: false,
            zoom_rate: DEFAULT_ZOOM_RATE,
            drag_separation_factor: DEFAULT_DRAG_SEPARATION_FACTOR,
            saved_separation_multiplier: 0.0,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Starts a rotation drag. `current_separation_multiplier` is the
    /// slicer's active plane separation multiplier, restored when the drag
    /// ends.
    pub fn begin_drag(
        &mut self,
        trackball: &mut Trackball,
        screen_x: f64,
        screen_y: f64,
        screen_size: (u32, u32),
        current_separation_multiplier: f32,
    ) -> SeparationChange {
        if !self.enabled {
            return SeparationChange::Unchanged;
        }

        trackball.activate(screen_x, screen_y, screen_size);
        self.saved_separation_multiplier = current_separation_multiplier;
        self.dragging = true;

        SeparationChange::Set(current_separation_multiplier * self.drag_separation_factor)
    }

    pub fn drag(
        &mut self,
        trackball: &mut Trackball,
        transformation: &mut Transformation,
        screen_x: f64,
        screen_y: f64,
        screen_size: (u32, u32),
    ) {
        if !self.enabled || !self.dragging {
            return;
        }

        if let Some((axis, angle)) = trackball.drag(screen_x, screen_y, screen_size) {
            transformation.apply_origin_centered_view_rotation(&axis, angle);
        }
    }

    pub fn end_drag(&mut self) -> SeparationChange {
        if !self.dragging {
            return SeparationChange::Unchanged;
        }
        self.dragging = false;
        SeparationChange::Set(self.saved_separation_multiplier)
    }

    /// Applies a scroll step as an exponential zoom of the model and the
    /// trackball radius
    pub fn scroll(
        &mut self,
        trackball: &mut Trackball,
        transformation: &mut Transformation,
        scroll_rate: f64,
    ) {
        if !self.enabled {
            return;
        }

        let scale = (self.zoom_rate * scroll_rate).exp();
        trackball.scale(scale);
        transformation.apply_model_scaling(scale as f32);
    }
}
