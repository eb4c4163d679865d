//! Virtual trackball turning cursor drags into rotation axes and angles.
//!
//! Points near the centre of the window are projected onto a sphere and
//! points further out onto a hyperbolic sheet, so the rotation stays well
//! behaved when the cursor leaves the sphere silhouette.

use nalgebra::{Unit, Vector3};

pub struct Trackball {
    radius: f64,
    previous_activation_point: Vector3<f64>,
}

impl Default for Trackball {
    fn default() -> Self {
        Self::new()
    }
}

impl Trackball {
    pub fn new() -> Self {
        Self {
            radius: 1.0,
            previous_activation_point: Vector3::new(0.0, 0.0, 1.0),
        }
    }

    /// Anchors the trackball at the given cursor position
    pub fn activate(&mut self, screen_x: f64, screen_y: f64, screen_size: (u32, u32)) {
        let (x, y) = screen_to_trackball_coords(screen_x, screen_y, screen_size);
        self.previous_activation_point = self.trackball_point(x, y);
    }

    /// Advances the drag to a new cursor position, yielding the eye-space
    /// rotation to apply. Returns `None` while the cursor has not moved.
    pub fn drag(
        &mut self,
        screen_x: f64,
        screen_y: f64,
        screen_size: (u32, u32),
    ) -> Option<(Unit<Vector3<f32>>, f32)> {
        let (x, y) = screen_to_trackball_coords(screen_x, screen_y, screen_size);
        let current_activation_point = self.trackball_point(x, y);

        let rotation_axis = self.previous_activation_point.cross(&current_activation_point);
        let angle = self
            .previous_activation_point
            .dot(&current_activation_point)
            .clamp(-1.0, 1.0)
            .acos();

        let result = Unit::try_new(
            Vector3::new(
                rotation_axis.x as f32,
                rotation_axis.y as f32,
                rotation_axis.z as f32,
            ),
            1e-8,
        )
        .map(|axis| (axis, angle as f32));

        self.previous_activation_point = current_activation_point;
        result
    }

    /// Scales the trackball radius together with the scene
    pub fn scale(&mut self, scale: f64) {
        self.radius *= scale;
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    fn trackball_point(&self, x: f64, y: f64) -> Vector3<f64> {
        Vector3::new(x, y, self.pick_depth(x, y)).normalize()
    }

    /// Project to the sphere close to the centre and to a hyperbolic
    /// surface further out
    fn pick_depth(&self, x: f64, y: f64) -> f64 {
        let squared_2d_radius = x * x + y * y;
        let squared_radius = self.radius * self.radius;
        let squared_2d_radius_limit = 0.5 * squared_radius;

        if squared_2d_radius <= squared_2d_radius_limit {
            (squared_radius - squared_2d_radius).sqrt()
        } else {
            squared_2d_radius_limit / squared_2d_radius.sqrt()
        }
    }
}

fn screen_to_trackball_coords(
    screen_x: f64,
    screen_y: f64,
    screen_size: (u32, u32),
) -> (f64, f64) {
    let (width, height) = (screen_size.0 as f64, screen_size.1 as f64);
    let scale = 2.0 / height;
    (
        scale * (screen_x - 0.5 * width),
        -scale * (screen_y - 0.5 * height),
    )
}
