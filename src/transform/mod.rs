pub mod controller;
pub mod trackball;


use nalgebra::{Matrix4, Unit, Vector3};

/// Camera projection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

pub const DEFAULT_FIELD_OF_VIEW: f32 = 60.0;
pub const DEFAULT_NEAR_DISTANCE: f32 = 0.1;
pub const DEFAULT_FAR_DISTANCE: f32 = 100.0;

#[derive(Debug, Clone, Copy)]
pub struct Projection {
    field_of_view: f32,
    aspect_ratio: f32,
    near_distance: f32,
    far_distance: f32,
    projection_type: ProjectionType,
    matrix: Matrix4<f32>,
}

impl Projection {
    fn new() -> Self {
        let mut projection = Self {
            field_of_view: DEFAULT_FIELD_OF_VIEW,
            aspect_ratio: 1.0,
            near_distance: DEFAULT_NEAR_DISTANCE,
            far_distance: DEFAULT_FAR_DISTANCE,
            projection_type: ProjectionType::Perspective,
            matrix: Matrix4::identity(),
        };
        projection.recompute();
        projection
    }

    fn recompute(&mut self) {
        self.matrix = match self.projection_type {
            ProjectionType::Perspective => perspective_matrix(
                self.field_of_view,
                self.aspect_ratio,
                self.near_distance,
                self.far_distance,
            ),
            ProjectionType::Orthographic => orthographic_matrix(
                self.field_of_view,
                self.aspect_ratio,
                self.near_distance,
                self.far_distance,
            ),
        };
    }
}

/// Camera state derived from the view transform
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    look_axis: Vector3<f32>,
    position: Vector3<f32>,
}

/// Model, view and projection composition with the derived matrices and
/// camera state kept in sync after every change.
#[derive(Debug, Clone)]
pub struct Transformation {
    model: Matrix4<f32>,
    view: Matrix4<f32>,
    projection: Projection,
    modelview: Matrix4<f32>,
    mvp: Matrix4<f32>,
    inverse_view: Matrix4<f32>,
    camera: Camera,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformation {
    pub fn new() -> Self {
        let mut transformation = Self {
            model: Matrix4::identity(),
            view: Matrix4::identity(),
            projection: Projection::new(),
            modelview: Matrix4::identity(),
            mvp: Matrix4::identity(),
            inverse_view: Matrix4::identity(),
            camera: Camera {
                look_axis: Vector3::z(),
                position: Vector3::zeros(),
            },
        };
        transformation.sync();
        transformation
    }

    /// Places the camera `view_distance` in front of the origin
    pub fn set_view_distance(&mut self, view_distance: f32) {
        self.view[(0, 3)] = 0.0;
        self.view[(1, 3)] = 0.0;
        self.view[(2, 3)] = -view_distance;
        self.sync();
    }

    pub fn apply_model_scaling(&mut self, scale: f32) {
        debug_assert!(scale > 0.0);
        self.model = Matrix4::new_scaling(scale) * self.model;
        self.sync();
    }

    pub fn apply_model_translation(&mut self, translation: Vector3<f32>) {
        self.model = Matrix4::new_translation(&translation) * self.model;
        self.sync();
    }

    /// Rotates the view about the given eye-space axis while keeping its
    /// translation
    pub fn apply_origin_centered_view_rotation(&mut self, axis: &Unit<Vector3<f32>>, angle: f32) {
        let translation = self.view.fixed_view::<3, 1>(0, 3).into_owned();

        self.view[(0, 3)] = 0.0;
        self.view[(1, 3)] = 0.0;
        self.view[(2, 3)] = 0.0;
        self.view = Matrix4::from_axis_angle(axis, angle) * self.view;
        self.view[(0, 3)] = translation.x;
        self.view[(1, 3)] = translation.y;
        self.view[(2, 3)] = translation.z;

        self.sync();
    }

    pub fn set_field_of_view(&mut self, field_of_view: f32) {
        self.projection.field_of_view = field_of_view;
        self.projection.recompute();
        self.sync();
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.projection.aspect_ratio = aspect_ratio;
        self.projection.recompute();
        self.sync();
    }

    pub fn set_clip_plane_distances(&mut self, near_distance: f32, far_distance: f32) {
        self.projection.near_distance = near_distance;
        self.projection.far_distance = far_distance;
        self.projection.recompute();
        self.sync();
    }

    pub fn set_projection_type(&mut self, projection_type: ProjectionType) {
        self.projection.projection_type = projection_type;
        self.projection.recompute();
        self.sync();
    }

    pub fn projection_type(&self) -> ProjectionType {
        self.projection.projection_type
    }

    pub fn field_of_view(&self) -> f32 {
        self.projection.field_of_view
    }

    pub fn model_view_projection_matrix(&self) -> &Matrix4<f32> {
        &self.mvp
    }

    pub fn inverse_view_matrix(&self) -> &Matrix4<f32> {
        &self.inverse_view
    }

    pub fn look_axis(&self) -> Vector3<f32> {
        self.camera.look_axis
    }

    pub fn camera_position(&self) -> Vector3<f32> {
        self.camera.position
    }

    pub fn model_scale(&self, axis: usize) -> f32 {
        self.model[(axis, axis)]
    }

    /// Component of the vector from a model-space point to the camera, used
    /// to order tree children back to front. Under an orthographic
    /// projection the ordering only depends on the look axis.
    pub fn camera_delta_component(&self, point: &Vector3<f32>, axis: usize) -> f32 {
        match self.projection.projection_type {
            ProjectionType::Perspective => {
                self.camera.position[axis] - point[axis] * self.model_scale(axis)
            }
            ProjectionType::Orthographic => self.camera.look_axis[axis],
        }
    }

    fn sync(&mut self) {
        self.modelview = self.view * self.model;
        self.mvp = self.projection.matrix * self.modelview;
        self.inverse_view = rigid_inverse(&self.view);

        // camera position and look axis are the fourth and third columns of
        // the inverse view transform
        self.camera.look_axis = self
            .inverse_view
            .fixed_view::<3, 1>(0, 2)
            .into_owned()
            .normalize();
        self.camera.position = self.inverse_view.fixed_view::<3, 1>(0, 3).into_owned();
    }
}

/// Symmetric-frustum perspective projection. The vertical scale follows
/// from the horizontal one and the aspect ratio (height over width).
pub fn perspective_matrix(
    field_of_view: f32,
    aspect_ratio: f32,
    near_distance: f32,
    far_distance: f32,
) -> Matrix4<f32> {
    debug_assert!(field_of_view > 0.0 && field_of_view < 360.0);
    debug_assert!(aspect_ratio > 0.0);
    debug_assert!(near_distance > 0.0 && far_distance > near_distance);

    let x_scale = 1.0 / (0.5 * field_of_view.to_radians()).tan();
    let y_scale = x_scale * aspect_ratio;
    let frustum_length = far_distance - near_distance;

    Matrix4::new(
        x_scale, 0.0, 0.0, 0.0,
        0.0, y_scale, 0.0, 0.0,
        0.0, 0.0, -(far_distance + near_distance) / frustum_length,
        -(2.0 * near_distance * far_distance) / frustum_length,
        0.0, 0.0, -1.0, 0.0,
    )
}

/// Orthographic projection over a box of the given width
pub fn orthographic_matrix(
    width: f32,
    aspect_ratio: f32,
    near_distance: f32,
    far_distance: f32,
) -> Matrix4<f32> {
    debug_assert!(width > 0.0);
    debug_assert!(aspect_ratio > 0.0);
    debug_assert!(near_distance > 0.0 && far_distance > near_distance);

    let height = width * aspect_ratio;
    let depth = far_distance - near_distance;

    Matrix4::new(
        2.0 / width, 0.0, 0.0, 0.0,
        0.0, 2.0 / height, 0.0, 0.0,
        0.0, 0.0, -2.0 / depth, -(far_distance + near_distance) / depth,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Inverse of a rigid transform (orthonormal rotation plus translation)
fn rigid_inverse(m: &Matrix4<f32>) -> Matrix4<f32> {
    let rotation = m.fixed_view::<3, 3>(0, 0).into_owned();
    let translation = m.fixed_view::<3, 1>(0, 3).into_owned();

    let rotation_inverse = rotation.transpose();
    let translation_inverse = -(rotation_inverse * translation);

    let mut result = Matrix4::identity();
    result.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation_inverse);
    result.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation_inverse);
    result
}
