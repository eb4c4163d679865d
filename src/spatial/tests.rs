#[cfg(test)]
mod spatial_tests {
    use crate::spatial::lut::{CUBE_CORNERS, CUBE_EDGES, OPPOSITE_CORNERS};
    use crate::spatial::{back_corner_for_direction, front_corner_for_direction, Aabb};
    use nalgebra::Vector3;

    #[test]
    fn test_back_and_front_corners_are_antipodal() {
        let directions = [
            Vector3::new(1., 1., 1.),
            Vector3::new(-1., 1., 1.),
            Vector3::new(1., -1., 1.),
            Vector3::new(1., 1., -1.),
            Vector3::new(-1., -1., 1.),
            Vector3::new(-1., 1., -1.),
            Vector3::new(1., -1., -1.),
            Vector3::new(-1., -1., -1.),
            Vector3::new(0.3, -0.8, 0.52),
        ];

        for direction in directions {
            let back = back_corner_for_direction(&direction);
            let front = front_corner_for_direction(&direction);
            assert!(front == OPPOSITE_CORNERS[back]);
        }
    }

    #[test]
    fn test_back_corner_minimizes_projection_onto_direction() {
        let direction = Vector3::new(0.7, -0.3, 0.65).normalize();
        let back = back_corner_for_direction(&direction);

        let back_projection = Vector3::from(CUBE_CORNERS[back]).dot(&direction);
        for corner in CUBE_CORNERS {
            assert!(back_projection <= Vector3::from(corner).dot(&direction) + 1e-6);
        }
    }

    #[test]
    fn test_every_cube_edge_has_unit_length() {
        for edge in CUBE_EDGES {
            let start = Vector3::from(CUBE_CORNERS[edge[0]]);
            let end = Vector3::from(CUBE_CORNERS[edge[1]]);
            assert!(((end - start).norm() - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_aabb_corner_and_containment() {
        let outer = Aabb::new(Vector3::new(-1., -1., -1.), Vector3::new(2., 2., 2.));
        let inner = Aabb::new(Vector3::new(-0.5, 0., -1.), Vector3::new(1., 1., 1.));

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.corner(7) == Vector3::new(1., 1., 1.));
        assert!(outer.corner(0) == outer.offset);
        assert!((outer.volume() - 8.0).abs() < f32::EPSILON);
    }
}
