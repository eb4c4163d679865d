#[cfg(test)]
mod bricking_tests {
    use crate::bricks::{create_bricked_field, BrickOrientation, BrickingConfig};
    use crate::field::Field;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    pub(super) fn random_field(size: [usize; 3], seed: u64) -> Field {
        let mut rng = StdRng::seed_from_u64(seed);
        let length = size[0] * size[1] * size[2];
        let mut data: Vec<f32> = (0..length).map(|_| rng.gen_range(0.0..100.0)).collect();
        // pin the limits so normalisation is exact
        data[0] = 0.0;
        data[length - 1] = 100.0;
        Field::from_raw_data("random", data, size, [1.0, 1.0, 1.0]).ok().unwrap()
    }

    fn config(brick_size: usize) -> BrickingConfig {
        BrickingConfig {
            brick_size,
            ..BrickingConfig::default()
        }
    }

    #[test]
    fn test_single_brick_field_has_no_padding() {
        let field = random_field([64, 64, 64], 1);
        let bricked = create_bricked_field(field, &config(64)).ok().unwrap();

        assert!(bricked.brick_count() == 1);
        assert!(bricked.pad_size() == 0);
        assert!(bricked.bricks()[0].padded_size() == [64, 64, 64]);
        assert!(bricked.bricks()[0].size() == [64, 64, 64]);
        assert!(bricked.tree().len() == 1);
        assert!(bricked.tree().node(bricked.tree().root()).is_leaf());
        assert!(!bricked.bricks()[0].sub_tree().is_empty());
    }

    #[test]
    fn test_even_tiling_gives_one_brick_per_octant() {
        let field = random_field([128, 128, 128], 2);
        let bricked = create_bricked_field(field, &config(64)).ok().unwrap();

        assert!(bricked.n_bricks() == [2, 2, 2]);
        assert!(bricked.brick_count() == 8);

        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    let brick = bricked.brick_at(i, j, k);
                    assert!(brick.orientation().cycle() == (i + j + k) % 3);
                    assert!(brick.offset() == [i * 64, j * 64, k * 64]);
                    assert!(brick.size() == [64, 64, 64]);
                }
            }
        }
    }

    #[test]
    fn test_uneven_tiling_truncates_edge_bricks() {
        let field = random_field([130, 96, 64], 3);
        let bricked = create_bricked_field(field, &config(64)).ok().unwrap();

        assert!(bricked.pad_size() == 1);
        assert!(bricked.n_bricks() == [3, 2, 1]);
        assert!(bricked.brick_at(2, 0, 0).size()[0] == 2);
        assert!(bricked.brick_at(1, 1, 0).size() == [64, 32, 64]);

        // interior faces are padded, exterior faces are not
        let middle = bricked.brick_at(1, 0, 0);
        assert!(middle.padded_size().iter().product::<usize>() == 66 * 65 * 64);

        let first = bricked.brick_at(0, 0, 0);
        let first_padded: usize = first.padded_size().iter().product();
        assert!(first_padded == 65 * 65 * 64);
    }

    #[test]
    fn test_unpadded_volumes_sum_to_field_volume() {
        for (size, brick_size) in [
            ([130, 96, 64], 64),
            ([64, 64, 64], 16),
            ([33, 9, 17], 8),
        ] {
            let field = random_field(size, 4);
            let bricked = create_bricked_field(field, &config(brick_size)).ok().unwrap();

            let total: usize = bricked.bricks().iter().map(|b| b.unpadded_volume()).sum();
            assert!(total == size[0] * size[1] * size[2]);
        }
    }

    #[test]
    fn test_face_neighbours_have_different_orientations() {
        let field = random_field([96, 96, 96], 5);
        let bricked = create_bricked_field(field, &config(32)).ok().unwrap();
        let [nx, ny, nz] = bricked.n_bricks();

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let orientation = bricked.brick_at(i, j, k).orientation();
                    if i + 1 < nx {
                        assert!(bricked.brick_at(i + 1, j, k).orientation() != orientation);
                    }
                    if j + 1 < ny {
                        assert!(bricked.brick_at(i, j + 1, k).orientation() != orientation);
                    }
                    if k + 1 < nz {
                        assert!(bricked.brick_at(i, j, k + 1).orientation() != orientation);
                    }
                }
            }
        }
    }

    #[test]
    fn test_cycled_layout_preserves_voxel_values() {
        let field_size = [20, 12, 10];
        let field = random_field(field_size, 6);
        let expected: Vec<f32> = field.data().to_vec();
        let bricked = create_bricked_field(
            field,
            &BrickingConfig {
                brick_size: 8,
                ..BrickingConfig::default()
            },
        )
        .ok()
        .unwrap();

        let pad = bricked.pad_size();
        let [nx, ny, nz] = bricked.n_bricks();
        let storage_orders = [[0, 1, 2], [1, 2, 0], [2, 0, 1]];

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let brick = bricked.brick_at(i, j, k);
                    let brick_idx = [i, j, k];
                    let n_bricks = [nx, ny, nz];

                    let src_offset: Vec<usize> = (0..3)
                        .map(|a| brick.offset()[a] - (brick_idx[a] > 0) as usize * pad)
                        .collect();
                    let padded: Vec<usize> = (0..3)
                        .map(|a| {
                            brick.size()[a]
                                + (brick_idx[a] > 0) as usize * pad
                                + (brick_idx[a] < n_bricks[a] - 1) as usize * pad
                        })
                        .collect();

                    let order = storage_orders[brick.orientation().cycle()];
                    let data = bricked.brick_data(brick);

                    for z in 0..padded[2] {
                        for y in 0..padded[1] {
                            for x in 0..padded[0] {
                                let coords = [x, y, z];
                                let stored_idx = (coords[order[2]] * padded[order[1]]
                                    + coords[order[1]])
                                    * padded[order[0]]
                                    + coords[order[0]];
                                let field_idx = ((src_offset[2] + z) * field_size[1]
                                    + (src_offset[1] + y))
                                    * field_size[0]
                                    + (src_offset[0] + x);
                                assert!(data[stored_idx] == expected[field_idx]);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_rejects_oversized_bricks_and_bad_config() {
        let field = random_field([16, 16, 16], 7);
        assert!(create_bricked_field(field, &config(64)).is_err());

        let field = random_field([16, 16, 16], 8);
        assert!(create_bricked_field(
            field,
            &BrickingConfig {
                brick_size: 12,
                ..BrickingConfig::default()
            }
        )
        .is_err());

        let field = random_field([16, 16, 16], 9);
        assert!(create_bricked_field(
            field,
            &BrickingConfig {
                kernel_size: 0,
                ..BrickingConfig::default()
            }
        )
        .is_err());
    }

    #[test]
    fn test_orientation_cycle_mapping() {
        assert!(BrickOrientation::from_cycle(0) == BrickOrientation::Zyx);
        assert!(BrickOrientation::from_cycle(1) == BrickOrientation::Xzy);
        assert!(BrickOrientation::from_cycle(2) == BrickOrientation::Yxz);
    }
}

#[cfg(test)]
mod tree_tests {
    use super::bricking_tests::random_field;
    use crate::bricks::types::{BrickTree, SubBrickTree, NO_NODE};
    use crate::bricks::{create_bricked_field, BrickedField, BrickingConfig};

    fn brick_it(size: [usize; 3], brick_size: usize, min_sub_brick_size: usize) -> BrickedField {
        let field = random_field(size, 42);
        create_bricked_field(
            field,
            &BrickingConfig {
                brick_size,
                min_sub_brick_size,
                ..BrickingConfig::default()
            },
        )
        .ok()
        .unwrap()
    }

    fn check_brick_tree_node(tree: &BrickTree, idx: u32) {
        let node = tree.node(idx);
        if node.is_leaf() {
            return;
        }

        let lower = tree.node(node.lower_child);
        let upper = tree.node(node.upper_child);
        let axis = node.split_axis;

        // extent along the split axis is the sum of the children's, the
        // other components match both children
        let extent_sum = lower.spatial.extent[axis] + upper.spatial.extent[axis];
        assert!((node.spatial.extent[axis] - extent_sum).abs() < 1e-5);
        for other_axis in (0..3).filter(|&a| a != axis) {
            assert!((node.spatial.extent[other_axis] - lower.spatial.extent[other_axis]).abs() < 1e-6);
            assert!((node.spatial.extent[other_axis] - upper.spatial.extent[other_axis]).abs() < 1e-6);
        }

        assert!(node.spatial.contains(&lower.spatial));
        assert!(node.spatial.contains(&upper.spatial));

        check_brick_tree_node(tree, node.lower_child);
        check_brick_tree_node(tree, node.upper_child);
    }

    fn check_sub_brick_tree_node(tree: &SubBrickTree, idx: u32, min_sub_brick_size: usize) {
        let node = tree.node(idx);
        if node.is_leaf() {
            assert!(node.lower_child == NO_NODE && node.upper_child == NO_NODE);
            return;
        }

        let axis = node.split_axis;
        // splits only happen while the span is at least twice the minimum
        assert!(node.size[axis] >= 2 * min_sub_brick_size);

        let lower = tree.node(node.lower_child);
        let upper = tree.node(node.upper_child);
        assert!(lower.size[axis] + upper.size[axis] == node.size[axis]);
        assert!(lower.size[axis] >= min_sub_brick_size);
        assert!(upper.size[axis] >= min_sub_brick_size);
        assert!(node.spatial.contains(&lower.spatial));
        assert!(node.spatial.contains(&upper.spatial));

        check_sub_brick_tree_node(tree, node.lower_child, min_sub_brick_size);
        check_sub_brick_tree_node(tree, node.upper_child, min_sub_brick_size);
    }

    #[test]
    fn test_brick_tree_extents_and_containment() {
        for bricked in [
            brick_it([130, 96, 64], 64, 6),
            brick_it([96, 96, 96], 32, 6),
            brick_it([33, 9, 17], 8, 3),
        ] {
            check_brick_tree_node(bricked.tree(), bricked.tree().root());
        }
    }

    #[test]
    fn test_brick_tree_covers_every_brick_exactly_once() {
        let bricked = brick_it([96, 96, 96], 32, 6);
        let mut leaf_bricks = Vec::new();

        for idx in 0..bricked.tree().len() as u32 {
            let node = bricked.tree().node(idx);
            if node.is_leaf() {
                leaf_bricks.push(node.brick_idx);
            }
        }

        leaf_bricks.sort_unstable();
        let expected: Vec<u32> = (0..bricked.brick_count() as u32).collect();
        assert!(leaf_bricks == expected);
    }

    #[test]
    fn test_sub_brick_trees_respect_minimum_size() {
        let min_sub_brick_size = 6;
        let bricked = brick_it([130, 96, 64], 64, min_sub_brick_size);

        for brick in bricked.bricks() {
            check_sub_brick_tree_node(brick.sub_tree(), brick.sub_tree().root(), min_sub_brick_size);
        }
    }

    #[test]
    fn test_sub_brick_leaves_partition_the_brick() {
        let bricked = brick_it([64, 64, 64], 32, 6);

        for brick in bricked.bricks() {
            let leaf_volume: usize = (0..brick.sub_tree().len() as u32)
                .map(|idx| brick.sub_tree().node(idx))
                .filter(|node| node.is_leaf())
                .map(|node| node.voxel_count())
                .sum();
            assert!(leaf_volume == brick.unpadded_volume());
        }
    }

    #[test]
    fn test_brick_size_matching_one_axis_only() {
        // brick size equal to the field size along x only: one brick along
        // x without padding there, tiled with padding along y and z
        let bricked = brick_it([64, 128, 128], 64, 6);

        assert!(bricked.n_bricks() == [1, 2, 2]);
        assert!(bricked.pad_size() == 1);

        let brick = bricked.brick_at(0, 0, 0);
        assert!(brick.padded_size().iter().product::<usize>() == 64 * 65 * 65);
    }
}
