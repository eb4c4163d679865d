//! Construction of the brick tree and the per-brick sub-brick trees.
//!
//! Both trees are binary space partitions whose split axis follows the
//! recursion level (`level mod 3`), advancing past axes that cannot be
//! subdivided further. Nodes live in a dense array and refer to their
//! children by index.

use nalgebra::Vector3;

use crate::bricks::types::{
    Brick, BrickTree, BrickTreeNode, RegionVisibility, SubBrickTree, SubBrickTreeNode, NO_NODE,
};
use crate::spatial::Aabb;

impl BrickTree {
    pub(crate) fn build(bricks: &[Brick], n_bricks: [usize; 3]) -> Self {
        let mut nodes = Vec::with_capacity(2 * bricks.len());
        let root = build_brick_tree_nodes(&mut nodes, bricks, n_bricks, 0, [0; 3], n_bricks);
        Self { nodes, root }
    }
}

fn build_brick_tree_nodes(
    nodes: &mut Vec<BrickTreeNode>,
    bricks: &[Brick],
    n_bricks: [usize; 3],
    level: usize,
    start: [usize; 3],
    end: [usize; 3],
) -> u32 {
    // Advance the level until a divisible axis is found or create a leaf
    // node if there is none
    let mut level = level;
    let mut axis = level % 3;
    let mut advances = 0;
    while end[axis] - start[axis] == 1 && advances < 2 {
        level += 1;
        advances += 1;
        axis = level % 3;
    }

    if end[axis] - start[axis] == 1 {
        let brick_idx = (start[2] * n_bricks[1] + start[1]) * n_bricks[0] + start[0];
        let brick = &bricks[brick_idx];
        nodes.push(BrickTreeNode {
            lower_child: NO_NODE,
            upper_child: NO_NODE,
            brick_idx: brick_idx as u32,
            split_axis: 0,
            spatial: brick.spatial,
            visibility_ratio: 1.0,
            visibility: RegionVisibility::Undetermined,
        });
        return (nodes.len() - 1) as u32;
    }

    // Subdivide along the current axis as close to the middle as possible
    let middle = (start[axis] + end[axis] + 1) / 2;
    debug_assert!(middle > start[axis] && end[axis] > middle);

    let mut lower_end = end;
    lower_end[axis] = middle;
    let lower_child = build_brick_tree_nodes(nodes, bricks, n_bricks, level + 1, start, lower_end);

    let mut upper_start = start;
    upper_start[axis] = middle;
    let upper_child = build_brick_tree_nodes(nodes, bricks, n_bricks, level + 1, upper_start, end);

    // The node's offset along the split axis is the minimum of the
    // children's and its extent there is the sum of theirs. The other two
    // components are equal for both children and inherited unchanged.
    let lower_spatial = nodes[lower_child as usize].spatial;
    let upper_spatial = nodes[upper_child as usize].spatial;
    let mut spatial = lower_spatial;
    spatial.offset[axis] = lower_spatial.offset[axis].min(upper_spatial.offset[axis]);
    spatial.extent[axis] = lower_spatial.extent[axis] + upper_spatial.extent[axis];

    nodes.push(BrickTreeNode {
        lower_child,
        upper_child,
        brick_idx: NO_NODE,
        split_axis: axis,
        spatial,
        visibility_ratio: 1.0,
        visibility: RegionVisibility::Undetermined,
    });
    (nodes.len() - 1) as u32
}

impl SubBrickTree {
    /// Builds the subdivision tree of one brick. `size_limit` is twice the
    /// configured minimum sub-brick size; an axis whose span falls below it
    /// is not split further.
    pub(crate) fn build(
        brick_offset: [usize; 3],
        brick_size: [usize; 3],
        brick_spatial_offset: Vector3<f32>,
        voxel_extent: Vector3<f32>,
        size_limit: usize,
    ) -> Self {
        let mut builder = SubBrickTreeBuilder {
            nodes: Vec::new(),
            brick_offset,
            brick_spatial_offset,
            voxel_extent,
            size_limit,
        };
        let root = builder.build_nodes(0, [0; 3], brick_size);
        Self {
            nodes: builder.nodes,
            root,
        }
    }
}

struct SubBrickTreeBuilder {
    nodes: Vec<SubBrickTreeNode>,
    brick_offset: [usize; 3],
    brick_spatial_offset: Vector3<f32>,
    voxel_extent: Vector3<f32>,
    size_limit: usize,
}

impl SubBrickTreeBuilder {
    fn build_nodes(&mut self, level: usize, start: [usize; 3], end: [usize; 3]) -> u32 {
        let node_idx = self.create_node(start, end);

        let mut level = level;
        let mut axis = level % 3;
        let mut advances = 0;
        while end[axis] - start[axis] < self.size_limit && advances < 2 {
            level += 1;
            advances += 1;
            axis = level % 3;
        }

        if end[axis] - start[axis] < self.size_limit {
            return node_idx;
        }

        // Split as close to the middle as possible, rounding down
        let middle = (start[axis] + end[axis]) / 2;
        debug_assert!(middle > start[axis] && end[axis] > middle);

        let mut lower_end = end;
        lower_end[axis] = middle;
        let lower_child = self.build_nodes(level + 1, start, lower_end);

        let mut upper_start = start;
        upper_start[axis] = middle;
        let upper_child = self.build_nodes(level + 1, upper_start, end);

        let node = &mut self.nodes[node_idx as usize];
        node.split_axis = axis;
        node.lower_child = lower_child;
        node.upper_child = upper_child;

        node_idx
    }

    fn create_node(&mut self, start: [usize; 3], end: [usize; 3]) -> u32 {
        let offset = [
            self.brick_offset[0] + start[0],
            self.brick_offset[1] + start[1],
            self.brick_offset[2] + start[2],
        ];
        let size = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];

        let spatial_offset = self.brick_spatial_offset
            + Vector3::new(
                start[0] as f32 * self.voxel_extent.x,
                start[1] as f32 * self.voxel_extent.y,
                start[2] as f32 * self.voxel_extent.z,
            );
        let spatial_extent = Vector3::new(
            size[0] as f32 * self.voxel_extent.x,
            size[1] as f32 * self.voxel_extent.y,
            size[2] as f32 * self.voxel_extent.z,
        );

        self.nodes.push(SubBrickTreeNode {
            lower_child: NO_NODE,
            upper_child: NO_NODE,
            split_axis: 0,
            offset,
            size,
            spatial: Aabb::new(spatial_offset, spatial_extent),
            visibility_ratio: 1.0,
            visibility: RegionVisibility::Undetermined,
            indicator_first_index: 0,
        });
        (self.nodes.len() - 1) as u32
    }
}
