use nalgebra::Vector3;

use crate::field::Field;
use crate::gpu::TextureHandle;
use crate::spatial::Aabb;

/// Sentinel child/brick index marking the absence of a node
pub(crate) const NO_NODE: u32 = u32::MAX;

/// Storage layout of a brick, named by its axes from slowest to fastest
/// varying. Face neighbours always have different orientations, which keeps
/// the GPU texture access pattern stable under camera rotation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BrickOrientation {
    #[default]
    Zyx = 0,
    Xzy = 1,
    Yxz = 2,
}

impl BrickOrientation {
    pub(crate) fn from_cycle(cycle: usize) -> Self {
        match cycle {
            0 => Self::Zyx,
            1 => Self::Xzy,
            2 => Self::Yxz,
            _ => unreachable!("orientation cycle must be 0, 1 or 2"),
        }
    }

    pub fn cycle(self) -> usize {
        self as usize
    }
}

/// Traversal state of a brick or sub-brick region
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RegionVisibility {
    Visible,
    Invisible,
    Clipped,
    #[default]
    Undetermined,
}

/// A padded axis-aligned sub-cube of a field, stored once in GPU memory as a
/// 3D texture. Offset and size describe the unpadded region in field voxels;
/// the padded voxel data lives in the owning [`BrickedField`]'s shared array.
pub struct Brick {
    pub(crate) data_offset: usize,
    pub(crate) data_length: usize,
    pub(crate) orientation: BrickOrientation,
    pub(crate) offset: [usize; 3],
    pub(crate) size: [usize; 3],
    /// Padded voxel counts listed from fastest to slowest stored axis
    pub(crate) padded_size: [usize; 3],
    pub(crate) spatial: Aabb,
    /// Fraction of the padded extent taken by the pad, per field axis
    pub(crate) pad_fractions: Vector3<f32>,
    pub(crate) sub_tree: SubBrickTree,
    pub(crate) texture: Option<TextureHandle>,
}

impl Brick {
    pub fn orientation(&self) -> BrickOrientation {
        self.orientation
    }

    pub fn offset(&self) -> [usize; 3] {
        self.offset
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn padded_size(&self) -> [usize; 3] {
        self.padded_size
    }

    pub fn spatial(&self) -> &Aabb {
        &self.spatial
    }

    pub fn pad_fractions(&self) -> Vector3<f32> {
        self.pad_fractions
    }

    pub fn sub_tree(&self) -> &SubBrickTree {
        &self.sub_tree
    }

    pub fn unpadded_volume(&self) -> usize {
        self.size[0] * self.size[1] * self.size[2]
    }
}

/// Node of the binary space-partitioning tree over the bricks of a field
pub struct BrickTreeNode {
    pub(crate) lower_child: u32,
    pub(crate) upper_child: u32,
    pub(crate) brick_idx: u32,
    pub(crate) split_axis: usize,
    pub(crate) spatial: Aabb,
    pub(crate) visibility_ratio: f32,
    pub(crate) visibility: RegionVisibility,
}

impl BrickTreeNode {
    pub fn is_leaf(&self) -> bool {
        self.brick_idx != NO_NODE
    }

    pub fn spatial(&self) -> &Aabb {
        &self.spatial
    }

    pub fn visibility_ratio(&self) -> f32 {
        self.visibility_ratio
    }

    pub fn visibility(&self) -> RegionVisibility {
        self.visibility
    }
}

/// Brick tree encoded as a dense node array with index children
pub struct BrickTree {
    pub(crate) nodes: Vec<BrickTreeNode>,
    pub(crate) root: u32,
}

impl BrickTree {
    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn node(&self, idx: u32) -> &BrickTreeNode {
        &self.nodes[idx as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Node of the subdivision tree inside a single brick. Voxel offsets are
/// given in field coordinates so the visibility integral can sample the
/// field directly.
pub struct SubBrickTreeNode {
    pub(crate) lower_child: u32,
    pub(crate) upper_child: u32,
    pub(crate) split_axis: usize,
    pub(crate) offset: [usize; 3],
    pub(crate) size: [usize; 3],
    pub(crate) spatial: Aabb,
    pub(crate) visibility_ratio: f32,
    pub(crate) visibility: RegionVisibility,
    /// First index of this node's edge range in the sub-brick indicator
    pub(crate) indicator_first_index: usize,
}

impl SubBrickTreeNode {
    pub fn is_leaf(&self) -> bool {
        self.lower_child == NO_NODE
    }

    pub fn offset(&self) -> [usize; 3] {
        self.offset
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn spatial(&self) -> &Aabb {
        &self.spatial
    }

    pub fn visibility_ratio(&self) -> f32 {
        self.visibility_ratio
    }

    pub fn visibility(&self) -> RegionVisibility {
        self.visibility
    }

    pub fn voxel_count(&self) -> usize {
        self.size[0] * self.size[1] * self.size[2]
    }
}

/// Sub-brick tree of one brick, arena encoded like [`BrickTree`]
pub struct SubBrickTree {
    pub(crate) nodes: Vec<SubBrickTreeNode>,
    pub(crate) root: u32,
}

impl SubBrickTree {
    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn node(&self, idx: u32) -> &SubBrickTreeNode {
        &self.nodes[idx as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A field together with its bricks, the brick tree and the shared padded
/// voxel array all bricks index into.
pub struct BrickedField {
    pub(crate) field: Field,
    pub(crate) data: Vec<f32>,
    pub(crate) bricks: Vec<Brick>,
    pub(crate) tree: BrickTree,
    pub(crate) n_bricks: [usize; 3],
    pub(crate) brick_size: usize,
    pub(crate) pad_size: usize,
    pub(crate) field_boundary_indicator: Option<String>,
    pub(crate) brick_boundary_indicator: Option<String>,
    pub(crate) sub_brick_boundary_indicator: Option<String>,
}

impl BrickedField {
    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut Field {
        &mut self.field
    }

    pub fn bricks(&self) -> &[Brick] {
        &self.bricks
    }

    pub fn tree(&self) -> &BrickTree {
        &self.tree
    }

    pub fn n_bricks(&self) -> [usize; 3] {
        self.n_bricks
    }

    pub fn brick_count(&self) -> usize {
        self.bricks.len()
    }

    pub fn brick_size(&self) -> usize {
        self.brick_size
    }

    pub fn pad_size(&self) -> usize {
        self.pad_size
    }

    /// Padded voxel data of one brick, laid out in its storage orientation
    pub fn brick_data(&self, brick: &Brick) -> &[f32] {
        &self.data[brick.data_offset..brick.data_offset + brick.data_length]
    }

    pub fn brick_at(&self, i: usize, j: usize, k: usize) -> &Brick {
        &self.bricks[(k * self.n_bricks[1] + j) * self.n_bricks[0] + i]
    }

    /// Discards the bricked representation and hands back the field
    pub fn into_field(self) -> Field {
        self.field
    }
}
