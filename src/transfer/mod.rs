
use std::collections::HashMap;

use log::warn;

use crate::bricks::types::{BrickTreeNode, SubBrickTreeNode, NO_NODE};
use crate::bricks::{Brick, BrickedField};
use crate::error::{EngineError, Result};
use crate::field::Field;
use crate::gpu::TextureHandle;

/// Number of texels in a transfer function lookup table
pub const TF_SIZE: usize = 256;
/// First interior node index
pub const TF_START_NODE: usize = 1;
/// Last interior node index
pub const TF_END_NODE: usize = TF_SIZE - 2;

const TF_COMPONENTS: usize = 4;

/// Colour component of a transfer function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TfComponent {
    Red = 0,
    Green = 1,
    Blue = 2,
    Alpha = 3,
}

impl TfComponent {
    pub const ALL: [TfComponent; TF_COMPONENTS] = [
        TfComponent::Red,
        TfComponent::Green,
        TfComponent::Blue,
        TfComponent::Alpha,
    ];

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    fn idx(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ComponentMode {
    #[default]
    PiecewiseLinear,
    Logarithmic,
    Custom,
}

/// A 1D RGBA lookup table mapping normalised field value to colour and
/// opacity.
///
/// Each component is editable as a piecewise-linear curve over fixed control
/// nodes, as a logarithmic ramp between the two anchor nodes, or as a custom
/// table. The `[lower_limit, upper_limit]` input window remaps the incoming
/// texture value before lookup; the same window is applied on the GPU and in
/// the visibility-ratio integral so both agree on what is transparent.
#[derive(Clone)]
pub struct TransferFunction {
    output: [[f32; TF_COMPONENTS]; TF_SIZE],
    node_flags: [[bool; TF_COMPONENTS]; TF_SIZE],
    modes: [ComponentMode; TF_COMPONENTS],
    lower_limit: f32,
    upper_limit: f32,
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferFunction {
    pub fn new() -> Self {
        let mut function = Self {
            output: [[0.0; TF_COMPONENTS]; TF_SIZE],
            node_flags: [[false; TF_COMPONENTS]; TF_SIZE],
            modes: [ComponentMode::PiecewiseLinear; TF_COMPONENTS],
            lower_limit: 0.0,
            upper_limit: 1.0,
        };
        for component in TfComponent::ALL {
            function.reset_component(component);
        }
        function
    }

    pub fn mode(&self, component: TfComponent) -> ComponentMode {
        self.modes[component.idx()]
    }

    pub fn lower_limit(&self) -> f32 {
        self.lower_limit
    }

    pub fn upper_limit(&self) -> f32 {
        self.upper_limit
    }

    pub fn node_value(&self, component: TfComponent, node: usize) -> f32 {
        self.output[node][component.idx()]
    }

    pub fn is_fixed_node(&self, component: TfComponent, node: usize) -> bool {
        self.node_flags[node][component.idx()]
    }

    /// Reverts the component to a linear 0 to 1 ramp; alpha resets to a
    /// constant 1 instead.
    pub fn reset_component(&mut self, component: TfComponent) {
        let c = component.idx();
        self.modes[c] = ComponentMode::PiecewiseLinear;
        for node in 0..TF_SIZE {
            self.node_flags[node][c] = false;
        }
        self.node_flags[0][c] = true;
        self.node_flags[TF_SIZE - 1][c] = true;

        let start_value = if component == TfComponent::Alpha { 1.0 } else { 0.0 };
        self.output[0][c] = start_value;
        self.output[TF_SIZE - 1][c] = 1.0;
        self.recompute_linear_segment(component, 0, TF_SIZE - 1);
    }

    /// Marks `node` as a fixed control node with the given value and
    /// recomputes the two segments bridging it to its fixed neighbours.
    pub fn set_node(&mut self, component: TfComponent, node: usize, value: f32) -> Result<()> {
        if node >= TF_SIZE {
            return Err(EngineError::InvalidConfig(format!(
                "transfer function node {} out of range",
                node
            )));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(EngineError::InvalidConfig(format!(
                "transfer function value {} outside [0, 1]",
                value
            )));
        }

        let c = component.idx();
        self.modes[c] = ComponentMode::PiecewiseLinear;
        self.output[node][c] = value;
        self.node_flags[node][c] = true;

        let below = self.closest_fixed_node_below(component, node);
        let above = self.closest_fixed_node_above(component, node);

        if node - below > 1 {
            self.recompute_linear_segment(component, below, node);
        }
        if above - node > 1 {
            self.recompute_linear_segment(component, node, above);
        }
        Ok(())
    }

    /// Unmarks an interior control node and rebuilds the segment between its
    /// fixed neighbours. Ignored with a warning on non-piecewise-linear
    /// components; a no-op when the node is not fixed or not interior.
    pub fn remove_node(&mut self, component: TfComponent, node: usize) -> Result<()> {
        if node >= TF_SIZE {
            return Err(EngineError::InvalidConfig(format!(
                "transfer function node {} out of range",
                node
            )));
        }
        let c = component.idx();
        if self.modes[c] != ComponentMode::PiecewiseLinear {
            warn!("cannot remove node from transfer function component that is not piecewise linear");
            return Ok(());
        }
        if node == 0 || node == TF_SIZE - 1 || !self.node_flags[node][c] {
            return Ok(());
        }

        self.node_flags[node][c] = false;

        let below = self.closest_fixed_node_below(component, node);
        let above = self.closest_fixed_node_above(component, node);
        self.recompute_linear_segment(component, below, above);
        Ok(())
    }

    /// Replaces the component with a logarithmic ramp from `start_value` at
    /// node 0 to `end_value` at the last node. Ignored with a warning when
    /// the values are not ascending.
    pub fn set_logarithmic(
        &mut self,
        component: TfComponent,
        start_value: f32,
        end_value: f32,
    ) -> Result<()> {
        if end_value <= start_value {
            warn!("cannot create logarithmic transfer function between non-ascending values");
            return Ok(());
        }

        let c = component.idx();
        self.modes[c] = ComponentMode::Logarithmic;
        for node in 0..TF_SIZE {
            self.node_flags[node][c] = false;
        }
        self.node_flags[0][c] = true;
        self.node_flags[TF_SIZE - 1][c] = true;

        // f(i) = log(scale*i + exp(s)) runs exactly from s to e over the table
        let offset = start_value.exp();
        let scale = (end_value.exp() - offset) / (TF_SIZE - 1) as f32;
        for node in 0..TF_SIZE {
            self.output[node][c] = (node as f32 * scale + offset).ln();
        }
        Ok(())
    }

    /// Installs a custom table for the interior nodes of the component
    pub fn set_custom(&mut self, component: TfComponent, values: &[f32]) -> Result<()> {
        if values.len() != TF_SIZE - 2 {
            return Err(EngineError::InvalidConfig(format!(
                "custom transfer function component needs {} values, got {}",
                TF_SIZE - 2,
                values.len()
            )));
        }
        if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(EngineError::InvalidConfig(
                "custom transfer function values must lie in [0, 1]".to_string(),
            ));
        }

        let c = component.idx();
        self.modes[c] = ComponentMode::Custom;
        for (node, &value) in values.iter().enumerate() {
            self.output[TF_START_NODE + node][c] = value;
            self.node_flags[TF_START_NODE + node][c] = true;
        }
        Ok(())
    }

    /// Sets the lower bound of the input window, in texture units
    pub fn set_lower_limit(&mut self, value: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&value) || value >= self.upper_limit {
            return Err(EngineError::InvalidConfig(format!(
                "lower limit {} must lie in [0, 1] below the upper limit {}",
                value, self.upper_limit
            )));
        }
        self.lower_limit = value;
        Ok(())
    }

    /// Sets the upper bound of the input window, in texture units
    pub fn set_upper_limit(&mut self, value: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&value) || value <= self.lower_limit {
            return Err(EngineError::InvalidConfig(format!(
                "upper limit {} must lie in [0, 1] above the lower limit {}",
                value, self.lower_limit
            )));
        }
        self.upper_limit = value;
        Ok(())
    }

    /// Looks up the component at the given texture coordinate, applying the
    /// input window and linear interpolation between table entries.
    pub fn sample(&self, component: TfComponent, texture_value: f32) -> f32 {
        let windowed = ((texture_value - self.lower_limit)
            / (self.upper_limit - self.lower_limit))
            .clamp(0.0, 1.0);

        let position = windowed * (TF_SIZE - 1) as f32;
        let below = position.floor() as usize;
        let above = (below + 1).min(TF_SIZE - 1);
        let fraction = position - below as f32;

        let c = component.idx();
        self.output[below][c] * (1.0 - fraction) + self.output[above][c] * fraction
    }

    /// Opacity assigned to the given texture value
    pub fn alpha(&self, texture_value: f32) -> f32 {
        self.sample(TfComponent::Alpha, texture_value)
    }

    /// Table flattened to RGBA texels for upload to the 1D texture
    pub fn texel_data(&self) -> Vec<f32> {
        self.output.iter().flatten().copied().collect()
    }

    /// `(texture coordinate, value)` pairs of the component, for inspection
    pub fn dump(&self, component: TfComponent) -> Vec<(f32, f32)> {
        let norm = 1.0 / (TF_SIZE - 1) as f32;
        (0..TF_SIZE)
            .map(|node| (node as f32 * norm, self.output[node][component.idx()]))
            .collect()
    }

    fn closest_fixed_node_below(&self, component: TfComponent, node: usize) -> usize {
        let c = component.idx();
        (1..node)
            .rev()
            .find(|&candidate| self.node_flags[candidate][c])
            .unwrap_or(0)
    }

    fn closest_fixed_node_above(&self, component: TfComponent, node: usize) -> usize {
        let c = component.idx();
        (node + 1..TF_SIZE - 1)
            .find(|&candidate| self.node_flags[candidate][c])
            .unwrap_or(TF_SIZE - 1)
    }

    fn recompute_linear_segment(&mut self, component: TfComponent, start_node: usize, end_node: usize) {
        debug_assert!(end_node > start_node && end_node < TF_SIZE);
        let c = component.idx();
        let start_value = self.output[start_node][c];
        let end_value = self.output[end_node][c];
        let scale = (end_value - start_value) / (end_node - start_node) as f32;
        for node in start_node..=end_node {
            self.output[node][c] = start_value + (node - start_node) as f32 * scale;
        }
    }
}

/// Nearest lookup-table node for a texture coordinate
pub fn texture_coordinate_to_nearest_node(texture_coordinate: f32) -> usize {
    (texture_coordinate.clamp(0.0, 1.0) * (TF_SIZE - 1) as f32 + 0.5) as usize
}

/// Texture coordinate at the centre of a lookup-table node
pub fn node_to_texture_coordinate(node: usize) -> f32 {
    node as f32 / (TF_SIZE - 1) as f32
}

struct RegistryEntry {
    function: TransferFunction,
    texture: Option<TextureHandle>,
    needs_sync: bool,
}

/// Owns the transfer function of each field and the sync state of their 1D
/// textures. Edits addressed to a name that is not registered are warned
/// about and ignored, matching the non-fatal recovery policy for editing
/// operations.
#[derive(Default)]
pub struct TransferFunctionRegistry {
    entries: HashMap<String, RegistryEntry>,
    created_count: usize,
}

impl TransferFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh transfer function and returns its name
    pub fn create(&mut self) -> String {
        let name = format!("transfer_function_{}", self.created_count);
        self.created_count += 1;
        self.entries.insert(
            name.clone(),
            RegistryEntry {
                function: TransferFunction::new(),
                texture: None,
                needs_sync: true,
            },
        );
        name
    }

    pub fn get(&self, name: &str) -> Option<&TransferFunction> {
        self.entries.get(name).map(|entry| &entry.function)
    }

    /// Applies an edit to the named function and marks it for texture sync.
    /// Unknown names are warned about and ignored.
    pub fn edit(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut TransferFunction) -> Result<()>,
    ) -> Result<()> {
        match self.entries.get_mut(name) {
            Some(entry) => {
                edit(&mut entry.function)?;
                entry.needs_sync = true;
                Ok(())
            }
            None => {
                warn!("cannot modify inactive transfer function \"{}\"", name);
                Ok(())
            }
        }
    }

    pub fn set_texture(&mut self, name: &str, texture: TextureHandle) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))?;
        entry.texture = Some(texture);
        entry.needs_sync = true;
        Ok(())
    }

    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.entries.get(name).and_then(|entry| entry.texture)
    }

    pub fn needs_sync(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|entry| entry.needs_sync)
            .unwrap_or(false)
    }

    pub(crate) fn mark_synced(&mut self, name: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.needs_sync = false;
        }
    }

    /// Drops the named function, handing back its texture for release
    pub fn remove(&mut self, name: &str) -> Result<Option<TextureHandle>> {
        self.entries
            .remove(name)
            .map(|entry| entry.texture)
            .ok_or_else(|| EngineError::UnknownName(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Recomputes the visibility ratio of every brick and sub-brick of the
/// field from the transfer function's windowed alpha.
///
/// Sub-brick leaves integrate the alpha over their voxels; internal
/// sub-brick nodes average their children weighted by voxel count and brick
/// tree nodes average theirs weighted by spatial volume. The resulting
/// ratios drive the culling decisions of the back-to-front traversal.
pub fn update_visibility_ratios(function: &TransferFunction, bricked: &mut BrickedField) {
    let BrickedField {
        ref field,
        ref mut bricks,
        ref mut tree,
        ..
    } = *bricked;

    for brick in bricks.iter_mut() {
        let root = brick.sub_tree.root;
        update_sub_brick_node(&mut brick.sub_tree.nodes, root, field, function);
    }

    let root = tree.root;
    update_brick_tree_node(&mut tree.nodes, root, bricks);
}

fn update_sub_brick_node(
    nodes: &mut [SubBrickTreeNode],
    node_idx: u32,
    field: &Field,
    function: &TransferFunction,
) -> f32 {
    let (lower_child, upper_child) = {
        let node = &nodes[node_idx as usize];
        (node.lower_child, node.upper_child)
    };

    let ratio = if lower_child == NO_NODE {
        let node = &nodes[node_idx as usize];
        mean_alpha_over_region(field, function, node.offset, node.size)
    } else {
        let lower_ratio = update_sub_brick_node(nodes, lower_child, field, function);
        let upper_ratio = update_sub_brick_node(nodes, upper_child, field, function);

        let lower_count = nodes[lower_child as usize].voxel_count() as f32;
        let upper_count = nodes[upper_child as usize].voxel_count() as f32;
        (lower_ratio * lower_count + upper_ratio * upper_count) / (lower_count + upper_count)
    };

    nodes[node_idx as usize].visibility_ratio = ratio;
    ratio
}

fn update_brick_tree_node(nodes: &mut [BrickTreeNode], node_idx: u32, bricks: &[Brick]) -> f32 {
    let (lower_child, upper_child, brick_idx) = {
        let node = &nodes[node_idx as usize];
        (node.lower_child, node.upper_child, node.brick_idx)
    };

    let ratio = if lower_child == NO_NODE {
        let brick = &bricks[brick_idx as usize];
        brick.sub_tree.nodes[brick.sub_tree.root as usize].visibility_ratio
    } else {
        let lower_ratio = update_brick_tree_node(nodes, lower_child, bricks);
        let upper_ratio = update_brick_tree_node(nodes, upper_child, bricks);

        let lower_volume = nodes[lower_child as usize].spatial.volume();
        let upper_volume = nodes[upper_child as usize].spatial.volume();
        (lower_ratio * lower_volume + upper_ratio * upper_volume)
            / (lower_volume + upper_volume)
    };

    nodes[node_idx as usize].visibility_ratio = ratio;
    ratio
}

fn mean_alpha_over_region(
    field: &Field,
    function: &TransferFunction,
    offset: [usize; 3],
    size: [usize; 3],
) -> f32 {
    let mut sum = 0.0f64;
    for z in offset[2]..offset[2] + size[2] {
        for y in offset[1]..offset[1] + size[1] {
            for x in offset[0]..offset[0] + size[0] {
                sum += function.alpha(field.voxel(x, y, z)) as f64;
            }
        }
    }
    (sum / (size[0] * size[1] * size[2]) as f64) as f32
}
