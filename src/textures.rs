//! Field-texture registry: one 3D texture per brick plus the 1D transfer
//! function textures. The registry owns texture lifetimes and enforces the
//! backend texture budget.

use crate::bricks::BrickedField;
use crate::error::{EngineError, Result};
use crate::gpu::{GpuContext, Texture3dDesc, TextureFilter, TextureHandle, TextureWrap};
use crate::transfer::TF_SIZE;

/// Upper bound on simultaneously live textures
pub const MAX_TEXTURES: usize = 1024;

/// Texture unit the per-brick volume texture is bound to while drawing
pub const VOLUME_TEXTURE_UNIT: u32 = 0;
/// Texture unit of the transfer function lookup table
pub const TRANSFER_FUNCTION_TEXTURE_UNIT: u32 = 1;

pub struct FieldTextureRegistry {
    live_count: usize,
    limit: usize,
}

impl Default for FieldTextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldTextureRegistry {
    pub fn new() -> Self {
        Self {
            live_count: 0,
            limit: MAX_TEXTURES,
        }
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            live_count: 0,
            limit,
        }
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Uploads every brick of the field as a 3D texture sized to its padded
    /// extents. Sampling is trilinear with mipmaps, clamping to a zero
    /// border so slices never bleed across brick boundaries.
    pub fn create_brick_textures(
        &mut self,
        gpu: &mut dyn GpuContext,
        bricked: &mut BrickedField,
    ) -> Result<()> {
        let BrickedField {
            ref data,
            ref mut bricks,
            ..
        } = *bricked;

        for brick in bricks.iter_mut() {
            if self.live_count >= self.limit {
                return Err(EngineError::TextureLimitExceeded { limit: self.limit });
            }

            let desc = Texture3dDesc {
                size: brick.padded_size(),
                min_filter: TextureFilter::LinearMipmapLinear,
                mag_filter: TextureFilter::Linear,
                wrap: TextureWrap::ClampToBorder,
                border_value: 0.0,
            };
            let brick_data = &data[brick.data_offset..brick.data_offset + brick.data_length];

            brick.texture = Some(gpu.create_texture_3d(&desc, brick_data)?);
            self.live_count += 1;
        }
        Ok(())
    }

    /// Releases the textures of every brick of the field
    pub fn release_brick_textures(&mut self, gpu: &mut dyn GpuContext, bricked: &mut BrickedField) {
        for brick in bricked.bricks.iter_mut() {
            if let Some(texture) = brick.texture.take() {
                gpu.delete_texture(texture);
                self.live_count -= 1;
            }
        }
    }

    /// Creates the 1D RGBA texture holding a transfer function table
    pub fn create_transfer_function_texture(
        &mut self,
        gpu: &mut dyn GpuContext,
        texel_data: &[f32],
    ) -> Result<TextureHandle> {
        debug_assert!(texel_data.len() == 4 * TF_SIZE);
        if self.live_count >= self.limit {
            return Err(EngineError::TextureLimitExceeded { limit: self.limit });
        }

        let handle = gpu.create_texture_1d_rgba(TF_SIZE, texel_data)?;
        self.live_count += 1;
        Ok(handle)
    }

    pub fn release_texture(&mut self, gpu: &mut dyn GpuContext, texture: TextureHandle) {
        gpu.delete_texture(texture);
        self.live_count -= 1;
    }
}

#[cfg(test)]
mod texture_registry_tests {
    use super::*;
    use crate::bricks::{create_bricked_field, BrickingConfig};
    use crate::field::Field;
    use crate::gpu::HeadlessGpu;

    fn small_bricked_field() -> crate::bricks::BrickedField {
        let data = (0..32 * 32 * 32).map(|i| (i % 97) as f32).collect();
        let field = Field::from_raw_data("tex", data, [32, 32, 32], [1.0, 1.0, 1.0])
            .ok()
            .unwrap();
        create_bricked_field(
            field,
            &BrickingConfig {
                brick_size: 16,
                ..BrickingConfig::default()
            },
        )
        .ok()
        .unwrap()
    }

    #[test]
    fn test_every_brick_receives_a_padded_texture() {
        let mut gpu = HeadlessGpu::new();
        let mut registry = FieldTextureRegistry::new();
        let mut bricked = small_bricked_field();

        registry.create_brick_textures(&mut gpu, &mut bricked).ok().unwrap();

        assert!(registry.live_count() == bricked.brick_count());
        for brick in bricked.bricks() {
            let texture = brick.texture.unwrap();
            assert!(gpu.texture_3d_size(texture) == Some(brick.padded_size()));
        }
    }

    #[test]
    fn test_release_returns_texture_budget() {
        let mut gpu = HeadlessGpu::new();
        let mut registry = FieldTextureRegistry::new();
        let mut bricked = small_bricked_field();

        registry.create_brick_textures(&mut gpu, &mut bricked).ok().unwrap();
        registry.release_brick_textures(&mut gpu, &mut bricked);

        assert!(registry.live_count() == 0);
        assert!(gpu.live_texture_count() == 0);
        assert!(bricked.bricks().iter().all(|brick| brick.texture.is_none()));
    }

    #[test]
    fn test_texture_limit_is_enforced() {
        let mut gpu = HeadlessGpu::new();
        let mut registry = FieldTextureRegistry::with_limit(3);
        let mut bricked = small_bricked_field();

        let result = registry.create_brick_textures(&mut gpu, &mut bricked);
        assert!(matches!(
            result,
            Err(crate::error::EngineError::TextureLimitExceeded { limit: 3 })
        ));
    }
}
