// TODO:
// - wgpu implementation of gpu::GpuContext (the headless backend mirrors the
//   call surface a real backend needs, so this should not touch the core)
// - allow more than one bricked field to be active in the renderer at a time

pub mod bricks;
pub mod clip;
pub mod error;
pub mod field;
pub mod gpu;
pub mod host;
pub mod indicators;
pub mod renderer;
pub mod shadergen;
pub mod slicer;
pub mod spatial;
pub mod textures;
pub mod transfer;
pub mod transform;

pub use error::{EngineError, Result};
