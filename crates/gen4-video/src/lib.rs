//! `gen4-video` programs the gen4 fixed-function 3D pipeline to color-convert
//! and scale decoded video frames onto the screen.
//!
//! The crate builds the full set of pipeline state objects (surface, sampler,
//! VS/SF/WM unit state, color calculator, binding table, vertex buffer) in a
//! caller-provided scratch region, then emits the command stream installing
//! them and one rectangle-list draw per destination box. Driver services
//! (buffer objects, the batch stream, draw synchronization) are consumed
//! through the [`Gpu`] trait.

use thiserror::Error;

pub mod format;
pub mod gpu;
pub mod kernels;
pub mod layout;
pub mod pipeline;
pub mod regs;
pub mod state;

pub use format::{FourCc, FormatPlan, KernelVariant, PlaneOffsets};
pub use gpu::{BoId, Gpu, Mode3d, RecordingGpu};
pub use layout::StateLayout;
pub use pipeline::{DstBox, Pixmap, ScreenInfo, VideoFrame, VideoPipeline};

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("buffer object allocation failed for {tag}")]
    Alloc { tag: &'static str },
}
