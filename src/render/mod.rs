//! Canvas binding: the surfaces floors and basements are stamped into.

pub mod blend;
pub mod raster;
pub mod record;

use crate::{
    assets::Sprite,
    foundation::core::{Affine, Rgba8Premul, SurfaceSize},
    foundation::error::StructuresResult,
};

pub use blend::{BlendFamily, BlendMode};
pub use raster::RasterCanvas;
pub use record::{CanvasOp, RecordingCanvas};

/// Drawing primitives the generator needs from a surface.
pub trait Canvas {
    fn size(&self) -> SurfaceSize;

    /// Fill the whole surface with `color`.
    fn clear(&mut self, color: Rgba8Premul);

    /// Stamp `sprite` (in its own pixel space) through `transform` using `mode`.
    fn blend(
        &mut self,
        sprite: &Sprite,
        transform: Affine,
        mode: BlendMode,
    ) -> StructuresResult<()>;

    /// Lay `color` over the whole surface at `opacity`.
    fn veil(&mut self, color: Rgba8Premul, opacity: f32);
}
