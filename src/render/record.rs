use crate::{
    assets::Sprite,
    foundation::core::{Affine, Rgba8Premul, SurfaceSize},
    foundation::error::StructuresResult,
    render::{Canvas, blend::BlendMode},
};

/// One recorded draw call.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CanvasOp {
    Clear {
        rgba: [u8; 4],
    },
    Blend {
        sprite: String,
        /// Affine coefficients `[a, b, c, d, e, f]`.
        transform: [f64; 6],
        mode: BlendMode,
    },
    Veil {
        rgba: [u8; 4],
        opacity: f32,
    },
}

/// Canvas that rasterizes nothing and keeps the draw sequence instead.
#[derive(Clone, Debug)]
pub struct RecordingCanvas {
    size: SurfaceSize,
    ops: Vec<CanvasOp>,
}

impl RecordingCanvas {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[CanvasOp] {
        &self.ops
    }

    pub fn blend_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, CanvasOp::Blend { .. }))
            .count()
    }
}

impl Canvas for RecordingCanvas {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn clear(&mut self, color: Rgba8Premul) {
        self.ops.push(CanvasOp::Clear {
            rgba: color.to_array(),
        });
    }

    fn blend(
        &mut self,
        sprite: &Sprite,
        transform: Affine,
        mode: BlendMode,
    ) -> StructuresResult<()> {
        self.ops.push(CanvasOp::Blend {
            sprite: sprite.name.clone(),
            transform: transform.as_coeffs(),
            mode,
        });
        Ok(())
    }

    fn veil(&mut self, color: Rgba8Premul, opacity: f32) {
        self.ops.push(CanvasOp::Veil {
            rgba: color.to_array(),
            opacity,
        });
    }
}
