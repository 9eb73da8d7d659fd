use std::sync::Arc;

use crate::{
    assets::Sprite,
    config::Loading,
    foundation::core::{Affine, Rgba8Premul, Vec2},
    foundation::error::StructuresResult,
    render::{BlendMode, Canvas, RasterCanvas},
};

/// Loading indicator shown during warm-up: a stack of plan stamps that grows
/// with progress.
#[derive(Debug)]
pub struct LoadingOverlay {
    sprite: Arc<Sprite>,
    floors: u32,
    background: Rgba8Premul,
    surface: RasterCanvas,
    stacked: u32,
}

impl LoadingOverlay {
    pub fn new(sprite: Arc<Sprite>, loading: &Loading, background: u8) -> StructuresResult<Self> {
        Ok(Self {
            sprite,
            floors: loading.floors,
            background: Rgba8Premul::gray(background),
            surface: RasterCanvas::new(loading.area)?,
            stacked: 0,
        })
    }

    pub fn sprite_name(&self) -> &str {
        &self.sprite.name
    }

    pub fn surface(&self) -> &RasterCanvas {
        &self.surface
    }

    /// Stamps drawn by the last [`LoadingOverlay::render`].
    pub fn stacked(&self) -> u32 {
        self.stacked
    }

    pub fn render(&mut self, progress: f64) -> StructuresResult<()> {
        let progress = progress.clamp(0.0, 1.0);
        let area = self.surface.size();
        let (aw, ah) = (f64::from(area.width), f64::from(area.height));
        let (sw, sh) = (
            f64::from(self.sprite.width.max(1)),
            f64::from(self.sprite.height.max(1)),
        );
        let fit = (aw / sw).min(ah / sh);
        let move_distance = ah - sh * fit;
        let span = f64::from(self.floors.saturating_sub(1).max(1));

        self.surface.clear(self.background);
        let count = (f64::from(self.floors) * progress).floor() as u32;
        for f in 0..count {
            let dist = move_distance * (1.0 - f64::from(f) / span);
            let t = Affine::translate(Vec2::new(0.0, dist)) * Affine::scale(fit);
            self.surface.blend(&self.sprite, t, BlendMode::Lightest)?;
        }
        self.stacked = count;
        Ok(())
    }

    pub fn caption(composed: u64, target: u32, plans: usize) -> String {
        format!("Laying Foundations: {composed}/{target}\nArchitectural Plans: {plans}")
    }
}
