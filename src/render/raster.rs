use std::{collections::HashMap, sync::Arc};

use crate::{
    assets::Sprite,
    foundation::core::{Affine, Rgba8Premul, SurfaceSize},
    foundation::error::{StructuresError, StructuresResult},
    render::{
        Canvas,
        blend::{BlendMode, over},
    },
};

/// CPU raster surface holding premultiplied RGBA8, row-major, tightly packed.
///
/// Stamps are rasterized by `vello_cpu`: the current buffer becomes the
/// backdrop paint and the sprite is composited over it inside a blend layer.
pub struct RasterCanvas {
    size: SurfaceSize,
    width: u16,
    height: u16,
    pixmap: vello_cpu::Pixmap,
    // Keyed by buffer address; the entry holds the buffer so the address stays live.
    sprites: HashMap<usize, (Arc<Vec<u8>>, vello_cpu::Image)>,
}

impl std::fmt::Debug for RasterCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterCanvas")
            .field("size", &self.size)
            .field("cached_sprites", &self.sprites.len())
            .finish()
    }
}

impl RasterCanvas {
    pub fn new(size: SurfaceSize) -> StructuresResult<Self> {
        let size = SurfaceSize::new(size.width, size.height)?;
        let width: u16 = size
            .width
            .try_into()
            .map_err(|_| StructuresError::render("surface width exceeds u16"))?;
        let height: u16 = size
            .height
            .try_into()
            .map_err(|_| StructuresError::render("surface height exceeds u16"))?;
        Ok(Self {
            size,
            width,
            height,
            pixmap: vello_cpu::Pixmap::new(width, height),
            sprites: HashMap::new(),
        })
    }

    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let idx = ((y as usize) * (self.size.width as usize) + (x as usize)) * 4;
        let px = self.data().get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Straight-alpha copy suitable for encoding.
    pub fn to_rgba_image(&self) -> StructuresResult<image::RgbaImage> {
        let mut straight = self.data().to_vec();
        unpremultiply_rgba8_in_place(&mut straight);
        image::RgbaImage::from_raw(self.size.width, self.size.height, straight)
            .ok_or_else(|| StructuresError::render("raster buffer does not match its size"))
    }

    fn sprite_paint(&mut self, sprite: &Sprite) -> StructuresResult<vello_cpu::Image> {
        let key = Arc::as_ptr(&sprite.rgba8_premul) as usize;
        if let Some((_, paint)) = self.sprites.get(&key) {
            return Ok(paint.clone());
        }

        let pixmap = premul_bytes_to_pixmap(sprite)?;
        let paint = pixmap_paint(pixmap);
        self.sprites
            .insert(key, (Arc::clone(&sprite.rgba8_premul), paint.clone()));
        Ok(paint)
    }
}

impl Canvas for RasterCanvas {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn clear(&mut self, color: Rgba8Premul) {
        clear_pixmap(&mut self.pixmap, color.to_array());
    }

    fn blend(
        &mut self,
        sprite: &Sprite,
        transform: Affine,
        mode: BlendMode,
    ) -> StructuresResult<()> {
        let paint = self.sprite_paint(sprite)?;
        if transform.determinant().abs() < 1e-12 {
            return Ok(());
        }

        let backdrop = std::mem::replace(
            &mut self.pixmap,
            vello_cpu::Pixmap::new(self.width, self.height),
        );
        let full = vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(self.width),
            f64::from(self.height),
        );

        let mut ctx = vello_cpu::RenderContext::new(self.width, self.height);
        ctx.set_paint(pixmap_paint(backdrop));
        ctx.fill_rect(&full);

        ctx.set_transform(affine_to_cpu(transform));
        ctx.push_blend_layer(blend_mode_to_cpu(mode));
        ctx.set_paint(paint);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(sprite.width),
            f64::from(sprite.height),
        ));
        ctx.pop_layer();

        ctx.flush();
        ctx.render_to_pixmap(&mut self.pixmap);
        Ok(())
    }

    fn veil(&mut self, color: Rgba8Premul, opacity: f32) {
        let px = color.to_array();
        for d in self.pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
            let out = over([d[0], d[1], d[2], d[3]], px, opacity);
            d.copy_from_slice(&out);
        }
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn blend_mode_to_cpu(mode: BlendMode) -> vello_cpu::peniko::BlendMode {
    use vello_cpu::peniko::{Compose, Mix};

    let (mix, compose) = match mode {
        BlendMode::Normal => (Mix::Normal, Compose::SrcOver),
        BlendMode::Add => (Mix::Normal, Compose::Plus),
        BlendMode::Lightest => (Mix::Lighten, Compose::SrcOver),
        BlendMode::Darkest => (Mix::Darken, Compose::SrcOver),
        BlendMode::Screen => (Mix::Screen, Compose::SrcOver),
        BlendMode::Multiply => (Mix::Multiply, Compose::SrcOver),
    };
    vello_cpu::peniko::BlendMode::new(mix, compose)
}

fn pixmap_paint(pixmap: vello_cpu::Pixmap) -> vello_cpu::Image {
    vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    }
}

fn premul_bytes_to_pixmap(sprite: &Sprite) -> StructuresResult<vello_cpu::Pixmap> {
    let w: u16 = sprite
        .width
        .try_into()
        .map_err(|_| StructuresError::render("sprite width exceeds u16"))?;
    let h: u16 = sprite
        .height
        .try_into()
        .map_err(|_| StructuresError::render("sprite height exceeds u16"))?;
    let expected = usize::from(w) * usize::from(h) * 4;
    if sprite.rgba8_premul.len() != expected {
        return Err(StructuresError::render(format!(
            "sprite '{}' expects {expected} bytes, has {}",
            sprite.name,
            sprite.rgba8_premul.len()
        )));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(usize::from(w) * usize::from(h));
    for px in sprite.rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

fn clear_pixmap(pixmap: &mut vello_cpu::Pixmap, rgba: [u8; 4]) {
    for px in pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[0..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}
