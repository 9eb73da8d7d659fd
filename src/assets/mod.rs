//! Sprite assets and the catalogs they are drawn from.

pub mod catalog;
pub mod decode;

use std::sync::Arc;

pub use catalog::{AssetCatalog, FsCatalog, MemoryCatalog};
pub use decode::decode_sprite;

/// Light or dark asset subset a building draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Palette {
    Light,
    Dark,
}

impl Palette {
    pub fn toggled(self) -> Self {
        match self {
            Palette::Light => Palette::Dark,
            Palette::Dark => Palette::Light,
        }
    }

    /// Folder the palette lives in under a catalog root.
    pub fn folder(self) -> &'static str {
        match self {
            Palette::Light => "white",
            Palette::Dark => "black",
        }
    }
}

/// Decoded raster sprite.
#[derive(Clone, Debug)]
pub struct Sprite {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl Sprite {
    /// Uniform sprite, mostly useful for tests and placeholders.
    pub fn solid(name: impl Into<String>, width: u32, height: u32, premul: [u8; 4]) -> Self {
        let n = (width as usize) * (height as usize);
        Self {
            name: name.into(),
            width,
            height,
            rgba8_premul: Arc::new(premul.repeat(n)),
        }
    }
}
