use std::{
    collections::{HashMap, HashSet},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;

use crate::{
    assets::{Palette, Sprite, decode::decode_sprite},
    foundation::error::{StructuresError, StructuresResult},
};

/// Enumerable, fetchable set of interchangeable sprites split by palette.
pub trait AssetCatalog {
    /// Stable, ordered identifiers for `palette`.
    fn list(&self, palette: Palette) -> &[String];

    /// Load one sprite. Failures are expected to be transient.
    fn fetch(&mut self, palette: Palette, name: &str) -> StructuresResult<Arc<Sprite>>;
}

#[derive(serde::Deserialize)]
struct FileIndex {
    filenames: Vec<String>,
}

/// Catalog backed by a directory with `white/` and `black/` palette folders.
///
/// Identifiers come from `filenames.json` (`{"filenames": [...]}`) when it
/// exists and apply to both palettes; otherwise each folder is enumerated and
/// sorted by name.
#[derive(Debug)]
pub struct FsCatalog {
    root: PathBuf,
    light: Vec<String>,
    dark: Vec<String>,
    cache: HashMap<(Palette, String), Arc<Sprite>>,
}

impl FsCatalog {
    pub fn open(root: impl Into<PathBuf>) -> StructuresResult<Self> {
        let root = root.into();
        let index_path = root.join("filenames.json");

        let (light, dark) = if index_path.is_file() {
            let bytes = std::fs::read(&index_path)
                .with_context(|| format!("read '{}'", index_path.display()))?;
            let index: FileIndex = serde_json::from_slice(&bytes).map_err(|e| {
                StructuresError::serde(format!("{}: {e}", index_path.display()))
            })?;
            for name in &index.filenames {
                check_name(name)?;
            }
            (index.filenames.clone(), index.filenames)
        } else {
            (
                list_folder(&root.join(Palette::Light.folder()))?,
                list_folder(&root.join(Palette::Dark.folder()))?,
            )
        };

        if light.is_empty() && dark.is_empty() {
            return Err(StructuresError::asset(format!(
                "no sprites found under '{}'",
                root.display()
            )));
        }

        tracing::info!(
            root = %root.display(),
            light = light.len(),
            dark = dark.len(),
            "opened asset catalog"
        );

        Ok(Self {
            root,
            light,
            dark,
            cache: HashMap::new(),
        })
    }

    fn path_for(&self, palette: Palette, name: &str) -> PathBuf {
        self.root.join(palette.folder()).join(name)
    }
}

impl AssetCatalog for FsCatalog {
    fn list(&self, palette: Palette) -> &[String] {
        match palette {
            Palette::Light => &self.light,
            Palette::Dark => &self.dark,
        }
    }

    fn fetch(&mut self, palette: Palette, name: &str) -> StructuresResult<Arc<Sprite>> {
        let key = (palette, name.to_string());
        if let Some(sprite) = self.cache.get(&key) {
            return Ok(Arc::clone(sprite));
        }

        check_name(name)?;
        let path = self.path_for(palette, name);
        let bytes =
            std::fs::read(&path).with_context(|| format!("read sprite '{}'", path.display()))?;
        let sprite = Arc::new(decode_sprite(name, &bytes)?);
        self.cache.insert(key, Arc::clone(&sprite));
        Ok(sprite)
    }
}

fn list_folder(dir: &Path) -> StructuresResult<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("list '{}'", dir.display()))? {
        let entry = entry.with_context(|| format!("list '{}'", dir.display()))?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Reject identifiers that would escape the palette folder.
fn check_name(name: &str) -> StructuresResult<()> {
    let p = Path::new(name);
    let escapes = name.is_empty()
        || p.components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(StructuresError::asset(format!(
            "sprite name '{name}' must be a relative path inside its palette folder"
        )));
    }
    Ok(())
}

/// In-memory catalog with injectable failures.
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog {
    light: Vec<String>,
    dark: Vec<String>,
    sprites: HashMap<(Palette, String), Arc<Sprite>>,
    failing: HashSet<String>,
    fail_everything: bool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sprite(mut self, palette: Palette, sprite: Sprite) -> Self {
        let name = sprite.name.clone();
        match palette {
            Palette::Light => self.light.push(name.clone()),
            Palette::Dark => self.dark.push(name.clone()),
        }
        self.sprites.insert((palette, name), Arc::new(sprite));
        self
    }

    /// Same sprite under both palettes.
    pub fn with_shared(self, sprite: Sprite) -> Self {
        self.with_sprite(Palette::Light, sprite.clone())
            .with_sprite(Palette::Dark, sprite)
    }

    pub fn fail_on(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    pub fn fail_all(mut self) -> Self {
        self.fail_everything = true;
        self
    }
}

impl AssetCatalog for MemoryCatalog {
    fn list(&self, palette: Palette) -> &[String] {
        match palette {
            Palette::Light => &self.light,
            Palette::Dark => &self.dark,
        }
    }

    fn fetch(&mut self, palette: Palette, name: &str) -> StructuresResult<Arc<Sprite>> {
        if self.fail_everything || self.failing.contains(name) {
            return Err(StructuresError::asset(format!("fetch of '{name}' failed")));
        }
        self.sprites
            .get(&(palette, name.to_string()))
            .cloned()
            .ok_or_else(|| StructuresError::asset(format!("unknown sprite '{name}'")))
    }
}
