use std::path::Path;

use anyhow::Context;

use crate::{foundation::error::StructuresResult, render::RasterCanvas};

/// Artifact name embedding the run seed and elapsed milliseconds.
pub fn export_file_name(seed: u64, elapsed_ms: u64) -> String {
    format!("understructures_{seed}_{elapsed_ms}.png")
}

/// Write the buffer as PNG, creating parent directories as needed.
pub fn save_png(canvas: &RasterCanvas, path: &Path) -> StructuresResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let img = canvas.to_rgba_image()?;
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    tracing::info!(path = %path.display(), "exported composition");
    Ok(())
}
