use std::path::Path;

use anyhow::{Context, Result};
use scancast::{artifact::LayerStore, galvo::Bounds, gcode, resample, Config, LayerMap};

use crate::Cli;

pub async fn main(_cli: &Cli, cfg: &Config, file: &Path, out: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let extracted = gcode::extract_layers(&text)?;
    if !gcode::has_geometry(&extracted) {
        anyhow::bail!("no drawable geometry in {}", file.display());
    }

    let mut layers = LayerMap::new();
    for (id, points) in &extracted {
        if points.is_empty() {
            continue;
        }
        let dense = resample::resample_path(points, cfg.pipeline.resolution);
        if dense.is_empty() {
            continue;
        }
        layers.insert(*id, dense);
    }

    let store = LayerStore::new(out);
    let written = store.write_all(&layers).await?;

    let bounds = Bounds::from_layers(&layers);
    println!(
        "{}: {} layers, {} artifacts written to {}",
        file.display(),
        layers.len(),
        written,
        out.display()
    );
    println!(
        "bounds x {}..{} y {}..{}, canvas {} x {}",
        bounds.min_x,
        bounds.max_x,
        bounds.min_y,
        bounds.max_y,
        bounds.width(),
        bounds.height()
    );
    Ok(())
}
