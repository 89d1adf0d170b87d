//! On-disk per-layer point artifacts.
//!
//! Each non-empty layer is persisted as `layer_<id>.json` holding the
//! resampled point list as `[[x, y], ...]`. The artifacts double as an
//! inspection surface and as a replayable input, so a prepared job can be
//! streamed again without the G-code around.

use std::path::{Path, PathBuf};

use crate::{
    error::JobError,
    geometry::{LayerId, LayerMap, Point2D},
};

/// A directory of per-layer point artifacts.
#[derive(Debug, Clone)]
pub struct LayerStore {
    dir: PathBuf,
}

impl LayerStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store reads and writes.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `layer`.
    pub fn layer_path(&self, layer: LayerId) -> PathBuf {
        self.dir.join(format!("layer_{}.json", layer))
    }

    /// Write one layer's points, replacing any previous artifact.
    pub async fn write_layer(&self, layer: LayerId, points: &[Point2D]) -> Result<PathBuf, JobError> {
        let path = self.layer_path(layer);
        let body = serde_json::to_vec(points).map_err(|source| JobError::ArtifactFormat {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| JobError::Artifact {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Write every non-empty layer. Returns how many artifacts were written.
    pub async fn write_all(&self, layers: &LayerMap) -> Result<usize, JobError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| JobError::Artifact {
                path: self.dir.clone(),
                source,
            })?;
        let mut written = 0;
        for (layer, points) in layers {
            if points.is_empty() {
                continue;
            }
            self.write_layer(*layer, points).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Read one layer's points back.
    pub async fn read_layer(&self, layer: LayerId) -> Result<Vec<Point2D>, JobError> {
        let path = self.layer_path(layer);
        let body = tokio::fs::read(&path)
            .await
            .map_err(|source| JobError::Artifact {
                path: path.clone(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|source| JobError::ArtifactFormat { path, source })
    }

    /// Layer ids with an artifact in the store, in ascending numeric order.
    ///
    /// Ordering works on the parsed id, so layer 10 follows layer 2 instead
    /// of sorting between 1 and 2 the way the file names would.
    pub async fn layer_ids(&self) -> Result<Vec<LayerId>, JobError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| JobError::Artifact {
                path: self.dir.clone(),
                source,
            })?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| JobError::Artifact {
                path: self.dir.clone(),
                source,
            })?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(id) = parse_layer_file(name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

fn parse_layer_file(name: &str) -> Option<LayerId> {
    name.strip_prefix("layer_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::new(dir.path());
        let points = vec![Point2D::new(1.5, -2.25), Point2D::new(0.33333, 10.0)];

        let layers = LayerMap::from([(7, points.clone())]);
        store.write_all(&layers).await.unwrap();

        assert_eq!(store.read_layer(7).await.unwrap(), points);
    }

    #[tokio::test]
    async fn write_all_skips_empty_layers() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::new(dir.path());
        let layers = LayerMap::from([
            (0, vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 0.0)]),
            (5, vec![]),
        ]);

        let written = store.write_all(&layers).await.unwrap();

        assert_eq!(written, 1);
        assert!(store.layer_path(0).exists());
        assert!(!store.layer_path(5).exists());
    }

    #[tokio::test]
    async fn layer_ids_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::new(dir.path());
        let point = vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0)];
        let layers = LayerMap::from([(2, point.clone()), (10, point.clone()), (-1, point)]);
        store.write_all(&layers).await.unwrap();

        assert_eq!(store.layer_ids().await.unwrap(), vec![-1, 2, 10]);
    }

    #[tokio::test]
    async fn missing_artifact_is_an_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::new(dir.path());

        let err = store.read_layer(99).await.unwrap_err();
        assert!(matches!(err, JobError::Artifact { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn corrupt_artifact_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::new(dir.path());
        std::fs::write(store.layer_path(3), "not a point list").unwrap();

        let err = store.read_layer(3).await.unwrap_err();
        assert!(matches!(err, JobError::ArtifactFormat { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::new(dir.path());
        std::fs::write(dir.path().join("notes.txt"), "scratch").unwrap();
        std::fs::write(dir.path().join("layer_x.json"), "[]").unwrap();
        store
            .write_layer(4, &[Point2D::new(1.0, 2.0)])
            .await
            .unwrap();

        assert_eq!(store.layer_ids().await.unwrap(), vec![4]);
    }
}
