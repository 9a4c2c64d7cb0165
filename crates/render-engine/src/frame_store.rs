//! On-disk frame stores for pre-rendered module elements.
//!
//! One directory per element per run, holding `frame_NNNNNN.png` files keyed
//! by store index. The pre-renderer is the only writer; the export engine
//! reads frames back during compositing.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use scenestitch_common::{StitchError, StitchResult};

/// Directory of PNG frames for one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStore {
    dir: PathBuf,
}

impl FrameStore {
    /// Create (or reuse) `<root>/<run_id>/<element_id>`.
    pub fn create(root: &Path, run_id: &str, element_id: &str) -> StitchResult<Self> {
        let dir = root.join(run_id).join(sanitize(element_id));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Open an existing store directory without creating it.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the frame stored at `index`.
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }

    /// Encode `frame` as PNG at `index`, returning its path.
    pub fn write_png(&self, index: u64, frame: &RgbaImage) -> StitchResult<PathBuf> {
        let path = self.frame_path(index);
        frame
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| StitchError::prerender(format!("Failed to write {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Remove the store directory and everything in it.
    pub fn remove(&self) -> StitchResult<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        // The run directory is shared between elements; drop it once empty.
        if let Some(run_dir) = self.dir.parent() {
            let _ = std::fs::remove_dir(run_dir);
        }
        Ok(())
    }
}

/// Decode a stored frame.
pub fn load_frame(path: &Path) -> StitchResult<RgbaImage> {
    if !path.exists() {
        return Err(StitchError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let img = image::open(path)
        .map_err(|e| StitchError::composite(format!("Failed to decode {}: {e}", path.display())))?;
    Ok(img.to_rgba8())
}

/// Element ids come from documents; keep them to one path component.
fn sanitize(element_id: &str) -> String {
    let cleaned: String = element_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "element".to_string()
    } else {
        cleaned
    }
}
