//! Still captures of the composited try-on view, and sharing them.

use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::accessory::AccessorySlots;
use crate::error::SnapshotError;
use crate::placement::PlacementEngine;
use crate::render::{Canvas, draw_all};
use crate::smoothing::TrackingSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub dir: PathBuf,
    /// Program invoked with the snapshot path to share it. No command means
    /// sharing is unavailable.
    pub share_command: Option<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            share_command: None,
        }
    }
}

/// Composite the current overlay onto a copy of `frame`.
///
/// Rejected when nothing is tracked: a snapshot without any placed jewelry
/// is not worth producing.
pub fn take_snapshot(
    frame: &RgbaImage,
    tracking: &TrackingSnapshot,
    engine: &PlacementEngine,
    slots: &AccessorySlots,
) -> Result<RgbaImage, SnapshotError> {
    if tracking.is_empty() {
        return Err(SnapshotError::NothingToCapture);
    }

    let mut canvas = Canvas::new(frame.clone());
    let ops = engine.place(tracking, frame.width(), frame.height(), slots);
    draw_all(&mut canvas, &ops, slots);

    Ok(canvas.into_image())
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, SnapshotError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn snapshot_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("jewelry-tryon-{millis}.png")
}

/// Write `img` as PNG into `dir`, returning the new file's path.
pub fn save<P: AsRef<Path>>(dir: P, img: &RgbaImage) -> Result<PathBuf, SnapshotError> {
    let path = dir.as_ref().join(snapshot_file_name());
    std::fs::create_dir_all(dir.as_ref())?;
    std::fs::write(&path, encode_png(img)?)?;
    info!("Snapshot saved to {}", path.display());
    Ok(path)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShareTarget {
    Unsupported,
    Command(String),
}

impl From<&SnapshotConfig> for ShareTarget {
    fn from(config: &SnapshotConfig) -> Self {
        match &config.share_command {
            Some(cmd) if !cmd.trim().is_empty() => ShareTarget::Command(cmd.clone()),
            _ => ShareTarget::Unsupported,
        }
    }
}

impl ShareTarget {
    /// Hand the saved snapshot to the share program. Without one the caller
    /// gets [`SnapshotError::ShareUnsupported`]; the file stays on disk.
    pub fn share(&self, path: &Path) -> Result<(), SnapshotError> {
        let cmd = match self {
            ShareTarget::Unsupported => {
                return Err(SnapshotError::ShareUnsupported(path.to_path_buf()));
            }
            ShareTarget::Command(cmd) => cmd,
        };

        let mut parts = cmd.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SnapshotError::ShareFailed("empty share command".to_string()))?;

        let status = Command::new(program)
            .args(parts)
            .arg(path)
            .status()
            .map_err(|e| SnapshotError::ShareFailed(format!("{program}: {e}")))?;

        if !status.success() {
            return Err(SnapshotError::ShareFailed(format!("{program} exited with {status}")));
        }

        info!("Shared {}", path.display());
        Ok(())
    }
}
