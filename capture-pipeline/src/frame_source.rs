use crate::traits::FrameSource;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tracing::{info, warn};

/// Window placement on screen: left, top, width, height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Captures the named application's front window with the macOS
/// `screencapture` tool, falling back to the whole screen when the window
/// cannot be located.
pub struct ScreenFrameSource {
    app_name: String,
    out_dir: PathBuf,
    first_capture: AtomicBool,
}

impl ScreenFrameSource {
    pub fn new(app_name: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_name: app_name.into(),
            out_dir: out_dir.into(),
            first_capture: AtomicBool::new(true),
        }
    }

    /// Where the next capture will be written.
    pub fn next_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        self.out_dir.join(format!("{}_{}.png", slug(&self.app_name), stamp))
    }

    async fn window_bounds(&self) -> Option<WindowRect> {
        let script = format!(
            r#"tell application "System Events"
    if exists process "{app}" then
        tell process "{app}"
            if exists window 1 then
                return bounds of window 1
            else
                return "NO_WINDOW"
            end if
        end tell
    else
        return "NO_PROCESS"
    end if
end tell"#,
            app = self.app_name.replace('"', "")
        );

        let output = Command::new("osascript").arg("-e").arg(script).output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        parse_bounds(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl FrameSource for ScreenFrameSource {
    fn source_name(&self) -> String {
        self.app_name.clone()
    }

    async fn acquire_frame(&self) -> Result<PathBuf> {
        let bounds = self.window_bounds().await;
        if self.first_capture.swap(false, Ordering::SeqCst) {
            match bounds {
                Some(rect) => info!(
                    "Detected '{}' window: {}x{} at ({}, {})",
                    self.app_name, rect.width, rect.height, rect.x, rect.y
                ),
                None => warn!(
                    "'{}' window not found, falling back to full screen capture",
                    self.app_name
                ),
            }
        }

        let path = self.next_path();
        let mut command = Command::new("screencapture");
        command.args(["-x", "-t", "png"]);
        if let Some(rect) = bounds {
            command.arg(format!("-R{},{},{},{}", rect.x, rect.y, rect.width, rect.height));
        }
        command.arg(&path);

        let status = command
            .status()
            .await
            .map_err(|e| PipelineError::Acquisition(format!("could not run screencapture: {}", e)))?;
        if !status.success() {
            return Err(PipelineError::Acquisition(format!("screencapture exited with {}", status)));
        }

        ensure_nonempty(&path).await?;
        Ok(path)
    }
}

/// Serves the same existing image every time. Used for demos and tests.
pub struct StillFrameSource {
    path: PathBuf,
}

impl StillFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for StillFrameSource {
    fn source_name(&self) -> String {
        format!("still image {}", self.path.display())
    }

    async fn acquire_frame(&self) -> Result<PathBuf> {
        ensure_nonempty(&self.path).await?;
        Ok(self.path.clone())
    }
}

async fn ensure_nonempty(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(PipelineError::Acquisition(format!("{} is empty", path.display()))),
        Err(e) => Err(PipelineError::Acquisition(format!("{}: {}", path.display(), e))),
    }
}

/// Parse AppleScript bounds (`left, top, right, bottom`) into a rect.
/// Zero-sized windows are treated as absent.
pub fn parse_bounds(output: &str) -> Option<WindowRect> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "NO_WINDOW" || trimmed == "NO_PROCESS" {
        return None;
    }

    let parts: Vec<i32> = trimmed
        .replace(['{', '}'], "")
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let [left, top, right, bottom] = parts[..] else {
        return None;
    };

    let width = (right - left).max(0) as u32;
    let height = (bottom - top).max(0) as u32;
    if width == 0 || height == 0 {
        return None;
    }
    Some(WindowRect { x: left, y: top, width, height })
}

/// Create the capture directory, optionally removing stale captures.
pub async fn ensure_out_dir(path: &Path, clear: bool) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    if !clear {
        return Ok(());
    }

    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let item = entry.path();
        let removed = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&item).await,
            _ => tokio::fs::remove_file(&item).await,
        };
        if let Err(e) = removed {
            warn!("Failed to remove stale capture '{}': {}", item.display(), e);
        }
    }
    Ok(())
}

/// Image reference for observers: relative to the working directory when
/// possible, always with forward slashes.
pub fn relative_image_path(path: &Path) -> String {
    let relative = std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf());
    relative.to_string_lossy().replace('\\', "/")
}

fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if slug.is_empty() {
        "capture".to_string()
    } else {
        slug
    }
}
