use crate::media::MediaError;
use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Side length of the badge drawn on video thumbnails.
pub const VIDEO_ICON_SIZE: u32 = 90;
/// Distance of the badge from the top and right edges.
pub const VIDEO_ICON_MARGIN: u32 = 11;

/// Pulls a single still frame out of a video file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Write one frame of `input` as an image to `output`. Parent directories
    /// of `output` must already exist.
    async fn extract_frame(&self, input: &Path, output: &Path) -> Result<(), MediaError>;

    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Frame extraction through an external `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    command: String,
    seek: String,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(command: impl Into<String>, seek: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            seek: seek.into(),
            timeout,
        }
    }

    pub fn from_config(config: &crate::VideoConfig) -> Self {
        Self::new(
            config.ffmpeg_command.clone(),
            config.seek.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    fn arguments(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.display().to_string(),
            "-ss".to_string(),
            self.seek.clone(),
            "-vframes".to_string(),
            "1".to_string(),
            output.display().to_string(),
        ]
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract_frame(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        if !self.is_available() {
            return Err(MediaError::ExternalTool(format!(
                "video thumbnails not supported, {} not installed",
                self.command
            )));
        }

        let args = self.arguments(input, output);
        debug!("Running {} {}", self.command, args.join(" "));

        let child = tokio::process::Command::new(&self.command)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        let result = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} timed out after {}s on {}",
                    self.command,
                    self.timeout.as_secs(),
                    input.display()
                );
                return Err(MediaError::ExternalTool(format!(
                    "{} timed out after {}s",
                    self.command,
                    self.timeout.as_secs()
                )));
            }
        };

        let output_exists = tokio::fs::try_exists(output).await.unwrap_or(false);
        match result {
            Ok(out) if out.status.success() && output_exists => Ok(()),
            Ok(out) => Err(MediaError::ExternalTool(format!(
                "{} {}\nStdout: {}\nStderr: {}",
                self.command,
                args.join(" "),
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            ))),
            Err(e) => Err(MediaError::ExternalTool(format!(
                "{} {}: {}",
                self.command,
                args.join(" "),
                e
            ))),
        }
    }

    fn is_available(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// Draw the play badge: a translucent dark square with a white triangle.
pub fn draw_video_icon(size: u32) -> RgbaImage {
    let mut icon = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    let border = (size / 15).max(1);

    draw_filled_rect_mut(
        &mut icon,
        Rect::at(0, 0).of_size(size, size),
        Rgba([255, 255, 255, 200]),
    );
    draw_filled_rect_mut(
        &mut icon,
        Rect::at(border as i32, border as i32).of_size(size - 2 * border, size - 2 * border),
        Rgba([20, 20, 20, 170]),
    );

    let s = size as i32;
    let triangle = [
        Point::new(s * 3 / 8, s / 4),
        Point::new(s * 3 / 4, s / 2),
        Point::new(s * 3 / 8, s * 3 / 4),
    ];
    draw_polygon_mut(&mut icon, &triangle, Rgba([255, 255, 255, 255]));

    icon
}

/// Paste the badge into the top right corner of a thumbnail.
pub(crate) fn overlay_video_icon(thumbnail: DynamicImage, icon: &RgbaImage) -> DynamicImage {
    let mut canvas = thumbnail.to_rgba8();
    let x = canvas
        .width()
        .saturating_sub(icon.width() + VIDEO_ICON_MARGIN);
    imageops::overlay(&mut canvas, icon, i64::from(x), i64::from(VIDEO_ICON_MARGIN));
    DynamicImage::ImageRgba8(canvas)
}
