#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mediacache::cache::{ArtifactCache, FrameExtractor};
use mediacache::media::{MediaError, MediaLibrary, SharedLibrary};
use mediacache::{Config, MediaConfig};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

pub fn jpeg_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

/// JPEG carrying an EXIF block with only an embedded thumbnail in IFD1.
pub fn jpeg_with_exif_thumbnail(img: &DynamicImage, thumbnail: &[u8]) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());
    // IFD0 with Orientation = 1, pointing at IFD1
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&[1, 0, 0, 0]);
    tiff.extend_from_slice(&26u32.to_le_bytes());
    // IFD1: JPEGInterchangeFormat + JPEGInterchangeFormatLength
    let thumb_offset: u32 = 26 + 2 + 2 * 12 + 4;
    tiff.extend_from_slice(&2u16.to_le_bytes());
    for (tag, value) in [(0x0201u16, thumb_offset), (0x0202, thumbnail.len() as u32)] {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&value.to_le_bytes());
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(thumbnail);

    let jpeg = jpeg_bytes(img);
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Frame extractor that writes a fixed blue frame instead of running ffmpeg.
#[derive(Default)]
pub struct FakeExtractor {
    calls: AtomicUsize,
    locked: AtomicUsize,
}

impl FakeExtractor {
    /// Reports the video as locked by another process `times` times first.
    pub fn locked_for(times: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            locked: AtomicUsize::new(times),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn extract_frame(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .locked
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MediaError::FileLocked(input.display().to_string()));
        }
        std::fs::write(output, jpeg_bytes(&solid_image(320, 240, [0, 0, 200])))?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config: Config,
}

impl TestEnv {
    pub fn new(customize: impl FnOnce(&mut MediaConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.media.source_directory = temp_dir.path().join("media");
        config.media.cache_directory = temp_dir.path().join("cache");
        config.watcher.settle_millis = 100;
        std::fs::create_dir_all(&config.media.source_directory).unwrap();
        customize(&mut config.media);
        Self { temp_dir, config }
    }

    pub fn library(&self, extractor: Arc<FakeExtractor>) -> SharedLibrary {
        let cache = ArtifactCache::with_frame_extractor(self.config.media.clone(), extractor);
        Arc::new(MediaLibrary::with_cache(Arc::new(cache)))
    }

    pub fn media_path(&self, relative: &str) -> PathBuf {
        self.config.media.source_directory.join(relative)
    }

    pub fn cache_path(&self, relative: &str) -> PathBuf {
        self.config.media.cache_directory.join(relative)
    }

    pub fn write_media(&self, relative: &str, bytes: &[u8]) {
        let path = self.media_path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    pub fn write_png(&self, relative: &str, img: &DynamicImage) {
        let path = self.media_path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}
