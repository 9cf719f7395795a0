use crate::MediaConfig;
use crate::cache::{ArtifactCache, FrameExtractor};
use crate::media::{MediaError, MediaLibrary};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

pub fn jpeg_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// Encode `img` as JPEG and splice in an APP1 EXIF segment carrying the
/// orientation tag and, optionally, an embedded thumbnail.
pub fn jpeg_with_exif(img: &DynamicImage, orientation: u16, thumbnail: Option<&[u8]>) -> Vec<u8> {
    let jpeg = jpeg_bytes(img);
    let tiff = tiff_block(orientation, thumbnail);

    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]); // SOI
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    out
}

fn ifd_entry(out: &mut Vec<u8>, tag: u16, kind: u16, value: u32) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    if kind == 3 {
        out.extend_from_slice(&(value as u16).to_le_bytes());
        out.extend_from_slice(&[0, 0]);
    } else {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn tiff_block(orientation: u16, thumbnail: Option<&[u8]>) -> Vec<u8> {
    const SHORT: u16 = 3;
    const LONG: u16 = 4;
    const IFD0_OFFSET: u32 = 8;
    const IFD0_LEN: u32 = 2 + 12 + 4;
    const IFD1_OFFSET: u32 = IFD0_OFFSET + IFD0_LEN;
    const IFD1_LEN: u32 = 2 + 2 * 12 + 4;

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&IFD0_OFFSET.to_le_bytes());

    out.extend_from_slice(&1u16.to_le_bytes());
    ifd_entry(&mut out, 0x0112, SHORT, orientation as u32);
    let next_ifd = if thumbnail.is_some() { IFD1_OFFSET } else { 0 };
    out.extend_from_slice(&next_ifd.to_le_bytes());

    if let Some(thumb) = thumbnail {
        let thumb_offset = IFD1_OFFSET + IFD1_LEN;
        out.extend_from_slice(&2u16.to_le_bytes());
        ifd_entry(&mut out, 0x0201, LONG, thumb_offset);
        ifd_entry(&mut out, 0x0202, LONG, thumb.len() as u32);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(thumb);
    }

    out
}

/// Stands in for ffmpeg: writes a fixed frame, or fails, and counts calls.
pub struct FakeExtractor {
    pub calls: AtomicUsize,
    pub fail: bool,
    /// Calls left that report the input as locked
    pub locked: AtomicUsize,
}

impl FakeExtractor {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            locked: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
            locked: AtomicUsize::new(0),
        })
    }

    /// Reports the input as locked for the first `times` calls, then works.
    pub fn locked_for(times: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            locked: AtomicUsize::new(times),
        })
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
        if self.fail {
            return Err(MediaError::ExternalTool("fake extractor failure".to_string()));
        }
        std::fs::write(output, jpeg_bytes(&solid_image(320, 240, [0, 0, 200])))?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.fail
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn test_config(media: &Path, cache: &Path) -> MediaConfig {
    MediaConfig {
        source_directory: media.to_path_buf(),
        cache_directory: cache.to_path_buf(),
        enable_preview: true,
        ..MediaConfig::default()
    }
}

pub fn cache_for(media: &Path, cache: &Path) -> ArtifactCache {
    ArtifactCache::with_frame_extractor(test_config(media, cache), FakeExtractor::working())
}

/// A media tree and cache tree in a temp directory with a library on top.
pub struct TestLibrary {
    pub temp_dir: TempDir,
    pub extractor: Arc<FakeExtractor>,
    pub library: MediaLibrary,
}

impl TestLibrary {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut MediaConfig)) -> Self {
        Self::with_extractor(FakeExtractor::working(), customize)
    }

    pub fn with_extractor(
        extractor: Arc<FakeExtractor>,
        customize: impl FnOnce(&mut MediaConfig),
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let media = temp_dir.path().join("media");
        let cache = temp_dir.path().join("cache");
        std::fs::create_dir_all(&media).unwrap();

        let mut config = test_config(&media, &cache);
        customize(&mut config);
        let cache = ArtifactCache::with_frame_extractor(config, extractor.clone());

        Self {
            temp_dir,
            extractor,
            library: MediaLibrary::with_cache(Arc::new(cache)),
        }
    }

    pub fn media_path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join("media").join(relative)
    }

    pub fn cache_path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join("cache").join(relative)
    }

    pub fn write_media(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.media_path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Save an image in the format its extension names.
    pub fn write_image(&self, relative: &str, img: &DynamicImage) -> PathBuf {
        let path = self.media_path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        if crate::media::catalog::is_jpeg(relative) {
            std::fs::write(&path, jpeg_bytes(img)).unwrap();
        } else {
            img.save(&path).unwrap();
        }
        path
    }
}
