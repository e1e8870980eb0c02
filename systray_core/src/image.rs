//! Image pipeline: normalizes caller-supplied images into cached PNG files at a target size.
//!
//! Files live under `<cache_dir>/systray/images/` and are named after the first 16 bytes of
//! the SHA-256 of their source content plus the pixel size, so identical inputs map to the
//! same file across runs. Files are immutable once written.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

/// Errors from normalizing or caching an image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not encode PNG: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("target size must be non-zero")]
    ZeroSize,

    #[error("cache directory not available")]
    NoCacheDir,
}

/// A caller-supplied image reference.
#[derive(Clone)]
pub enum ImageSource {
    /// An existing file on disk, in any format the `image` crate decodes.
    Path(PathBuf),
    /// Encoded image bytes, e.g. a fully consumed stream.
    Bytes(Arc<[u8]>),
    /// An already rendered RGBA bitmap.
    Rendered(Arc<RgbaImage>),
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ImageSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            ImageSource::Rendered(img) => write!(f, "Rendered({}x{})", img.width(), img.height()),
        }
    }
}

impl ImageSource {
    /// Consumes a stream fully.
    pub fn from_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(ImageSource::Bytes(buf.into()))
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes.into())
    }
}

impl From<RgbaImage> for ImageSource {
    fn from(image: RgbaImage) -> Self {
        ImageSource::Rendered(Arc::new(image))
    }
}

/// Process-wide cache of normalized images and transparent spacers.
#[derive(Debug)]
pub struct ImageCache {
    dir: PathBuf,
    write_lock: Mutex<()>,
    spacers: Mutex<HashMap<u32, PathBuf>>,
}

impl ImageCache {
    /// Opens (and creates) a cache rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(ImageCache {
            dir,
            write_lock: Mutex::new(()),
            spacers: Mutex::new(HashMap::new()),
        })
    }

    /// Opens the per-user cache, `<cache_dir>/systray/images`.
    pub fn open_default() -> Result<Self, ImageError> {
        let dir = default_cache_dir().ok_or(ImageError::NoCacheDir)?;
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps `(source, size)` to a cached `size` x `size` PNG.
    ///
    /// Non-square sources keep their aspect ratio and are centered on a transparent canvas.
    pub fn normalize(&self, source: &ImageSource, size: u32) -> Result<PathBuf, ImageError> {
        if size == 0 {
            return Err(ImageError::ZeroSize);
        }

        let (hash, decoded) = match source {
            ImageSource::Path(path) => {
                let bytes = fs::read(path)?;
                (content_hash(&bytes), Pending::Encoded(bytes.into()))
            }
            ImageSource::Bytes(bytes) => (content_hash(bytes), Pending::Encoded(bytes.clone())),
            ImageSource::Rendered(img) => (rendered_hash(img), Pending::Rendered(img.clone())),
        };

        let path = self.dir.join(format!("{hash}_{size}.png"));
        if path.exists() {
            trace!(path = %path.display(), "Image cache hit");
            return Ok(path);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if path.exists() {
            return Ok(path);
        }

        let image = match decoded {
            Pending::Encoded(bytes) => image::load_from_memory(&bytes)?,
            Pending::Rendered(img) => DynamicImage::ImageRgba8((*img).clone()),
        };
        write_png_atomically(&path, &fit_square(&image, size))?;

        debug!(path = %path.display(), size, "Normalized image into cache");
        Ok(path)
    }

    /// A fully transparent `size` x `size` image, created on first use.
    pub fn spacer(&self, size: u32) -> Result<PathBuf, ImageError> {
        if size == 0 {
            return Err(ImageError::ZeroSize);
        }

        let mut spacers = self.spacers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = spacers.get(&size) {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        let path = self.dir.join(format!("spacer_{size}.png"));
        if !path.exists() {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            write_png_atomically(&path, &RgbaImage::new(size, size))?;
            debug!(path = %path.display(), size, "Created transparent spacer");
        }

        spacers.insert(size, path.clone());
        Ok(path)
    }
}

fn fit_square(image: &DynamicImage, size: u32) -> RgbaImage {
    let resized = image.resize(size, size, FilterType::Lanczos3).to_rgba8();
    if resized.dimensions() == (size, size) {
        return resized;
    }
    let mut canvas = RgbaImage::new(size, size);
    let x = (size - resized.width()) / 2;
    let y = (size - resized.height()) / 2;
    image::imageops::overlay(&mut canvas, &resized, i64::from(x), i64::from(y));
    canvas
}

enum Pending {
    Encoded(Arc<[u8]>),
    Rendered(Arc<RgbaImage>),
}

/// Returns the per-user cache directory for normalized images.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|base| base.join("systray").join("images"))
}

/// First 16 bytes of SHA-256 (32 hex characters).
fn content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hex::encode(&hash[..16])
}

fn rendered_hash(img: &RgbaImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(img.width().to_le_bytes());
    hasher.update(img.height().to_le_bytes());
    hasher.update(img.as_raw());
    let hash = hasher.finalize();
    hex::encode(&hash[..16])
}

/// Writes next to the target and renames, so a published path always holds a complete file.
fn write_png_atomically(path: &Path, image: &RgbaImage) -> Result<(), ImageError> {
    let png = rgba_to_png(image.as_raw(), image.width(), image.height())?;
    let tmp = path.with_extension(format!("png.{}.tmp", std::process::id()));
    fs::write(&tmp, png)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Convert RGBA buffer to PNG bytes
fn rgba_to_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ImageError> {
    let mut png = Vec::new();

    {
        let mut encoder = png::Encoder::new(Cursor::new(&mut png), width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba)?;
    }

    Ok(png)
}
