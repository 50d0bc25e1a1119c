use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::ImageFormat;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;

/// A file as received from the client, before any validation.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image(ImageFormat),
    Text,
}

impl AttachmentKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match essence(mime).as_str() {
            "image/jpeg" => Some(Self::Image(ImageFormat::Jpeg)),
            "image/gif" => Some(Self::Image(ImageFormat::Gif)),
            "image/png" => Some(Self::Image(ImageFormat::Png)),
            "text/plain" => Some(Self::Text),
            _ => None,
        }
    }

    /// File extensions consistent with this kind, preferred one first.
    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image(ImageFormat::Jpeg) => &["jpg", "jpeg"],
            Self::Image(ImageFormat::Gif) => &["gif"],
            Self::Image(ImageFormat::Png) => &["png"],
            Self::Image(_) => &["img"],
            Self::Text => &["txt", "text", "log", "md", "csv"],
        }
    }
}

/// `"Text/Plain; charset=utf-8"` -> `"text/plain"`
fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub allowed_types: Vec<String>,
    pub max_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            allowed_types: ["image/jpeg", "image/gif", "image/png", "text/plain"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_bytes: 100 * 1024,
            max_width: 320,
            max_height: 240,
        }
    }
}

impl AttachmentPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_bytes: config.max_attachment_bytes,
            max_width: config.image_max_width,
            max_height: config.image_max_height,
            ..Self::default()
        }
    }

    /// Type first, then size.
    pub fn check(&self, file: &UploadedFile) -> Result<AttachmentKind, AppError> {
        let kind = self.check_type(&file.content_type)?;
        self.check_size(file.bytes.len())?;
        Ok(kind)
    }

    pub fn check_type(&self, content_type: &str) -> Result<AttachmentKind, AppError> {
        let mime = essence(content_type);
        self.allowed_types
            .iter()
            .any(|allowed| *allowed == mime)
            .then(|| AttachmentKind::from_mime(&mime))
            .flatten()
            .ok_or_else(|| AppError::UnsupportedAttachment(content_type.to_string()))
    }

    /// The ceiling is inclusive.
    pub fn check_size(&self, len: usize) -> Result<(), AppError> {
        if len > self.max_bytes {
            return Err(AppError::AttachmentTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Brings an accepted file into its stored form: images are fitted inside
    /// the configured bounds, text is kept byte for byte.
    pub async fn normalize(&self, kind: AttachmentKind, bytes: Vec<u8>) -> Result<Vec<u8>, AppError> {
        match kind {
            AttachmentKind::Text => Ok(bytes),
            AttachmentKind::Image(format) => {
                normalize_image(bytes, format, self.max_width, self.max_height).await
            }
        }
    }
}

/// Decodes on the blocking pool and downscales so that neither side exceeds
/// `max_width` x `max_height`. Aspect ratio is kept and small images are
/// never enlarged; an image already inside the bounds is stored unchanged.
pub async fn normalize_image(
    bytes: Vec<u8>,
    format: ImageFormat,
    max_width: u32,
    max_height: u32,
) -> Result<Vec<u8>, AppError> {
    tokio::task::spawn_blocking(move || fit_inside(bytes, format, max_width, max_height))
        .await
        .map_err(|e| AppError::AttachmentProcessing(e.to_string()))?
        .map_err(|e| AppError::AttachmentProcessing(e.to_string()))
}

fn fit_inside(
    bytes: Vec<u8>,
    format: ImageFormat,
    max_width: u32,
    max_height: u32,
) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory_with_format(&bytes, format)?;
    if img.width() <= max_width && img.height() <= max_height {
        return Ok(bytes);
    }

    let resized = img.resize(max_width, max_height, FilterType::Lanczos3);
    tracing::debug!(
        from = ?(img.width(), img.height()),
        to = ?(resized.width(), resized.height()),
        "resized image attachment"
    );

    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

/// Upload directory with collision-free file names.
#[derive(Debug, Clone)]
pub struct AttachmentStorage {
    dir: PathBuf,
}

impl AttachmentStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// `<uuid>.<ext>`; the original extension is kept only when it matches the kind.
    pub fn file_name_for(kind: AttachmentKind, original: Option<&str>) -> String {
        let allowed = kind.extensions();
        let ext = original
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| allowed.contains(&ext.as_str()))
            .unwrap_or_else(|| allowed[0].to_string());
        format!("{}.{}", Uuid::new_v4(), ext)
    }

    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub async fn remove(&self, file_name: &str) -> io::Result<()> {
        tokio::fs::remove_file(self.dir.join(file_name)).await
    }
}
