use std::io::Cursor;

use image::ImageReader;
use serde::{Deserialize, Serialize};

use super::optimize::{FitMode, OptimizeOptions};
use crate::error::{AppError, Result};

const MB: u64 = 1024 * 1024;

pub const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];
pub const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "image/jpeg",
    "image/png",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBucket {
    Avatars,
    ServiceImages,
    Documents,
}

impl StorageBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBucket::Avatars => "avatars",
            StorageBucket::ServiceImages => "service-images",
            StorageBucket::Documents => "documents",
        }
    }

    pub fn rules(self) -> FileRules {
        match self {
            StorageBucket::Avatars => FileRules {
                max_size_bytes: 2 * MB,
                allowed_types: IMAGE_TYPES,
                min_dimensions: Some((100, 100)),
                max_dimensions: Some((4096, 4096)),
                optimize: Some(OptimizeOptions::bounded(400, 400)),
            },
            StorageBucket::ServiceImages => FileRules {
                max_size_bytes: 5 * MB,
                allowed_types: IMAGE_TYPES,
                min_dimensions: Some((300, 200)),
                max_dimensions: Some((6000, 6000)),
                optimize: Some(OptimizeOptions {
                    fit: FitMode::Contain,
                    ..OptimizeOptions::bounded(1920, 1080)
                }),
            },
            StorageBucket::Documents => FileRules {
                max_size_bytes: 10 * MB,
                allowed_types: DOCUMENT_TYPES,
                min_dimensions: None,
                max_dimensions: None,
                optimize: None,
            },
        }
    }
}

impl std::str::FromStr for StorageBucket {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "avatars" => Ok(StorageBucket::Avatars),
            "service-images" => Ok(StorageBucket::ServiceImages),
            "documents" => Ok(StorageBucket::Documents),
            other => Err(AppError::Validation(format!("Archivio sconosciuto: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FileRules {
    pub max_size_bytes: u64,
    pub allowed_types: &'static [&'static str],
    pub min_dimensions: Option<(u32, u32)>,
    pub max_dimensions: Option<(u32, u32)>,
    /// How images in this bucket are re-encoded; stored as sent when `None`.
    pub optimize: Option<OptimizeOptions>,
}

/// A file as received from a client, before anything touches storage.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    pub dimensions: Option<(u32, u32)>,
}

/// Falls back to the file extension when the client sent no usable type.
pub fn resolve_content_type(file_name: &str, declared: Option<&str>) -> String {
    if let Some(declared) = declared.filter(|t| !t.is_empty() && *t != "application/octet-stream") {
        return declared.to_ascii_lowercase();
    }

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
    .to_string()
}

pub fn validate_file(file: &IncomingFile, rules: &FileRules) -> Result<ValidatedFile> {
    if file.bytes.is_empty() {
        return Err(AppError::Validation("Il file è vuoto".into()));
    }

    let size = file.bytes.len() as u64;
    if size > rules.max_size_bytes {
        return Err(AppError::Validation(format!(
            "Il file è troppo grande ({:.1} MB). Dimensione massima: {} MB",
            size as f64 / MB as f64,
            rules.max_size_bytes / MB
        )));
    }

    if !rules.allowed_types.contains(&file.content_type.as_str()) {
        return Err(AppError::Validation(format!(
            "Tipo di file non supportato: {}",
            file.content_type
        )));
    }

    if !file.is_image() {
        return Ok(ValidatedFile { dimensions: None });
    }

    let sniffed = image::guess_format(&file.bytes)
        .map_err(|_| AppError::Validation("Il file non è un'immagine valida".into()))?;
    if sniffed.to_mime_type() != file.content_type {
        return Err(AppError::Validation(format!(
            "Il contenuto del file ({}) non corrisponde al tipo dichiarato ({})",
            sniffed.to_mime_type(),
            file.content_type
        )));
    }

    // Header only; the pixels are decoded later, if at all.
    let (width, height) = ImageReader::with_format(Cursor::new(file.bytes.as_slice()), sniffed)
        .into_dimensions()
        .map_err(|_| AppError::Validation("Impossibile leggere l'immagine".into()))?;

    if let Some((min_w, min_h)) = rules.min_dimensions {
        if width < min_w || height < min_h {
            return Err(AppError::Validation(format!(
                "Immagine troppo piccola ({width}x{height}). Minimo: {min_w}x{min_h}"
            )));
        }
    }
    if let Some((max_w, max_h)) = rules.max_dimensions {
        if width > max_w || height > max_h {
            return Err(AppError::Validation(format!(
                "Immagine troppo grande ({width}x{height}). Massimo: {max_w}x{max_h}"
            )));
        }
    }

    Ok(ValidatedFile {
        dimensions: Some((width, height)),
    })
}

/// Keeps ASCII letters, digits, dots, dashes and underscores; everything
/// else becomes an underscore.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn file(content_type: &str, bytes: Vec<u8>) -> IncomingFile {
        IncomingFile {
            file_name: "upload".into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    #[test]
    fn accepts_valid_avatar() {
        let validated = validate_file(&file("image/png", png(200, 150)), &StorageBucket::Avatars.rules()).unwrap();
        assert_eq!(validated.dimensions, Some((200, 150)));
    }

    #[test]
    fn rejects_empty_and_oversized_files() {
        let rules = StorageBucket::Avatars.rules();
        assert!(validate_file(&file("image/png", Vec::new()), &rules).is_err());

        let big = vec![0u8; (rules.max_size_bytes + 1) as usize];
        let err = validate_file(&file("image/png", big), &rules).unwrap_err();
        assert!(err.to_string().contains("troppo grande"));
    }

    #[test]
    fn rejects_disallowed_type() {
        let err = validate_file(&file("application/pdf", b"%PDF-1.7".to_vec()), &StorageBucket::Avatars.rules())
            .unwrap_err();
        assert!(err.to_string().contains("non supportato"));
    }

    #[test]
    fn rejects_mismatched_content() {
        let err = validate_file(&file("image/jpeg", png(200, 200)), &StorageBucket::Avatars.rules()).unwrap_err();
        assert!(err.to_string().contains("non corrisponde"));
    }

    #[test]
    fn enforces_dimension_bounds() {
        let rules = StorageBucket::Avatars.rules();
        let err = validate_file(&file("image/png", png(50, 50)), &rules).unwrap_err();
        assert!(err.to_string().contains("troppo piccola"));
    }

    #[test]
    fn oversized_dimensions_are_read_from_the_header() {
        let rules = StorageBucket::ServiceImages.rules();
        let err = validate_file(&file("image/png", png(6100, 250)), &rules).unwrap_err();
        assert!(err.to_string().contains("6100x250"));

        // Pixel data is never decoded, so a corrupt body still reports its size.
        let mut damaged = png(400, 300);
        let len = damaged.len();
        damaged.truncate(len - 16);
        let validated = validate_file(&file("image/png", damaged), &rules).unwrap();
        assert_eq!(validated.dimensions, Some((400, 300)));
    }

    #[test]
    fn each_bucket_has_its_own_optimization() {
        let avatars = StorageBucket::Avatars.rules().optimize.unwrap();
        assert_eq!((avatars.width, avatars.height, avatars.fit), (Some(400), Some(400), FitMode::Cover));

        let services = StorageBucket::ServiceImages.rules().optimize.unwrap();
        assert_eq!(
            (services.width, services.height, services.fit),
            (Some(1920), Some(1080), FitMode::Contain)
        );

        assert!(StorageBucket::Documents.rules().optimize.is_none());
    }

    #[test]
    fn documents_skip_image_checks() {
        let validated =
            validate_file(&file("application/pdf", b"%PDF-1.7 ...".to_vec()), &StorageBucket::Documents.rules())
                .unwrap();
        assert_eq!(validated.dimensions, None);
    }

    #[test]
    fn content_type_falls_back_to_extension() {
        assert_eq!(resolve_content_type("foto.JPG", None), "image/jpeg");
        assert_eq!(
            resolve_content_type("doc.pdf", Some("application/octet-stream")),
            "application/pdf"
        );
        assert_eq!(resolve_content_type("x.png", Some("Image/PNG")), "image/png");
        assert_eq!(resolve_content_type("noext", None), "application/octet-stream");
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("../../Attestato Sicurezza.pdf"), "attestato_sicurezza.pdf");
        assert_eq!(sanitize_file_name("C:\\foo\\bär.png"), "b_r.png");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn bucket_names_round_trip() {
        for bucket in [StorageBucket::Avatars, StorageBucket::ServiceImages, StorageBucket::Documents] {
            assert_eq!(bucket.as_str().parse::<StorageBucket>().unwrap(), bucket);
        }
        assert!("secrets".parse::<StorageBucket>().is_err());
    }
}
