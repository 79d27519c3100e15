use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use std::{fs, io, path::Path};
use tracing::debug;

/// Media type declared when neither the file contents nor its extension
/// identify the format.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// A base64-encoded image with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    /// The MIME type of the image. E.g. "image/jpeg", "image/png".
    pub media_type: String,
    /// The base64-encoded image data.
    pub data: String,
}

/// Read the file at `path` and return its bytes base64-encoded.
pub fn load_image_base64(path: impl AsRef<Path>) -> io::Result<String> {
    let bytes = fs::read(path.as_ref())?;
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Read the file at `path`, base64-encode it and detect its media type.
pub fn load_image(path: impl AsRef<Path>) -> io::Result<ImageSource> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let media_type = detect_media_type(&bytes, path);

    debug!(
        path = %path.display(),
        bytes = bytes.len(),
        media_type,
        "loaded image"
    );

    Ok(ImageSource {
        media_type: media_type.to_string(),
        data: BASE64_STANDARD.encode(bytes),
    })
}

/// Detect one of the image formats Claude accepts, from magic bytes first and
/// the file extension second.
pub fn detect_media_type(bytes: &[u8], path: &Path) -> &'static str {
    sniff_media_type(bytes)
        .or_else(|| media_type_from_extension(path))
        .unwrap_or(DEFAULT_MEDIA_TYPE)
}

fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

fn media_type_from_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_magic_bytes_before_extension() {
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(detect_media_type(png, Path::new("photo.jpg")), "image/png");

        let webp = b"RIFF\x24\0\0\0WEBPVP8 ";
        assert_eq!(detect_media_type(webp, Path::new("a.bin")), "image/webp");

        assert_eq!(
            detect_media_type(b"GIF89a....", Path::new("a")),
            "image/gif"
        );
        assert_eq!(
            detect_media_type(&[0xFF, 0xD8, 0xFF, 0xE0], Path::new("a.png")),
            "image/jpeg"
        );
    }

    #[test]
    fn falls_back_to_extension_then_default() {
        assert_eq!(
            detect_media_type(b"not an image", Path::new("cat.PNG")),
            "image/png"
        );
        assert_eq!(
            detect_media_type(b"not an image", Path::new("cat.webp")),
            "image/webp"
        );
        assert_eq!(
            detect_media_type(b"not an image", Path::new("cat.tiff")),
            DEFAULT_MEDIA_TYPE
        );
        assert_eq!(
            detect_media_type(b"", Path::new("no_extension")),
            DEFAULT_MEDIA_TYPE
        );
    }
}
