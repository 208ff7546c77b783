use image::ImageFormat;

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Raw image bytes together with what we know about them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

impl ImagePayload {
    /// Builds a payload, trusting the declared content type only when it names an image.
    pub fn new(bytes: Vec<u8>, declared_type: Option<&str>, file_name: Option<&str>) -> Self {
        let content_type = match declared_type.map(str::trim) {
            Some(t) if t.starts_with("image/") => t.to_string(),
            _ => sniff_content_type(&bytes).unwrap_or(FALLBACK_CONTENT_TYPE).to_string(),
        };
        let file_name = file_name
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("image.{}", extension_for(&content_type)));
        Self {
            bytes,
            content_type,
            file_name,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn extension(&self) -> &'static str {
        extension_for(&self.content_type)
    }

    /// Content type sent to the classifier, which expects an image part.
    pub fn upload_content_type(&self) -> &str {
        if self.content_type.starts_with("image/") {
            &self.content_type
        } else {
            "image/jpeg"
        }
    }
}

pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        other => ImageFormat::from_mime_type(other)
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("bin"),
    }
}
