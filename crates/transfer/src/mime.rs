use std::path::Path;

/// Content type used when the extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Guesses a MIME type from the file extension.
pub fn detect_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp4" | "m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz" | "tgz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("json") => "application/json",
        Some("txt" | "log") => "text/plain",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(detect_content_type(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(detect_content_type(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(detect_content_type(Path::new("backup.tar")), "application/x-tar");
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(detect_content_type(Path::new("IMAGE.PNG")), "image/png");
        assert_eq!(detect_content_type(Path::new("Movie.MOV")), "video/quicktime");
    }

    #[test]
    fn unknown_falls_back_to_octet_stream() {
        assert_eq!(detect_content_type(Path::new("data.xyz")), DEFAULT_CONTENT_TYPE);
        assert_eq!(detect_content_type(Path::new("noext")), DEFAULT_CONTENT_TYPE);
        assert_eq!(detect_content_type(Path::new("")), DEFAULT_CONTENT_TYPE);
    }
}
