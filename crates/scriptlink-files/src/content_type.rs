//! Content type selection by file extension.

use std::path::Path;

/// Pick a response content type from the file extension.
///
/// The comparison is case-insensitive; anything unrecognized is served as
/// plain text.
pub fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "text/plain";
    };

    if ext.eq_ignore_ascii_case("html") {
        "text/html"
    } else if ext.eq_ignore_ascii_case("js") {
        "application/javascript"
    } else if ext.eq_ignore_ascii_case("css") {
        "text/css"
    } else if ext.eq_ignore_ascii_case("png") {
        "image/png"
    } else if ext.eq_ignore_ascii_case("ico") {
        "image/x-icon"
    } else if ext.eq_ignore_ascii_case("svg") {
        "text/xml"
    } else {
        "text/plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(content_type_for(Path::new("/a/index.html")), "text/html");
        assert_eq!(
            content_type_for(Path::new("app.js")),
            "application/javascript"
        );
        assert_eq!(content_type_for(Path::new("style.css")), "text/css");
        assert_eq!(content_type_for(Path::new("logo.png")), "image/png");
        assert_eq!(content_type_for(Path::new("favicon.ico")), "image/x-icon");
        assert_eq!(content_type_for(Path::new("icon.svg")), "text/xml");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(content_type_for(Path::new("INDEX.HTML")), "text/html");
        assert_eq!(content_type_for(Path::new("Logo.PnG")), "image/png");
    }

    #[test]
    fn test_unknown_defaults_to_plain_text() {
        assert_eq!(content_type_for(Path::new("data.bin")), "text/plain");
        assert_eq!(content_type_for(Path::new("README")), "text/plain");
        assert_eq!(content_type_for(Path::new("archive.tar.gz")), "text/plain");
    }
}
