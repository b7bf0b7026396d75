use std::sync::LazyLock;

use regex::Regex;

static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|gif|bmp|webp)$").expect("static regex is valid")
});

pub fn is_image_url(url: &str) -> bool {
    IMAGE_URL.is_match(url)
}

/// Text after the last `.`, or empty when there is none.
pub fn extension(url: &str) -> &str {
    url.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default()
}

pub fn render(url: &str) -> String {
    if is_image_url(url) {
        format!("[image] {url}")
    } else {
        let ext = extension(url);
        if ext.is_empty() {
            format!("[file] {url}")
        } else {
            format!("[{} file] {url}", ext.to_uppercase())
        }
    }
}
