use url::Url;

/// Filename used when the URL path has no usable last segment.
pub const DEFAULT_FILENAME: &str = "video.mp4";

/// Turns an email into a single path-safe key segment.
pub fn sanitize_email(email: &str) -> String {
    email.replace('@', "_at_").replace('.', "_dot_")
}

/// Last segment of the URL's path component, or [`DEFAULT_FILENAME`].
///
/// The path is taken after WHATWG URL normalization: `\` acts as a separator
/// for http(s), dot segments are resolved and unsafe bytes are percent-encoded.
pub fn filename_from_url(raw: &str) -> String {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        // Not an absolute URL: everything before the query/fragment is the path
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != "." && name != ".." => name.to_string(),
        _ => DEFAULT_FILENAME.to_string(),
    }
}

pub fn storage_key(email: &str, filename: &str) -> String {
    format!("{}/{}", sanitize_email(email), filename)
}
