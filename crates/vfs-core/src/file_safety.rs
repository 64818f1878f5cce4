//! Upload validation helpers: MIME sniffing and filename rules.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::UNKNOWN_MIME_TYPE;

/// Allowed shape of a physical file name set by a client.
static PHYSICAL_NAME_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[0-9a-z_-]+\.[0-9a-z]+$").ok());

/// Detect the MIME type of `data` from magic bytes only.
///
/// Client-supplied content types are never consulted.
pub fn detect_content_type(data: &[u8]) -> String {
    infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| UNKNOWN_MIME_TYPE.to_string())
}

/// Allow-list match for a sniffed MIME type.
///
/// An empty sniffed type is always accepted; a `*` entry allows any type.
pub fn is_allowed_mime_type<S: AsRef<str>>(allowed: &[S], mime: &str) -> bool {
    mime.is_empty()
        || allowed
            .iter()
            .any(|a| a.as_ref() == "*" || a.as_ref() == mime)
}

/// Empty extensions are always accepted; otherwise case-insensitive allow-list.
pub fn is_allowed_extension<S: AsRef<str>>(allowed: &[S], ext: &str) -> bool {
    ext.is_empty() || allowed.iter().any(|a| a.as_ref().eq_ignore_ascii_case(ext))
}

/// Whether `name` is a valid physical file name (`lower_case-name.ext`).
pub fn is_valid_physical_name(name: &str) -> bool {
    PHYSICAL_NAME_RE
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Title for an uploaded file: the base name without extension.
pub fn title_from_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rfind('.') {
        Some(0) | None => base.to_string(),
        Some(dot) => base[..dot].to_string(),
    }
}
