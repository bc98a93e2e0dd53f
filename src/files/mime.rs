//! # Tipos MIME
//! src/files/mime.rs
//!
//! Tabla fija para las extensiones comunes; si no está, se consulta el
//! registro de `mime_guess`; si tampoco, `application/octet-stream`.

use std::borrow::Cow;
use std::path::Path;

/// Tipo por defecto cuando no se reconoce la extensión
pub const FALLBACK: &str = "application/octet-stream";

/// Extensiones conocidas (en minúsculas, sin punto)
const TABLE: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain; charset=utf-8"),
];

/// Content-Type para una extensión (con o sin punto, cualquier caja)
///
/// # Ejemplo
/// ```
/// use static_server::files::mime::lookup;
///
/// assert_eq!(lookup("HTML"), "text/html; charset=utf-8");
/// assert_eq!(lookup(".png"), "image/png");
/// assert_eq!(lookup("no-such-ext"), "application/octet-stream");
/// ```
pub fn lookup(extension: &str) -> Cow<'static, str> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();

    if let Some((_, content_type)) = TABLE.iter().find(|(known, _)| *known == ext) {
        return Cow::Borrowed(content_type);
    }

    if ext.is_empty() {
        return Cow::Borrowed(FALLBACK);
    }

    match mime_guess::from_ext(&ext).first() {
        Some(guess) => Cow::Owned(guess.essence_str().to_string()),
        None => Cow::Borrowed(FALLBACK),
    }
}

/// Content-Type según la extensión de un path
pub fn for_path(path: &Path) -> Cow<'static, str> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => lookup(ext),
        None => Cow::Borrowed(FALLBACK),
    }
}
