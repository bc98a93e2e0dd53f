//! # Resolución segura de paths
//! src/files/resolver.rs
//!
//! Convierte el target crudo de un request en un archivo dentro del
//! directorio raíz, o en un rechazo con su motivo.
//!
//! ## Pasos
//!
//! 1. Quitar query string y fragmento
//! 2. Validar que empiece con `/` y no tenga caracteres de control
//! 3. Decodificar `%XX` exactamente una vez
//! 4. Unir con el root y canonicalizar (resuelve `.`, `..` y symlinks)
//! 5. Verificar contención por componentes (`Path::starts_with`), nunca
//!    por prefijo de string: `/public-evil` no está dentro de `/public`
//!
//! Entre la verificación y la apertura del archivo hay una ventana TOCTOU;
//! el handler trata un fallo al abrir como 404/403.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::http::StatusCode;

/// Motivo de rechazo de un target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Target vacío, sin `/` inicial, mal codificado o con bytes de control
    BadRequest,

    /// No existe
    NotFound,

    /// Fuera del root, o no es un archivo regular
    Forbidden,
}

impl Rejection {
    /// Código HTTP con el que se contesta
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::BadRequest => StatusCode::BadRequest,
            Rejection::NotFound => StatusCode::NotFound,
            Rejection::Forbidden => StatusCode::Forbidden,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::BadRequest => write!(f, "malformed target"),
            Rejection::NotFound => write!(f, "not found"),
            Rejection::Forbidden => write!(f, "forbidden"),
        }
    }
}

/// Resultado de resolver un target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// Path canónico de un archivo regular dentro del root
    Safe(PathBuf),

    /// Rechazado
    Rejected(Rejection),
}

/// Resuelve `raw_target` contra `root`.
///
/// Función pura salvo por las lecturas del filesystem. `root` se
/// canonicaliza si todavía no lo está.
pub fn resolve(raw_target: &str, root: &Path) -> ResolvedTarget {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    match decode_target(raw_target) {
        Ok(decoded) => locate(&decoded, &root),
        Err(rejection) => ResolvedTarget::Rejected(rejection),
    }
}

/// Resolver ligado a un root ya canonicalizado, con archivo índice para `/`
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    index_file: Option<String>,
}

impl PathResolver {
    /// `root` debe ser canónico (lo garantiza `ServerConfig`)
    pub fn new(root: PathBuf, index_file: Option<String>) -> Self {
        Self { root, index_file }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Igual que [`resolve`], pero `GET /` sirve el archivo índice
    pub fn resolve(&self, raw_target: &str) -> ResolvedTarget {
        let decoded = match decode_target(raw_target) {
            Ok(decoded) => decoded,
            Err(rejection) => return ResolvedTarget::Rejected(rejection),
        };

        match (&self.index_file, decoded.as_str()) {
            (Some(index), "/") => locate(&format!("/{}", index), &self.root),
            _ => locate(&decoded, &self.root),
        }
    }

    /// Resuelve un archivo configurado relativo al root (ej: `404.html`)
    pub fn resolve_relative(&self, relative: &str) -> ResolvedTarget {
        locate(&format!("/{}", relative.trim_start_matches('/')), &self.root)
    }
}

/// Quita query/fragmento, valida y decodifica una sola vez
fn decode_target(raw_target: &str) -> Result<String, Rejection> {
    let path = match raw_target.find(|c| c == '?' || c == '#') {
        Some(end) => &raw_target[..end],
        None => raw_target,
    };

    if path.is_empty() || !path.starts_with('/') {
        return Err(Rejection::BadRequest);
    }

    if path.chars().any(char::is_control) || !has_valid_escapes(path) {
        return Err(Rejection::BadRequest);
    }

    let decoded: Cow<str> = urlencoding::decode(path).map_err(|_| Rejection::BadRequest)?;

    if decoded.chars().any(char::is_control) {
        return Err(Rejection::BadRequest);
    }

    Ok(decoded.into_owned())
}

/// Cada `%` debe ir seguido de dos dígitos hexadecimales
fn has_valid_escapes(path: &str) -> bool {
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Une el path decodificado al root, canonicaliza y clasifica
fn locate(decoded: &str, root: &Path) -> ResolvedTarget {
    let candidate = root.join(decoded.trim_start_matches('/'));

    let canonical = match candidate.canonicalize() {
        Ok(path) => path,
        Err(e) => return ResolvedTarget::Rejected(rejection_for(&e)),
    };

    if !canonical.starts_with(root) {
        return ResolvedTarget::Rejected(Rejection::Forbidden);
    }

    match fs::metadata(&canonical) {
        Ok(meta) if meta.is_file() => ResolvedTarget::Safe(canonical),
        Ok(_) => ResolvedTarget::Rejected(Rejection::Forbidden),
        Err(e) => ResolvedTarget::Rejected(rejection_for(&e)),
    }
}

/// Errores del filesystem: permisos → 403, cualquier otro → 404
pub(crate) fn rejection_for(error: &io::Error) -> Rejection {
    match error.kind() {
        io::ErrorKind::PermissionDenied => Rejection::Forbidden,
        _ => Rejection::NotFound,
    }
}
