//! # Archivos estáticos
//! src/files/mod.rs
//!
//! Las dos piezas puras que consulta el handler de conexiones:
//!
//! - `resolver`: target crudo → archivo seguro dentro del root, o rechazo
//! - `mime`: extensión → Content-Type

pub mod mime;
pub mod resolver;

pub use resolver::{resolve, PathResolver, Rejection, ResolvedTarget};
