//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Subconjunto de HTTP/1.1 que necesita un servidor de archivos estáticos:
//!
//! - Parsing del head del request (request line + headers)
//! - Construcción de responses con body en memoria o desde archivo
//! - Códigos de estado con reason phrase fijo
//!
//! No hay conexiones persistentes: toda respuesta lleva `Connection: close`.
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html; charset=utf-8\r\n
//! Content-Length: 12\r\n
//! Connection: close\r\n
//! \r\n
//! <h1>hi</h1>
//! ```

pub mod request;
pub mod response;
pub mod status;

pub use request::{read_head, HeadError, Method, ParseError, Request, TimedRead, MAX_HEAD_BYTES};
pub use response::{Body, Response, StreamError};
pub use status::StatusCode;
