//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! API para construir respuestas HTTP/1.1 y escribirlas en el socket.
//! El body puede ser un buffer en memoria o un archivo abierto; en el
//! segundo caso se transmite en bloques de `chunk_size` bytes para que la
//! memoria usada no dependa del tamaño del archivo.
//!
//! ## Ejemplo de uso
//!
//! ```
//! use static_server::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "text/plain; charset=utf-8")
//!     .with_body("Hello");
//!
//! let mut wire = Vec::new();
//! response.write_to(&mut wire, 8192, true).unwrap();
//! assert!(wire.ends_with(b"\r\n\r\nHello"));
//! ```

use super::StatusCode;
use std::fs::File;
use std::io::{self, Read, Write};

/// Origen del body
#[derive(Debug)]
pub enum Body {
    /// Sin body (ni siquiera Content-Length)
    Empty,

    /// Buffer en memoria
    Bytes(Vec<u8>),

    /// Archivo abierto y su tamaño exacto al momento de abrirlo
    File { file: File, len: u64 },
}

impl Body {
    /// Tamaño del body en bytes
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error al transmitir: cuántos bytes de body alcanzaron a salir
#[derive(Debug)]
pub struct StreamError {
    pub body_bytes: u64,
    pub source: io::Error,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} body bytes)", self.source, self.body_bytes)
    }
}

impl std::error::Error for StreamError {}

/// Respuesta HTTP/1.1
#[derive(Debug)]
pub struct Response {
    /// Código de estado
    status: StatusCode,

    /// Headers en orden de inserción
    headers: Vec<(String, String)>,

    /// Body
    body: Body,
}

impl Response {
    /// Respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Agrega un header. Si ya existe (sin distinguir mayúsculas) se
    /// reemplaza el valor conservando su posición.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Versión mutable de `with_header`
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Body desde un string; agrega `Content-Length`
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Body binario; agrega `Content-Length`
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.add_header("Content-Length", &body.len().to_string());
        self.body = Body::Bytes(body);
        self
    }

    /// Body que se transmite desde un archivo abierto
    pub fn with_file(mut self, file: File, len: u64) -> Self {
        self.add_header("Content-Length", &len.to_string());
        self.body = Body::File { file, len };
        self
    }

    /// Respuesta JSON 200
    pub fn json(body: &str) -> Self {
        Self::new(StatusCode::Ok)
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(body)
    }

    /// Página de error HTML mínima
    ///
    /// # Ejemplo
    /// ```
    /// use static_server::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound, "File not found");
    /// assert_eq!(response.status(), StatusCode::NotFound);
    /// assert_eq!(response.header("Content-Type"), Some("text/html; charset=utf-8"));
    /// ```
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = format!(
            "<!DOCTYPE html>\n<html><head><title>{status}</title></head>\
             <body><h1>{status}</h1><p>{message}</p></body></html>\n",
            status = status,
            message = escape_html(message),
        );
        Self::new(status)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(&body)
    }

    /// Serializa status line + headers + línea vacía
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(128);

        result.extend_from_slice(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());

        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        result.extend_from_slice(b"\r\n");
        result
    }

    /// Escribe la respuesta completa y consume el body (el archivo se
    /// cierra al salir, pase lo que pase).
    ///
    /// Con `include_body = false` (HEAD) solo se envía el head, con los
    /// mismos headers que tendría el GET. Retorna los bytes de body enviados.
    pub fn write_to<W: Write>(
        self,
        writer: &mut W,
        chunk_size: usize,
        include_body: bool,
    ) -> Result<u64, StreamError> {
        let fail = |body_bytes: u64| move |source: io::Error| StreamError { body_bytes, source };

        writer.write_all(&self.head_bytes()).map_err(fail(0))?;

        if !include_body {
            writer.flush().map_err(fail(0))?;
            return Ok(0);
        }

        let sent = match self.body {
            Body::Empty => 0,
            Body::Bytes(bytes) => {
                writer.write_all(&bytes).map_err(fail(0))?;
                bytes.len() as u64
            }
            Body::File { file, len } => stream_file(file, len, writer, chunk_size)?,
        };

        writer.flush().map_err(fail(sent))?;
        Ok(sent)
    }

    // === Accesores ===

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}

/// Copia exactamente `len` bytes del archivo en bloques de `chunk_size`.
/// Si el archivo se acorta mientras se lee, falla con `UnexpectedEof`:
/// el `Content-Length` ya fue enviado y no se puede cumplir.
fn stream_file<W: Write>(
    file: File,
    len: u64,
    writer: &mut W,
    chunk_size: usize,
) -> Result<u64, StreamError> {
    let mut reader = file.take(len);
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;

    while sent < len {
        let n = match reader.read(&mut buffer) {
            Ok(0) => {
                return Err(StreamError {
                    body_bytes: sent,
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while streaming"),
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(StreamError { body_bytes: sent, source }),
        };

        writer
            .write_all(&buffer[..n])
            .map_err(|source| StreamError { body_bytes: sent, source })?;
        sent += n as u64;
    }

    Ok(sent)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
