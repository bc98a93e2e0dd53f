//! # Parsing de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Parser del "head" de un request: request line + headers. El servidor
//! no acepta body (solo GET/HEAD), así que todo lo que venga después de la
//! línea vacía se ignora.
//!
//! ## Formato
//!
//! ```text
//! GET /assets/style.css?v=2 HTTP/1.1\r\n
//! Host: localhost:8000\r\n
//! \r\n
//! ```
//!
//! El target se guarda tal cual llegó (`raw_target`), sin decodificar:
//! validarlo es trabajo del `files::resolver`.

use std::collections::HashMap;
use std::io::{self, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Tamaño máximo del head (request line + headers)
pub const MAX_HEAD_BYTES: usize = 8192;

/// Métodos HTTP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un archivo
    GET,

    /// HEAD - Como GET pero sin body
    HEAD,

    /// Cualquier otro método; se contesta con 405
    OTHER(String),
}

impl Method {
    /// Parsea un método HTTP. Nunca falla: lo desconocido queda en `OTHER`.
    fn from_token(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            other => Method::OTHER(other.to_string()),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::OTHER(m) => m,
        }
    }

    /// GET y HEAD son los únicos que sirve el servidor
    pub fn is_supported(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD)
    }
}

/// Request HTTP parseado (solo el head)
#[derive(Debug, Clone)]
pub struct Request {
    /// Método HTTP
    method: Method,

    /// Target tal como llegó, sin validar ni decodificar
    raw_target: String,

    /// Versión HTTP ("HTTP/1.0" o "HTTP/1.1")
    version: String,

    /// Headers con el nombre en minúsculas
    headers: HashMap<String, String>,
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Request vacío
    EmptyRequest,

    /// El head no es UTF-8
    InvalidEncoding,

    /// Formato inválido de la request line
    InvalidRequestLine,

    /// Versión HTTP no soportada
    InvalidHttpVersion(String),

    /// Header sin ':'
    InvalidHeader(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::EmptyRequest => write!(f, "Empty request"),
            ParseError::InvalidEncoding => write!(f, "Request head is not valid UTF-8"),
            ParseError::InvalidRequestLine => write!(f, "Invalid request line format"),
            ParseError::InvalidHttpVersion(v) => write!(f, "Invalid HTTP version: {}", v),
            ParseError::InvalidHeader(h) => write!(f, "Invalid header: {}", h),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errores al leer el head desde el socket
#[derive(Debug)]
pub enum HeadError {
    /// El cliente cerró sin mandar nada
    Closed,

    /// Se agotó el idle timeout antes de recibir el head completo
    TimedOut,

    /// El head supera `MAX_HEAD_BYTES`
    TooLarge,

    /// Cualquier otro error de I/O
    Io(io::Error),
}

impl std::fmt::Display for HeadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadError::Closed => write!(f, "connection closed before request"),
            HeadError::TimedOut => write!(f, "timed out waiting for request head"),
            HeadError::TooLarge => write!(f, "request head exceeds {} bytes", MAX_HEAD_BYTES),
            HeadError::Io(e) => write!(f, "read error: {}", e),
        }
    }
}

impl std::error::Error for HeadError {}

/// Stream al que se le puede acotar la próxima lectura.
///
/// Los streams en memoria no bloquean, así que la implementación por
/// defecto no hace nada.
pub trait TimedRead: Read {
    fn limit_next_read(&mut self, remaining: Duration) -> io::Result<()> {
        let _ = remaining;
        Ok(())
    }
}

impl TimedRead for TcpStream {
    fn limit_next_read(&mut self, remaining: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(remaining))
    }
}

/// Lee del stream hasta encontrar el fin del head (`\r\n\r\n` o `\n\n`).
///
/// `deadline` vale para el head completo: antes de cada lectura se
/// reajusta el timeout del socket a lo que queda, así un cliente que manda
/// un byte a la vez no puede estirarlo. `WouldBlock`/`TimedOut` se traducen
/// a `HeadError::TimedOut`. Si el cliente cierra a mitad de head se
/// devuelve lo recibido para intentar parsearlo.
pub fn read_head<R: TimedRead>(
    reader: &mut R,
    limit: usize,
    deadline: Instant,
) -> Result<Vec<u8>, HeadError> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HeadError::TimedOut);
        }
        reader.limit_next_read(remaining).map_err(HeadError::Io)?;

        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                return Err(HeadError::TimedOut)
            }
            Err(e) => return Err(HeadError::Io(e)),
        };

        if n == 0 {
            return if buffer.is_empty() {
                Err(HeadError::Closed)
            } else {
                Ok(buffer)
            };
        }

        // Buscar el terminador solo en la zona nueva (más 3 bytes de solape)
        let search_from = buffer.len().saturating_sub(3);
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&buffer[search_from..]) {
            buffer.truncate(search_from + end);
            return Ok(buffer);
        }

        if buffer.len() > limit {
            return Err(HeadError::TooLarge);
        }
    }
}

/// Posición justo después del terminador del head, si está presente
fn find_head_end(bytes: &[u8]) -> Option<usize> {
    for i in 0..bytes.len() {
        if bytes[i..].starts_with(b"\r\n\r\n") {
            return Some(i + 4);
        }
        if bytes[i..].starts_with(b"\n\n") {
            return Some(i + 2);
        }
    }
    None
}

impl Request {
    /// Parsea el head de un request
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use static_server::http::{Method, Request};
    ///
    /// let raw = b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.method(), &Method::GET);
    /// assert_eq!(request.raw_target(), "/index.html");
    /// assert_eq!(request.host(), Some("localhost"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let head = std::str::from_utf8(buffer).map_err(|_| ParseError::InvalidEncoding)?;

        if head.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        // `lines()` acepta tanto \r\n como \n
        let mut lines = head.lines();
        let request_line = lines.next().ok_or(ParseError::EmptyRequest)?;

        let (method, raw_target, version) = Self::parse_request_line(request_line)?;
        let headers = Self::parse_headers(lines)?;

        Ok(Request {
            method,
            raw_target,
            version,
            headers,
        })
    }

    /// Formato estricto: `METHOD SP TARGET SP VERSION`
    ///
    /// Se separa por un espacio exacto (no `split_whitespace`) para que un
    /// target vacío ("GET  HTTP/1.1") llegue al resolver y termine en 400.
    fn parse_request_line(line: &str) -> Result<(Method, String, String), ParseError> {
        // Un CR suelto u otro byte de control terminaría tal cual en el log
        if line.chars().any(char::is_control) {
            return Err(ParseError::InvalidRequestLine);
        }

        let parts: Vec<&str> = line.split(' ').collect();

        if parts.len() != 3 || parts[0].is_empty() {
            return Err(ParseError::InvalidRequestLine);
        }

        if !parts[0].bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ParseError::InvalidRequestLine);
        }

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((Method::from_token(parts[0]), parts[1].to_string(), version))
    }

    /// Cada header tiene formato "Name: Value"
    fn parse_headers<'a>(
        lines: impl Iterator<Item = &'a str>,
    ) -> Result<HashMap<String, String>, ParseError> {
        let mut headers = HashMap::new();

        for line in lines {
            if line.trim().is_empty() {
                break;
            }

            match line.split_once(':') {
                Some((name, value)) => {
                    headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                }
                None => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        Ok(headers)
    }

    // === Accesores ===

    /// Método HTTP del request
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target sin procesar
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    /// Versión HTTP
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Busca un header sin distinguir mayúsculas
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// Header `Host`, el único que el servidor reconoce
    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }
}
