//! # Manejo de Conexiones
//! src/server/connection.rs
//!
//! Atiende una conexión de principio a fin dentro de un worker:
//!
//! 1. Lee el head con idle timeout (si vence: se cierra sin responder)
//! 2. Parsea; request line inválida → 400, método distinto de GET/HEAD → 405
//! 3. Simulación de fallos (si está configurada)
//! 4. `/api/logs` y `/api/stats` (si `expose_api`)
//! 5. Resuelve el path → 400 / 403 / 404 o archivo seguro
//! 6. Abre el archivo y transmite el body en bloques de `chunk_size`
//! 7. Un único `LogRecord` por conexión
//!
//! Nada sale de `handle`: un panic dentro del procesamiento se convierte en
//! 500 si todavía no se escribió ningún byte, o en un cierre si ya se
//! escribió algo. El archivo y el socket se liberan al salir de scope en
//! cualquier camino.

use chrono::Local;
use serde_json::json;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::files::{mime, resolver, PathResolver, Rejection, ResolvedTarget};
use crate::http::{
    read_head, HeadError, Method, Request, Response, StatusCode, TimedRead, MAX_HEAD_BYTES,
};
use crate::logging::{Level, LogRecord, LogSink, RequestFields};
use crate::metrics::MetricsCollector;
use crate::server::fault::FailureInjector;
use crate::server::pool::PoolMonitor;

/// Valor del header `Server`
pub const SERVER_NAME: &str = "static-server";

/// Handler compartido por todos los workers (solo lectura salvo sink y
/// métricas, que sincronizan por dentro)
#[derive(Clone)]
pub struct ConnectionHandler {
    config: Arc<ServerConfig>,
    resolver: PathResolver,
    sink: LogSink,
    metrics: MetricsCollector,
    faults: Option<FailureInjector>,
    pool: Option<PoolMonitor>,
}

/// Lo que se sabe de la conexión al terminar; alimenta el log y las métricas
#[derive(Debug, Default)]
struct Exchange {
    method: Option<String>,
    target: Option<String>,
    status: Option<StatusCode>,
    bytes_sent: u64,
    /// Path servido o motivo del rechazo
    note: Option<String>,
    /// Error de transporte o interno
    error: Option<String>,
    panicked: bool,
}

impl Exchange {
    fn level(&self) -> Level {
        if self.panicked {
            return Level::Error;
        }
        match self.status {
            None => Level::Warning,
            Some(_) if self.error.is_some() => Level::Warning,
            Some(status) if status.is_server_error() => Level::Error,
            Some(status) if status.is_client_error() => Level::Warning,
            Some(_) => Level::Info,
        }
    }

    fn message(&self) -> String {
        let mut message = match (&self.method, &self.target, self.status) {
            (Some(method), Some(target), Some(status)) => {
                format!("{} {} -> {}", method, target, status)
            }
            (_, _, Some(status)) => format!("-> {}", status),
            _ => "connection closed without response".to_string(),
        };
        if let Some(note) = &self.note {
            message.push_str(" (");
            message.push_str(note);
            message.push(')');
        }
        if let Some(error) = &self.error {
            message.push_str(": ");
            message.push_str(error);
        }
        message
    }
}

/// Cuenta los bytes escritos para saber si todavía se puede mandar un 500
struct CountingStream<'a, S> {
    inner: &'a mut S,
    written: u64,
}

impl<S: Read> Read for CountingStream<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: TimedRead> TimedRead for CountingStream<'_, S> {
    fn limit_next_read(&mut self, remaining: Duration) -> io::Result<()> {
        self.inner.limit_next_read(remaining)
    }
}

impl<S: Write> Write for CountingStream<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ConnectionHandler {
    pub fn new(config: Arc<ServerConfig>, sink: LogSink, metrics: MetricsCollector) -> Self {
        let resolver = PathResolver::new(config.root_directory.clone(), config.index_file.clone());
        let faults = config
            .failure_simulation
            .as_ref()
            .map(FailureInjector::from_config);

        Self {
            config,
            resolver,
            sink,
            metrics,
            faults,
            pool: None,
        }
    }

    /// Habilita los gauges del pool en `/api/stats`
    pub fn with_pool_monitor(mut self, monitor: PoolMonitor) -> Self {
        self.pool = Some(monitor);
        self
    }

    /// Atiende una conexión TCP y la cierra
    pub fn handle(&self, mut stream: TcpStream) {
        let peer = stream.peer_addr().ok().map(|addr| addr.to_string());

        // El timeout de lectura lo reajusta `read_head` contra el deadline
        // del head; el de escritura acota a un cliente que no lee
        let _ = stream.set_write_timeout(Some(self.config.idle_timeout));

        self.serve(&mut stream, peer);
        // `stream` se cierra al salir
    }

    /// Procesa un request sobre cualquier stream bidireccional. El head
    /// completo tiene que llegar dentro de `idle_timeout` desde aquí.
    pub fn serve<S: TimedRead + Write>(&self, stream: &mut S, peer: Option<String>) {
        let started = Instant::now();
        let mut exchange = Exchange::default();
        let mut counting = CountingStream {
            inner: stream,
            written: 0,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.process(&mut counting, &mut exchange, started + self.config.idle_timeout)
        }));

        if outcome.is_err() {
            exchange.panicked = true;
            if counting.written == 0 {
                exchange.error = Some("internal error".to_string());
                let response =
                    Response::error(StatusCode::InternalServerError, "Internal server error");
                self.respond(&mut counting, &mut exchange, response, true);
            } else {
                exchange.error = Some("internal error after partial response".to_string());
            }
        }

        self.finish(exchange, peer, started);
    }

    fn process<S: TimedRead + Write>(
        &self,
        stream: &mut CountingStream<'_, S>,
        ex: &mut Exchange,
        head_deadline: Instant,
    ) {
        let head = match read_head(stream, MAX_HEAD_BYTES, head_deadline) {
            Ok(head) => head,
            Err(HeadError::TooLarge) => {
                let response = Response::error(StatusCode::BadRequest, "Request head too large");
                self.respond(stream, ex, response, true);
                return;
            }
            Err(e) => {
                ex.error = Some(e.to_string());
                return;
            }
        };

        let request = match Request::parse(&head) {
            Ok(request) => request,
            Err(e) => {
                let response = Response::error(StatusCode::BadRequest, &e.to_string());
                self.respond(stream, ex, response, true);
                return;
            }
        };

        ex.method = Some(request.method().as_str().to_string());
        ex.target = Some(request.raw_target().to_string());

        if !request.method().is_supported() {
            let response = Response::error(StatusCode::MethodNotAllowed, "Method not allowed")
                .with_header("Allow", "GET, HEAD");
            self.respond(stream, ex, response, true);
            return;
        }

        let include_body = *request.method() == Method::GET;

        if let Some(status) = self.faults.as_ref().and_then(FailureInjector::roll) {
            ex.note = Some("simulated failure".to_string());
            let response = Response::error(status, "Simulated failure");
            self.respond(stream, ex, response, include_body);
            return;
        }

        if self.config.expose_api {
            if let Some(response) = self.api_response(&request) {
                self.respond(stream, ex, response, include_body);
                return;
            }
        }

        let response = self.file_response(request.raw_target(), ex);
        self.respond(stream, ex, response, include_body);
    }

    /// Agrega headers comunes, escribe y anota el resultado
    fn respond<W: Write>(
        &self,
        stream: &mut W,
        ex: &mut Exchange,
        response: Response,
        include_body: bool,
    ) {
        let response = response
            .with_header("Server", SERVER_NAME)
            .with_header("Connection", "close");
        ex.status = Some(response.status());

        match response.write_to(stream, self.config.chunk_size, include_body) {
            Ok(sent) => ex.bytes_sent = sent,
            Err(e) => {
                ex.bytes_sent = e.body_bytes;
                ex.error = Some(format!("write aborted: {}", e.source));
            }
        }
    }

    fn file_response(&self, raw_target: &str, ex: &mut Exchange) -> Response {
        match self.resolver.resolve(raw_target) {
            ResolvedTarget::Safe(path) => {
                ex.note = Some(path.display().to_string());
                self.open_file(&path, StatusCode::Ok)
                    .unwrap_or_else(|rejection| self.rejection_response(rejection, ex))
            }
            ResolvedTarget::Rejected(rejection) => self.rejection_response(rejection, ex),
        }
    }

    /// Abre el archivo resuelto. `Content-Length` sale del archivo ya
    /// abierto, no del chequeo previo.
    fn open_file(&self, path: &Path, status: StatusCode) -> Result<Response, Rejection> {
        let file = File::open(path).map_err(|e| resolver::rejection_for(&e))?;
        let metadata = file.metadata().map_err(|e| resolver::rejection_for(&e))?;
        if !metadata.is_file() {
            return Err(Rejection::Forbidden);
        }

        Ok(Response::new(status)
            .with_header("Content-Type", &mime::for_path(path))
            .with_file(file, metadata.len()))
    }

    fn rejection_response(&self, rejection: Rejection, ex: &mut Exchange) -> Response {
        ex.note = Some(rejection.to_string());

        match rejection {
            Rejection::BadRequest => {
                Response::error(StatusCode::BadRequest, "Malformed request target")
            }
            Rejection::Forbidden => Response::error(
                StatusCode::Forbidden,
                "Access to the requested resource is forbidden",
            ),
            Rejection::NotFound => self.not_found_page().unwrap_or_else(|| {
                Response::error(StatusCode::NotFound, "The requested resource was not found")
            }),
        }
    }

    /// `404.html` del root, si está configurado y existe
    fn not_found_page(&self) -> Option<Response> {
        let page = self.config.not_found_page.as_deref()?;
        match self.resolver.resolve_relative(page) {
            ResolvedTarget::Safe(path) => self.open_file(&path, StatusCode::NotFound).ok(),
            ResolvedTarget::Rejected(_) => None,
        }
    }

    fn api_response(&self, request: &Request) -> Option<Response> {
        let target = request.raw_target();
        let path = target.split(['?', '#']).next().unwrap_or(target);

        let body = match path {
            "/api/logs" => json!({
                "timestamp": Local::now().to_rfc3339(),
                "logs": self.sink.recent_lines(),
            }),
            "/api/stats" => json!({
                "timestamp": Local::now().to_rfc3339(),
                "metrics": self.metrics.snapshot(),
                "pool": self.pool.as_ref().map(PoolMonitor::gauges),
                "logs_submitted": self.sink.submitted(),
            }),
            _ => return None,
        };

        let response = match serde_json::to_string_pretty(&body) {
            Ok(text) => Response::json(&text),
            Err(e) => Response::error(StatusCode::InternalServerError, &e.to_string()),
        };
        Some(response)
    }

    fn finish(&self, ex: Exchange, peer: Option<String>, started: Instant) {
        let elapsed = started.elapsed();

        match ex.status {
            Some(status) => self
                .metrics
                .record_request(status.as_u16(), elapsed, ex.bytes_sent),
            None => self.metrics.record_failure(elapsed),
        }

        let fields = RequestFields {
            client_address: peer,
            method: ex.method.clone(),
            path: ex.target.clone(),
            status: ex.status.map(|s| s.as_u16()),
            duration_ms: Some(elapsed.as_secs_f64() * 1000.0),
            bytes_sent: Some(ex.bytes_sent),
        };

        self.sink
            .submit(LogRecord::new(ex.level(), ex.message()).with_fields(fields));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Stream en memoria: lee de `input`, escribe en `output`
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockStream {
        fn new(request: &str) -> Self {
            Self {
                input: Cursor::new(request.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }

        fn response(&self) -> String {
            String::from_utf8_lossy(&self.output).to_string()
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl TimedRead for MockStream {}

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Lectura que vence como un socket con timeout
    struct SilentStream {
        output: Vec<u8>,
    }

    impl Read for SilentStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"))
        }
    }

    impl TimedRead for SilentStream {}

    impl Write for SilentStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Acepta `writes_left` llamadas a `write` y luego corta la conexión
    struct DisconnectingStream {
        input: Cursor<Vec<u8>>,
        writes_left: usize,
    }

    impl Read for DisconnectingStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl TimedRead for DisconnectingStream {}

    impl Write for DisconnectingStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes_left == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
            }
            self.writes_left -= 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Hace panic al leer
    struct PanickingStream {
        output: Vec<u8>,
    }

    impl Read for PanickingStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("unexpected failure");
        }
    }

    impl TimedRead for PanickingStream {}

    impl Write for PanickingStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        _tmp: TempDir,
        handler: ConnectionHandler,
        sink: LogSink,
    }

    fn fixture_with(configure: impl FnOnce(&mut Config)) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("public");
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::write(root.join("index.html"), "<h1>Hi</h1>\n").unwrap();
        fs::write(root.join("assets/style.css"), "p{}\n").unwrap();
        fs::write(root.join("empty.txt"), "").unwrap();
        fs::write(tmp.path().join("config.json"), "{\"secret\":1}").unwrap();

        let mut config = Config::default();
        config.public_dir = root;
        config.chunk_size = 4;
        configure(&mut config);

        let config = Arc::new(config.resolve().unwrap());
        let sink = LogSink::in_memory(100);
        let handler = ConnectionHandler::new(config, sink.clone(), MetricsCollector::new());

        Fixture {
            _tmp: tmp,
            handler,
            sink,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    fn send(fixture: &Fixture, request: &str) -> String {
        let mut stream = MockStream::new(request);
        fixture
            .handler
            .serve(&mut stream, Some("127.0.0.1:5555".to_string()));
        stream.response()
    }

    fn body_of(response: &str) -> &str {
        response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
    }

    #[test]
    fn test_get_file() {
        let fixture = fixture();
        let response = send(&fixture, "GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(response.contains("Content-Length: 12\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.contains("Server: static-server\r\n"));
        assert_eq!(body_of(&response), "<h1>Hi</h1>\n");
    }

    #[test]
    fn test_nested_css() {
        let fixture = fixture();
        let response = send(&fixture, "GET /assets/style.css HTTP/1.1\r\n\r\n");

        assert!(response.contains("Content-Type: text/css; charset=utf-8\r\n"));
        assert!(response.contains("Content-Length: 4\r\n"));
        assert_eq!(body_of(&response), "p{}\n");
    }

    #[test]
    fn test_head_has_same_headers_and_no_body() {
        let fixture = fixture();
        let get = send(&fixture, "GET /index.html HTTP/1.1\r\n\r\n");
        let head = send(&fixture, "HEAD /index.html HTTP/1.1\r\n\r\n");

        let get_head = get.split_once("\r\n\r\n").unwrap().0;
        assert_eq!(head, format!("{}\r\n\r\n", get_head));
    }

    #[test]
    fn test_root_serves_index() {
        let fixture = fixture();
        let response = send(&fixture, "GET / HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body_of(&response), "<h1>Hi</h1>\n");
    }

    #[test]
    fn test_empty_file() {
        let fixture = fixture();
        let response = send(&fixture, "GET /empty.txt HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Content-Length: 0\r\n"));
        assert_eq!(body_of(&response), "");
    }

    #[test]
    fn test_missing_file_404() {
        let fixture = fixture();
        let response = send(&fixture, "GET /missing.html HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    }

    #[test]
    fn test_custom_404_page() {
        let fixture = fixture();
        fs::write(fixture.handler.resolver.root().join("404.html"), "gone").unwrap();

        let response = send(&fixture, "GET /missing.html HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert!(response.contains("Content-Length: 4\r\n"));
        assert_eq!(body_of(&response), "gone");
    }

    #[test]
    fn test_traversal_never_200() {
        let fixture = fixture();
        for target in [
            "/../config.json",
            "/..%2fconfig.json",
            "/%2e%2e/config.json",
            "/%252e%252e%252fconfig.json",
        ] {
            let response = send(&fixture, &format!("GET {} HTTP/1.1\r\n\r\n", target));
            assert!(
                response.starts_with("HTTP/1.1 403") || response.starts_with("HTTP/1.1 404"),
                "{} -> {}",
                target,
                response.lines().next().unwrap_or("")
            );
            assert!(!response.contains("secret"));
        }
    }

    #[test]
    fn test_directory_forbidden() {
        let fixture = fixture();
        let response = send(&fixture, "GET /assets HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 403 Forbidden"));
    }

    #[test]
    fn test_post_405() {
        let fixture = fixture();
        let response = send(&fixture, "POST /index.html HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed"));
        assert!(response.contains("Allow: GET, HEAD\r\n"));
    }

    #[test]
    fn test_malformed_400() {
        let fixture = fixture();
        for request in ["GARBAGE\r\n\r\n", "GET /index.html\r\n\r\n", "GET  HTTP/1.1\r\n\r\n"] {
            let response = send(&fixture, request);
            assert!(response.starts_with("HTTP/1.1 400 Bad Request"), "{:?}", request);
        }
    }

    #[test]
    fn test_control_bytes_never_reach_the_log() {
        let fixture = fixture();
        let response = send(&fixture, "GET /a\rb HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));

        let record = fixture.sink.recent().pop().unwrap();
        assert_eq!(record.fields.as_ref().unwrap().path, None);
        assert!(!record.format_line().contains('\r'));
    }

    #[test]
    fn test_target_without_slash_400() {
        let fixture = fixture();
        let response = send(&fixture, "GET index.html HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[test]
    fn test_head_too_large_400() {
        let fixture = fixture();
        let request = format!(
            "GET /index.html HTTP/1.1\r\nX-Filler: {}\r\n\r\n",
            "a".repeat(MAX_HEAD_BYTES)
        );
        let response = send(&fixture, &request);
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[test]
    fn test_timeout_closes_silently() {
        let fixture = fixture();
        let before = fixture.sink.submitted();

        let mut stream = SilentStream { output: Vec::new() };
        fixture.handler.serve(&mut stream, None);

        assert!(stream.output.is_empty());
        assert_eq!(fixture.sink.submitted(), before + 1);

        let record = fixture.sink.recent().pop().unwrap();
        assert_eq!(record.level, Level::Warning);
        assert!(record.message.contains("timed out"));
        assert_eq!(record.fields.unwrap().status, None);
    }

    #[test]
    fn test_client_disconnect_mid_stream() {
        let fixture = fixture();
        let mut stream = DisconnectingStream {
            input: Cursor::new(b"GET /index.html HTTP/1.1\r\n\r\n".to_vec()),
            // Head completo + un bloque de 4 bytes
            writes_left: 2,
        };
        fixture.handler.serve(&mut stream, None);

        let record = fixture.sink.recent().pop().unwrap();
        assert!(record.message.contains("write aborted"));
        let fields = record.fields.unwrap();
        assert_eq!(fields.status, Some(200));
        assert_eq!(fields.bytes_sent, Some(4));
    }

    #[test]
    fn test_panic_becomes_500() {
        let fixture = fixture();
        let mut stream = PanickingStream { output: Vec::new() };
        fixture.handler.serve(&mut stream, None);

        let response = String::from_utf8_lossy(&stream.output).to_string();
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"));

        let record = fixture.sink.recent().pop().unwrap();
        assert_eq!(record.level, Level::Error);
    }

    #[test]
    fn test_one_record_per_connection() {
        let fixture = fixture();
        let before = fixture.sink.submitted();

        send(&fixture, "GET /index.html HTTP/1.1\r\n\r\n");
        send(&fixture, "HEAD /missing HTTP/1.1\r\n\r\n");
        send(&fixture, "POST / HTTP/1.1\r\n\r\n");
        send(&fixture, "nonsense\r\n\r\n");

        assert_eq!(fixture.sink.submitted(), before + 4);

        let records = fixture.sink.recent();
        let statuses: Vec<Option<u16>> = records[records.len() - 4..]
            .iter()
            .map(|r| r.fields.as_ref().and_then(|f| f.status))
            .collect();
        assert_eq!(statuses, vec![Some(200), Some(404), Some(405), Some(400)]);
    }

    #[test]
    fn test_record_fields() {
        let fixture = fixture();
        send(&fixture, "GET /index.html HTTP/1.1\r\n\r\n");

        let record = fixture.sink.recent().pop().unwrap();
        assert_eq!(record.level, Level::Info);
        let fields = record.fields.unwrap();
        assert_eq!(fields.client_address.as_deref(), Some("127.0.0.1:5555"));
        assert_eq!(fields.method.as_deref(), Some("GET"));
        assert_eq!(fields.path.as_deref(), Some("/index.html"));
        assert_eq!(fields.bytes_sent, Some(12));
        assert!(record.message.contains("index.html"));
    }

    #[test]
    fn test_api_hidden_by_default() {
        let fixture = fixture();
        let response = send(&fixture, "GET /api/logs HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_api_logs() {
        let fixture = fixture_with(|c| c.expose_api = true);
        send(&fixture, "GET /index.html HTTP/1.1\r\n\r\n");

        let response = send(&fixture, "GET /api/logs HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Content-Type: application/json"));

        let json: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
        let logs = json["logs"].as_array().unwrap();
        assert!(logs.iter().any(|l| l.as_str().unwrap().contains("Logger initialized")));
        assert!(logs.iter().any(|l| l.as_str().unwrap().contains("/index.html")));
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_api_stats() {
        let fixture = fixture_with(|c| c.expose_api = true);
        send(&fixture, "GET /index.html HTTP/1.1\r\n\r\n");
        send(&fixture, "GET /missing HTTP/1.1\r\n\r\n");

        let response = send(&fixture, "GET /api/stats?x=1 HTTP/1.1\r\n\r\n");
        let json: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
        assert_eq!(json["metrics"]["total_requests"], 2);
        assert_eq!(json["metrics"]["status_codes"]["404"], 1);
        assert!(json["pool"].is_null());
    }

    #[test]
    fn test_simulated_failure() {
        let fixture = fixture_with(|c| {
            c.failure_simulation = Some(crate::config::FailureSimulation {
                rate: 1.0,
                statuses: vec![503],
            })
        });

        let response = send(&fixture, "GET /index.html HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 503 Service Unavailable"));

        let record = fixture.sink.recent().pop().unwrap();
        assert_eq!(record.level, Level::Error);
        assert!(record.message.contains("simulated failure"));
    }

    #[test]
    fn test_simulation_skips_malformed_requests() {
        let fixture = fixture_with(|c| {
            c.failure_simulation = Some(crate::config::FailureSimulation {
                rate: 1.0,
                statuses: vec![500],
            })
        });

        let response = send(&fixture, "POST / HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 405"));
    }

    #[test]
    fn test_chunked_streaming_matches_file() {
        let fixture = fixture();
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(fixture.handler.resolver.root().join("data.bin"), &content).unwrap();

        let mut stream = MockStream::new("GET /data.bin HTTP/1.1\r\n\r\n");
        fixture.handler.serve(&mut stream, None);

        let split = stream
            .output
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap();
        assert_eq!(&stream.output[split + 4..], &content[..]);

        let head = String::from_utf8_lossy(&stream.output[..split]).to_string();
        assert!(head.contains("Content-Type: application/octet-stream"));
        assert!(head.contains("Content-Length: 10000"));
    }
}
