//! # Registros de log
//! src/logging/record.rs
//!
//! Formato de línea:
//!
//! ```text
//! 2025-03-01 10:15:42 - [http-worker-3] - INFO - GET /index.html -> 200 client=127.0.0.1:50412 method=GET path=/index.html status=200 duration_ms=0.412 bytes=12
//! ```

use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::thread;

/// Nivel de severidad
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campos estructurados de una conexión atendida
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFields {
    pub client_address: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub duration_ms: Option<f64>,
    pub bytes_sent: Option<u64>,
}

impl RequestFields {
    fn is_empty(&self) -> bool {
        *self == RequestFields::default()
    }
}

/// Un registro. Al pasarlo a `LogSink::submit` la propiedad pasa al sink.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub worker: String,
    pub level: Level,
    pub message: String,
    pub fields: Option<RequestFields>,
}

impl LogRecord {
    /// Registro con timestamp actual y el nombre del thread que lo crea
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            worker: current_worker(),
            level,
            message: message.into(),
            fields: None,
        }
    }

    pub fn with_fields(mut self, fields: RequestFields) -> Self {
        self.fields = Some(fields);
        self
    }

    /// `TIMESTAMP - [WORKER] - LEVEL - MESSAGE` + ` key=value` por campo
    pub fn format_line(&self) -> String {
        let mut line = format!(
            "{} - [{}] - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.worker,
            self.level,
            self.message
        );

        if let Some(fields) = self.fields.as_ref().filter(|f| !f.is_empty()) {
            // write! sobre String no falla
            if let Some(client) = &fields.client_address {
                let _ = write!(line, " client={}", client);
            }
            if let Some(method) = &fields.method {
                let _ = write!(line, " method={}", method);
            }
            if let Some(path) = &fields.path {
                let _ = write!(line, " path={}", path);
            }
            if let Some(status) = fields.status {
                let _ = write!(line, " status={}", status);
            }
            if let Some(duration) = fields.duration_ms {
                let _ = write!(line, " duration_ms={:.3}", duration);
            }
            if let Some(bytes) = fields.bytes_sent {
                let _ = write!(line, " bytes={}", bytes);
            }
        }

        line
    }
}

/// Nombre del thread actual, o su id si no tiene nombre
fn current_worker() -> String {
    let current = thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_without_fields() {
        let record = LogRecord::new(Level::Warning, "slow client");
        let line = record.format_line();

        assert!(line.ends_with(" - WARNING - slow client"));
        assert!(line.contains(&format!("[{}]", record.worker)));
        // "YYYY-MM-DD HH:MM:SS" = 19 caracteres
        assert_eq!(&line[19..22], " - ");
    }

    #[test]
    fn test_format_with_fields() {
        let record = LogRecord::new(Level::Info, "GET /a -> 200").with_fields(RequestFields {
            client_address: Some("127.0.0.1:9".to_string()),
            method: Some("GET".to_string()),
            path: Some("/a".to_string()),
            status: Some(200),
            duration_ms: Some(1.5),
            bytes_sent: Some(12),
        });

        assert!(record.format_line().ends_with(
            "INFO - GET /a -> 200 client=127.0.0.1:9 method=GET path=/a status=200 duration_ms=1.500 bytes=12"
        ));
    }

    #[test]
    fn test_worker_is_thread_name() {
        let record = thread::Builder::new()
            .name("http-worker-7".to_string())
            .spawn(|| LogRecord::new(Level::Debug, "x"))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(record.worker, "http-worker-7");
    }

    #[test]
    fn test_empty_fields_are_not_printed() {
        let line = LogRecord::new(Level::Error, "boom")
            .with_fields(RequestFields::default())
            .format_line();
        assert!(line.ends_with("ERROR - boom"));
    }
}
