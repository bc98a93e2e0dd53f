//! # Configuración del Servidor
//! src/config.rs
//!
//! Tres capas, de menor a mayor prioridad:
//!
//! 1. Valores por defecto
//! 2. Archivo JSON (`--config config.json`)
//! 3. Argumentos CLI / variables de entorno
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./static_server --config config.json --port 8080 --workers 16
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 PUBLIC_DIR=./public ./static_server
//! ```
//!
//! ### config.json
//! ```json
//! {
//!   "host": "0.0.0.0",
//!   "port": 8000,
//!   "max_threads": 10,
//!   "public_dir": "./public",
//!   "log_file": "./logs/server.log",
//!   "timeout": 30,
//!   "chunk_size": 8192
//! }
//! ```

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Argumentos de línea de comandos. Todo es opcional: lo que no se pasa
/// sale del archivo de configuración o de los defaults.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "static_server")]
#[command(about = "Servidor HTTP/1.1 de archivos estáticos con pool de workers")]
#[command(version = "0.1.0")]
pub struct Args {
    /// Archivo de configuración JSON
    #[arg(short, long, env = "SERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host/IP en el que escucha
    #[arg(long, env = "HTTP_HOST")]
    pub host: Option<String>,

    /// Puerto en el que escucha
    #[arg(short, long, env = "HTTP_PORT")]
    pub port: Option<u16>,

    /// Número de workers
    #[arg(short = 'w', long = "workers", env = "MAX_THREADS")]
    pub max_threads: Option<usize>,

    /// Directorio raíz de los archivos servidos
    #[arg(short = 'r', long = "root", env = "PUBLIC_DIR")]
    pub public_dir: Option<PathBuf>,

    /// Archivo de log
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Idle timeout por conexión, en segundos
    #[arg(long, env = "TIMEOUT")]
    pub timeout: Option<u64>,

    /// Tamaño de bloque al transmitir archivos, en bytes
    #[arg(long, env = "CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Fracción de requests que reciben un error simulado (0.0 - 1.0)
    #[arg(long, env = "FAILURE_RATE")]
    pub failure_rate: Option<f64>,

    /// Habilita /api/logs y /api/stats
    #[arg(long)]
    pub expose_api: bool,

    /// No copiar los logs a stderr
    #[arg(short, long)]
    pub quiet: bool,
}

/// Simulación de fallos: con probabilidad `rate` se contesta con uno de
/// `statuses` en vez de servir el archivo
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailureSimulation {
    pub rate: f64,

    #[serde(default = "default_failure_statuses")]
    pub statuses: Vec<u16>,
}

fn default_failure_statuses() -> Vec<u16> {
    vec![500, 503]
}

/// Configuración tal como viene del archivo (sin validar)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,

    #[serde(alias = "worker_count")]
    pub max_threads: usize,

    #[serde(alias = "root_directory")]
    pub public_dir: PathBuf,

    pub log_file: PathBuf,

    #[serde(alias = "idle_timeout_seconds")]
    pub timeout: u64,

    #[serde(alias = "chunk_size_bytes")]
    pub chunk_size: usize,

    /// Registros retenidos en memoria
    pub log_buffer_size: usize,

    /// Página servida con los 404, relativa al root (`null` la desactiva)
    pub not_found_page: Option<String>,

    /// Archivo servido para `GET /`
    pub index_file: Option<String>,

    pub log_to_console: bool,
    pub expose_api: bool,
    pub failure_simulation: Option<FailureSimulation>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_threads: 10,
            public_dir: PathBuf::from("./public"),
            log_file: PathBuf::from("./logs/server.log"),
            timeout: 30,
            chunk_size: 8192,
            log_buffer_size: 500,
            not_found_page: Some("404.html".to_string()),
            index_file: Some("index.html".to_string()),
            log_to_console: true,
            expose_api: false,
            failure_simulation: None,
        }
    }
}

/// Errores de configuración. Siempre fatales al arrancar.
#[derive(Debug)]
pub enum ConfigError {
    /// No se pudo leer el archivo de configuración
    Io { path: PathBuf, source: io::Error },

    /// JSON inválido
    Parse { path: PathBuf, message: String },

    /// Valor fuera de rango
    Invalid(String),

    /// El directorio raíz no existe o no es un directorio
    RootDirectory { path: PathBuf, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "invalid config {}: {}", path.display(), message)
            }
            ConfigError::Invalid(message) => write!(f, "{}", message),
            ConfigError::RootDirectory { path, reason } => {
                write!(f, "invalid root directory {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Config {
    /// Lee un config.json
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parsea la configuración desde un string JSON
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Defaults → archivo (si se indicó) → argumentos
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    /// Sobrescribe con lo que venga en CLI/env
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(workers) = args.max_threads {
            self.max_threads = workers;
        }
        if let Some(dir) = &args.public_dir {
            self.public_dir = dir.clone();
        }
        if let Some(file) = &args.log_file {
            self.log_file = file.clone();
        }
        if let Some(timeout) = args.timeout {
            self.timeout = timeout;
        }
        if let Some(chunk) = args.chunk_size {
            self.chunk_size = chunk;
        }
        if let Some(rate) = args.failure_rate {
            let statuses = self
                .failure_simulation
                .as_ref()
                .map(|sim| sim.statuses.clone())
                .unwrap_or_else(default_failure_statuses);
            self.failure_simulation = Some(FailureSimulation { rate, statuses });
        }
        if args.expose_api {
            self.expose_api = true;
        }
        if args.quiet {
            self.log_to_console = false;
        }
    }

    /// Valida rangos
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("Port must be 1-65535".to_string()));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid("Worker count must be >= 1".to_string()));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Invalid("Timeout must be > 0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("Chunk size must be > 0".to_string()));
        }
        if self.log_buffer_size == 0 {
            return Err(ConfigError::Invalid("Log buffer size must be >= 1".to_string()));
        }
        if let Some(sim) = &self.failure_simulation {
            if !(0.0..=1.0).contains(&sim.rate) {
                return Err(ConfigError::Invalid("Failure rate must be 0.0-1.0".to_string()));
            }
            if sim.statuses.is_empty() || sim.statuses.iter().any(|s| *s != 500 && *s != 503) {
                return Err(ConfigError::Invalid(
                    "Failure statuses must be 500 and/or 503".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Valida y produce la configuración inmutable del servidor
    pub fn resolve(self) -> Result<ServerConfig, ConfigError> {
        self.validate()?;

        let root_error = |reason: String| ConfigError::RootDirectory {
            path: self.public_dir.clone(),
            reason,
        };
        let root = self
            .public_dir
            .canonicalize()
            .map_err(|e| root_error(e.to_string()))?;
        if !root.is_dir() {
            return Err(root_error("not a directory".to_string()));
        }

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            worker_count: self.max_threads,
            root_directory: root,
            idle_timeout: Duration::from_secs(self.timeout),
            chunk_size: self.chunk_size,
            log_file: self.log_file,
            log_buffer_size: self.log_buffer_size,
            not_found_page: self.not_found_page.filter(|p| !p.is_empty()),
            index_file: self.index_file.filter(|p| !p.is_empty()),
            log_to_console: self.log_to_console,
            expose_api: self.expose_api,
            failure_simulation: self.failure_simulation.filter(|sim| sim.rate > 0.0),
        })
    }
}

/// Configuración validada; no cambia durante la vida del servidor
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub worker_count: usize,

    /// Canónico, existe y es directorio
    pub root_directory: PathBuf,

    pub idle_timeout: Duration,
    pub chunk_size: usize,
    pub log_file: PathBuf,
    pub log_buffer_size: usize,
    pub not_found_page: Option<String>,
    pub index_file: Option<String>,
    pub log_to_console: bool,
    pub expose_api: bool,
    pub failure_simulation: Option<FailureSimulation>,
}

impl ServerConfig {
    /// Dirección para bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resumen de una línea por ajuste, para el log de arranque
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Address: {}", self.address()),
            format!("Public dir: {}", self.root_directory.display()),
            format!("Max threads: {}", self.worker_count),
            format!(
                "Timeout: {}s, chunk size: {} bytes",
                self.idle_timeout.as_secs(),
                self.chunk_size
            ),
        ];
        if self.expose_api {
            lines.push("API: /api/logs, /api/stats enabled".to_string());
        }
        if let Some(sim) = &self.failure_simulation {
            lines.push(format!(
                "Failure simulation: {:.1}% with {:?}",
                sim.rate * 100.0,
                sim.statuses
            ));
        }
        lines
    }
}
