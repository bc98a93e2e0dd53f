//! # Static Server
//! src/lib.rs
//!
//! Servidor HTTP/1.1 de archivos estáticos con un pool fijo de workers.
//!
//! ## Arquitectura
//!
//! - `config`: CLI, variables de entorno y config.json
//! - `http`: parsing del head, responses y códigos de estado
//! - `files`: resolución segura de paths y tipos MIME
//! - `logging`: registros y sink thread-safe con ring buffer
//! - `server`: pool de workers, manejo de conexiones y accept loop
//! - `metrics`: contadores y percentiles de latencia
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use static_server::config::Config;
//! use static_server::logging::{LogSink, SinkOptions};
//! use static_server::server::Server;
//!
//! let config = Config::default().resolve().unwrap();
//! let sink = LogSink::new(SinkOptions::default());
//! let server = Server::bind(config, sink).unwrap();
//! server.run().unwrap();
//! ```

pub mod config;
pub mod files;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod server;
