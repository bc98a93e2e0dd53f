//! # Logging
//! src/logging/mod.rs
//!
//! Sink explícito (sin logger global): se crea al arrancar el servidor y
//! cada worker recibe un clon del handle.

pub mod record;
pub mod sink;

pub use record::{Level, LogRecord, RequestFields};
pub use sink::{LogSink, SinkOptions, DEFAULT_CAPACITY};
