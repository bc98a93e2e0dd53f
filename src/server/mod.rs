//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! - `pool`: workers de tamaño fijo con cola FIFO
//! - `connection`: atiende una conexión completa (request → response → log)
//! - `fault`: simulación opcional de fallos 500/503
//! - `tcp`: accept loop y shutdown ordenado

pub mod connection;
pub mod fault;
pub mod pool;
pub mod tcp;

// Re-exportar para facilitar el uso
pub use connection::ConnectionHandler;
pub use fault::FailureInjector;
pub use pool::{PoolError, PoolGauges, PoolMonitor, ShutdownReport, WorkerPool};
pub use tcp::{Server, ServerError, ShutdownHandle};
