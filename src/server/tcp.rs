//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Accept loop en el thread de control. Cada conexión aceptada es un
//! trabajo para el `WorkerPool`; el loop nunca atiende requests.
//!
//! El listener es no bloqueante y se consulta cada `POLL_INTERVAL` contra
//! el flag de shutdown, que levantan SIGINT/SIGTERM o un `ShutdownHandle`.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::logging::LogSink;
use crate::metrics::MetricsCollector;
use crate::server::connection::ConnectionHandler;
use crate::server::pool::{PoolError, ShutdownReport, WorkerPool};

/// Cada cuánto se revisa el flag de shutdown cuando no hay conexiones
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Prefijo del nombre de los threads del pool
const WORKER_PREFIX: &str = "http-worker";

/// Errores fatales del servidor
#[derive(Debug)]
pub enum ServerError {
    /// No se pudo hacer bind (puerto ocupado, permisos)
    Bind { address: String, source: io::Error },

    /// No se pudo configurar el listener
    Listener(io::Error),

    /// No se pudieron crear los workers
    Pool(PoolError),

    /// No se pudieron registrar los handlers de señales
    Signal(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind { address, source } => {
                write!(f, "cannot bind {}: {}", address, source)
            }
            ServerError::Listener(e) => write!(f, "listener error: {}", e),
            ServerError::Pool(e) => write!(f, "{}", e),
            ServerError::Signal(e) => write!(f, "cannot install signal handlers: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Listener(e) | ServerError::Signal(e) => Some(e),
            ServerError::Pool(e) => Some(e),
        }
    }
}

/// Pide el shutdown desde otro thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Servidor de archivos estáticos
pub struct Server {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    pool: WorkerPool,
    handler: ConnectionHandler,
    sink: LogSink,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Hace bind y luego crea los workers. Si el bind falla no se crea
    /// ningún worker. Al volver, el listener ya acepta conexiones.
    pub fn bind(config: ServerConfig, sink: LogSink) -> Result<Self, ServerError> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .map_err(|source| ServerError::Bind { address, source })?;
        listener.set_nonblocking(true).map_err(ServerError::Listener)?;

        let pool = WorkerPool::new(config.worker_count, WORKER_PREFIX).map_err(ServerError::Pool)?;

        let local = listener.local_addr().map_err(ServerError::Listener)?;
        sink.info(format!("Server listening on http://{}", local));
        for line in config.summary() {
            sink.info(line);
        }

        let config = Arc::new(config);
        let handler = ConnectionHandler::new(Arc::clone(&config), sink.clone(), MetricsCollector::new())
            .with_pool_monitor(pool.monitor());

        Ok(Self {
            config,
            listener,
            pool,
            handler,
            sink,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Dirección real (útil con puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// SIGINT y SIGTERM levantan el flag de shutdown
    pub fn install_signal_handlers(&self) -> Result<(), ServerError> {
        use signal_hook::consts::{SIGINT, SIGTERM};

        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.shutdown))
                .map_err(ServerError::Signal)?;
        }
        Ok(())
    }

    /// Acepta conexiones hasta que se pida el shutdown. Después espera a
    /// los workers (como máximo `idle_timeout`) y recién entonces suelta
    /// el listener.
    pub fn run(mut self) -> Result<ShutdownReport, ServerError> {
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Las conexiones aceptadas pueden heredar el modo no bloqueante
                    if let Err(e) = stream.set_nonblocking(false) {
                        self.sink
                            .warning(format!("dropping connection from {}: {}", peer, e));
                        continue;
                    }

                    let handler = self.handler.clone();
                    if let Err(e) = self.pool.execute(move || handler.handle(stream)) {
                        self.sink.error(format!("cannot dispatch connection: {}", e));
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.sink.error(format!("accept failed: {}", e));
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        self.sink.info(format!(
            "Shutting down: waiting up to {}s for {} active / {} queued connections",
            self.config.idle_timeout.as_secs(),
            self.pool.active(),
            self.pool.queued()
        ));

        let report = self.pool.shutdown(self.config.idle_timeout);
        if report.dropped > 0 || report.stragglers > 0 {
            self.sink.warning(format!(
                "Shutdown grace expired: dropped {} queued, {} workers still busy",
                report.dropped, report.stragglers
            ));
        }

        drop(self.listener);
        self.sink.info(format!(
            "Server stopped (drained {} connections after shutdown request)",
            report.drained
        ));
        Ok(report)
    }
}
