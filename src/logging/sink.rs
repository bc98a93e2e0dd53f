//! # Sink de logs thread-safe
//! src/logging/sink.rs
//!
//! Un solo `Mutex` protege el ring buffer y el extremo emisor del canal
//! hacia el thread escritor. `submit` formatea la línea fuera del lock y
//! dentro solo hace push + send, así que el orden del ring y del archivo
//! es el mismo orden de envío.
//!
//! ```text
//! worker ─┐                       ┌─► ring (últimos N registros)
//! worker ─┼─► submit ─► [Mutex] ──┤
//! worker ─┘                       └─► canal ─► writer thread ─► archivo (+ stderr)
//! ```
//!
//! Si el archivo deja de ser escribible, el writer lo abandona en
//! silencio; el ring sigue funcionando. Loguear nunca hace fallar un request.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use super::record::{Level, LogRecord};

/// Registros que se retienen en memoria por defecto
pub const DEFAULT_CAPACITY: usize = 500;

/// Rotación: 10 MiB por archivo
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Rotación: backups `.1` .. `.5`
pub const DEFAULT_BACKUPS: usize = 5;

/// Opciones de construcción del sink
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// Archivo destino; `None` = solo memoria
    pub log_file: Option<PathBuf>,

    /// Tamaño del ring buffer
    pub capacity: usize,

    /// Copiar cada línea a stderr
    pub console: bool,

    pub max_file_bytes: u64,
    pub backups: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            log_file: None,
            capacity: DEFAULT_CAPACITY,
            console: false,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            backups: DEFAULT_BACKUPS,
        }
    }
}

struct State {
    ring: VecDeque<LogRecord>,
    capacity: usize,
    submitted: u64,
    tx: Option<Sender<String>>,
}

struct Inner {
    state: Mutex<State>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

/// Handle clonable al sink. Todos los clones comparten el mismo buffer.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
}

impl LogSink {
    /// Crea el sink y lanza el thread escritor.
    ///
    /// Si el archivo no se puede abrir, el sink queda solo en memoria
    /// (y consola) y deja un WARNING en el ring.
    pub fn new(options: SinkOptions) -> Self {
        let (file, open_error) = match &options.log_file {
            Some(path) => match RotatingFile::open(path, options.max_file_bytes, options.backups) {
                Ok(file) => (Some(file), None),
                Err(e) => (None, Some(format!("cannot open log file {}: {}", path.display(), e))),
            },
            None => (None, None),
        };

        let needs_writer = file.is_some() || options.console;
        let (tx, handle) = if needs_writer {
            let (tx, rx) = mpsc::channel();
            let console = options.console;
            let spawned = thread::Builder::new()
                .name("log-writer".to_string())
                .spawn(move || writer_loop(rx, file, console));
            match spawned {
                Ok(handle) => (Some(tx), Some(handle)),
                Err(_) => (None, None),
            }
        } else {
            (None, None)
        };

        let capacity = options.capacity.max(1);
        let sink = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    ring: VecDeque::with_capacity(capacity),
                    capacity,
                    submitted: 0,
                    tx,
                }),
                writer: Mutex::new(handle),
            }),
        };

        sink.info("Logger initialized");
        if let Some(message) = open_error {
            sink.warning(message);
        }
        sink
    }

    /// Sink solo en memoria (tests, herramientas)
    pub fn in_memory(capacity: usize) -> Self {
        Self::new(SinkOptions {
            capacity,
            ..SinkOptions::default()
        })
    }

    /// Agrega un registro. Dentro del lock: push al ring (desalojando el
    /// más viejo si está lleno) y send al writer.
    pub fn submit(&self, record: LogRecord) {
        let line = record.format_line();
        let mut state = self.lock_state();

        if state.ring.len() >= state.capacity {
            state.ring.pop_front();
        }
        state.ring.push_back(record);
        state.submitted += 1;

        let disconnected = match &state.tx {
            Some(tx) => tx.send(line).is_err(),
            None => false,
        };
        if disconnected {
            state.tx = None;
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.submit(LogRecord::new(Level::Debug, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.submit(LogRecord::new(Level::Info, message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.submit(LogRecord::new(Level::Warning, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.submit(LogRecord::new(Level::Error, message));
    }

    /// Copia de los registros retenidos, del más viejo al más nuevo
    pub fn recent(&self) -> Vec<LogRecord> {
        self.lock_state().ring.iter().cloned().collect()
    }

    /// Igual que `recent` pero ya formateados
    pub fn recent_lines(&self) -> Vec<String> {
        self.recent().iter().map(LogRecord::format_line).collect()
    }

    /// Total de registros enviados desde la creación (incluye desalojados)
    pub fn submitted(&self) -> u64 {
        self.lock_state().submitted
    }

    pub fn capacity(&self) -> usize {
        self.lock_state().capacity
    }

    /// Cierra el canal y espera a que el writer vacíe lo pendiente.
    /// Los `submit` posteriores solo llegan al ring. Idempotente.
    pub fn close(&self) {
        self.inner.close();
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Un panic con el lock tomado no deja el ring inconsistente
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn close(&self) {
        let tx = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.tx.take()
        };
        drop(tx);

        let handle = self.writer.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Loop del thread escritor: escribe en orden y hace flush cuando el
/// canal queda vacío.
fn writer_loop(rx: Receiver<String>, mut file: Option<RotatingFile>, console: bool) {
    while let Ok(line) = rx.recv() {
        write_line(&mut file, console, &line);
        while let Ok(more) = rx.try_recv() {
            write_line(&mut file, console, &more);
        }
        if let Some(f) = file.as_mut() {
            if f.flush().is_err() {
                file = None;
            }
        }
    }

    if let Some(f) = file.as_mut() {
        let _ = f.flush();
    }
}

fn write_line(file: &mut Option<RotatingFile>, console: bool, line: &str) {
    if console {
        eprintln!("{}", line);
    }
    if let Some(f) = file.as_mut() {
        if f.write_line(line).is_err() {
            // Best-effort: el destino se abandona, el ring sigue
            *file = None;
        }
    }
}

/// Archivo de log con rotación por tamaño
struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    writer: BufWriter<File>,
    written: u64,
}

impl RotatingFile {
    fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            writer: BufWriter::new(file),
            written,
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.written += len;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// server.log → server.log.1 → ... → server.log.N (el último se pierde)
    fn rotate(&mut self) -> io::Result<()> {
        self.writer.flush()?;

        if self.backups > 0 {
            for n in (1..self.backups).rev() {
                let from = backup_path(&self.path, n);
                if from.exists() {
                    fs::rename(&from, backup_path(&self.path, n + 1))?;
                }
            }
            fs::rename(&self.path, backup_path(&self.path, 1))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.written = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}
