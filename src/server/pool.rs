//! # Pool de Workers
//! src/server/pool.rs
//!
//! Número fijo de threads que sacan trabajos de una cola FIFO sin límite.
//! Sincronización con `Mutex` + `Condvar`:
//!
//! - `work_ready`: despierta a un worker cuando llega un trabajo o al
//!   iniciar el shutdown
//! - `workers_done`: avisa a `shutdown` cada vez que un worker termina
//!
//! Un trabajo que hace panic se atrapa con `catch_unwind`; el worker sigue
//! vivo y el slot vuelve al pool.

use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Unidad de trabajo: atender una conexión
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errores del pool
#[derive(Debug)]
pub enum PoolError {
    /// Tamaño 0
    InvalidSize,

    /// El sistema no permitió crear un thread
    Spawn(io::Error),

    /// Ya se inició el shutdown; no se admiten trabajos nuevos
    ShuttingDown,
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::InvalidSize => write!(f, "worker pool size must be >= 1"),
            PoolError::Spawn(e) => write!(f, "cannot spawn worker thread: {}", e),
            PoolError::ShuttingDown => write!(f, "worker pool is shutting down"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Resultado de `shutdown`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Trabajos encolados que se ejecutaron después de iniciar el shutdown
    pub drained: usize,

    /// Trabajos descartados sin ejecutar al vencer la espera
    pub dropped: usize,

    /// Workers que seguían ocupados al vencer la espera (quedan sueltos)
    pub stragglers: usize,
}

/// Estado instantáneo del pool, para `/api/stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolGauges {
    pub size: usize,
    pub active: usize,
    pub queued: usize,
}

struct PoolState {
    queue: VecDeque<Job>,
    active: usize,
    alive: usize,
    shutting_down: bool,
    drained: usize,
}

struct Shared {
    state: Mutex<PoolState>,
    work_ready: Condvar,
    workers_done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pool de tamaño fijo
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    /// Crea `size` workers llamados `{prefix}-{i}`
    pub fn new(size: usize, prefix: &str) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                active: 0,
                alive: 0,
                shutting_down: false,
                drained: 0,
            }),
            work_ready: Condvar::new(),
            workers_done: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(size),
            size,
        };

        for id in 0..size {
            let shared = Arc::clone(&pool.shared);
            pool.shared.lock().alive += 1;

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", prefix, id))
                .spawn(move || worker_loop(shared));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.shared.lock().alive -= 1;
                    // Los workers ya creados terminan solos al ver el flag
                    pool.shutdown(Duration::ZERO);
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        Ok(pool)
    }

    /// Encola un trabajo. Falla solo si el shutdown ya empezó.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.shutting_down {
            return Err(PoolError::ShuttingDown);
        }
        state.queue.push_back(Box::new(job));
        drop(state);

        self.shared.work_ready.notify_one();
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers ejecutando un trabajo ahora mismo
    pub fn active(&self) -> usize {
        self.shared.lock().active
    }

    /// Trabajos esperando un worker libre
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Handle de solo lectura para consultar el estado desde los propios
    /// trabajos
    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor {
            shared: Arc::clone(&self.shared),
            size: self.size,
        }
    }

    /// Cierre ordenado:
    ///
    /// 1. No se admiten más trabajos y se despierta a todos los workers
    /// 2. Los workers vacían la cola; se espera hasta `grace`
    /// 3. Lo que siga encolado se descarta (al soltar el trabajo se cierra
    ///    su socket) y los workers ocupados quedan sueltos
    pub fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        let deadline = Instant::now() + grace;

        let mut state = self.shared.lock();
        state.shutting_down = true;
        self.shared.work_ready.notify_all();

        while state.alive > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .shared
                .workers_done
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }

        let leftover: Vec<Job> = state.queue.drain(..).collect();
        let report = ShutdownReport {
            drained: state.drained,
            dropped: leftover.len(),
            stragglers: state.alive,
        };
        drop(state);
        drop(leftover);

        for handle in self.workers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }

        report
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Sin esperar: los workers terminan la cola por su cuenta
        let mut state = self.shared.lock();
        if !state.shutting_down {
            state.shutting_down = true;
            self.shared.work_ready.notify_all();
        }
    }
}

/// Vista clonable del pool
#[derive(Clone)]
pub struct PoolMonitor {
    shared: Arc<Shared>,
    size: usize,
}

impl PoolMonitor {
    pub fn gauges(&self) -> PoolGauges {
        let state = self.shared.lock();
        PoolGauges {
            size: self.size,
            active: state.active,
            queued: state.queue.len(),
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.active += 1;
                    if state.shutting_down {
                        state.drained += 1;
                    }
                    break job;
                }
                if state.shutting_down {
                    state.alive -= 1;
                    shared.workers_done.notify_all();
                    return;
                }
                state = shared
                    .work_ready
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        // El handler ya registra sus propios errores; aquí solo se evita
        // perder el worker
        let _ = panic::catch_unwind(AssertUnwindSafe(job));

        shared.lock().active -= 1;
    }
}
