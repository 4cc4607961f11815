//! # Pool de Workers Acotado
//! src/workers/pool.rs
//!
//! N threads consumen una cola FIFO de capacidad C:
//!
//! - La cola está protegida por un `Mutex`
//! - Un semáforo cuenta las tareas pendientes; los workers duermen en `wait`
//! - `submit` nunca bloquea: si hay C tareas en cola, rechaza
//!
//! Cada tarea se saca y se ejecuta exactamente una vez. El pánico de una
//! tarea se atrapa y el worker sigue vivo.

use super::semaphore::Semaphore;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error};

/// Unidad de trabajo que ejecuta un worker
pub trait Task: Send + 'static {
    fn process(self);
}

/// La cola estaba llena (o el pool detenido) y la tarea se descartó
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("la cola de tareas está llena (capacidad {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Errores al construir el pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("el pool necesita al menos un worker")]
    NoWorkers,

    #[error("la capacidad de la cola debe ser mayor que cero")]
    NoCapacity,

    #[error("no se pudo crear el worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// Estado compartido entre el pool y sus workers
struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    pending: Semaphore,
    stop: AtomicBool,
    capacity: usize,
}

/// Pool de tamaño fijo con cola acotada
pub struct TaskPool<T: Task> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Task> TaskPool<T> {
    /// Crea el pool y arranca `workers` threads
    pub fn new(workers: usize, capacity: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        if capacity == 0 {
            return Err(PoolError::NoCapacity);
        }

        let mut pool = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
                pending: Semaphore::new(0),
                stop: AtomicBool::new(false),
                capacity,
            }),
            workers: Vec::with_capacity(workers),
        };

        for index in 0..workers {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || Self::worker_loop(index, shared));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(source) => {
                    pool.shutdown();
                    return Err(PoolError::Spawn { index, source });
                }
            }
        }

        debug!(workers, capacity, "pool de workers iniciado");
        Ok(pool)
    }

    /// Encola una tarea sin bloquear
    pub fn submit(&self, task: T) -> Result<(), QueueFull> {
        let full = QueueFull { capacity: self.shared.capacity };

        {
            let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if self.shared.stop.load(Ordering::Acquire) || queue.len() >= self.shared.capacity {
                return Err(full);
            }
            queue.push_back(task);
        }

        self.shared.pending.post();
        Ok(())
    }

    /// Tareas esperando un worker
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Workers vivos
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Detiene los workers y espera a que terminen. Idempotente.
    ///
    /// Las tareas que seguían en cola se descartan.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shared.stop.store(true, Ordering::Release);
        for _ in 0..self.workers.len() {
            self.shared.pending.post();
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("un worker terminó con pánico");
            }
        }

        let discarded = {
            let mut queue = self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let discarded = queue.len();
            queue.clear();
            discarded
        };
        debug!(discarded, "pool de workers detenido");
    }

    /// Loop principal del worker
    fn worker_loop(index: usize, shared: Arc<Shared<T>>) {
        debug!(worker = index, "worker iniciado");

        loop {
            shared.pending.wait();

            if shared.stop.load(Ordering::Acquire) {
                break;
            }

            let task = shared.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some(task) = task else {
                continue;
            };

            if panic::catch_unwind(AssertUnwindSafe(|| task.process())).is_err() {
                error!(worker = index, "una tarea terminó con pánico");
            }
        }

        debug!(worker = index, "worker terminado");
    }
}

impl<T: Task> Drop for TaskPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
