//! # Sistema de Workers
//! src/workers/mod.rs
//!
//! Pool de threads de tamaño fijo que procesa conexiones listas.
//! El reactor solo hace I/O; el parseo y la composición corren aquí.

pub mod pool;
pub mod semaphore;

pub use pool::{PoolError, QueueFull, Task, TaskPool};
pub use semaphore::Semaphore;
