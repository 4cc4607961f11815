//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Este módulo implementa el reactor que:
//! 1. Escucha en un puerto y acepta conexiones
//! 2. Espera readiness con epoll (one-shot, edge-triggered)
//! 3. Lee y escribe sin bloquear
//! 4. Entrega las conexiones listas al pool de workers

pub mod poller;
pub mod slots;
pub mod tcp;
pub mod waker;

// Re-exportar para facilitar el uso
pub use poller::{Interest, Poller};
pub use slots::ConnTable;
pub use tcp::{Server, ServerHandle, MAX_FD};
pub use waker::Waker;
