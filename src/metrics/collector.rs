//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Contadores del servidor actualizados sin locks desde el reactor y los
//! workers. El conteo de conexiones vivas también vive aquí: es el que usa
//! el reactor para decidir si rechaza con "Server busy".

use crate::http::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Collector de métricas thread-safe
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsData>,
    start_time: Instant,
}

/// Datos internos de métricas
#[derive(Debug, Default)]
struct MetricsData {
    /// Conexiones aceptadas y registradas
    accepted: AtomicU64,

    /// Conexiones rechazadas con "Server busy"
    rejected: AtomicU64,

    /// Conexiones cerradas
    closed: AtomicU64,

    /// Conexiones vivas en este momento
    live: AtomicUsize,

    /// Respuestas por clase
    responses_2xx: AtomicU64,
    responses_4xx: AtomicU64,
    responses_5xx: AtomicU64,

    /// Tareas que el pool no aceptó (cola llena)
    dropped_tasks: AtomicU64,

    /// Bytes enviados (headers + archivo)
    bytes_sent: AtomicU64,
}

impl MetricsCollector {
    /// Crea un nuevo collector de métricas
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsData::default()),
            start_time: Instant::now(),
        }
    }

    /// Registra una conexión aceptada
    pub fn connection_accepted(&self) {
        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
        self.inner.live.fetch_add(1, Ordering::AcqRel);
    }

    /// Registra un rechazo por servidor ocupado
    pub fn connection_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Registra un cierre. El conteo de vivas nunca baja de cero.
    pub fn connection_closed(&self) {
        self.inner.closed.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .inner
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| live.checked_sub(1));
    }

    /// Conexiones vivas en este momento
    pub fn live_connections(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Registra la clasificación de una respuesta compuesta
    pub fn record_response(&self, status: StatusCode) {
        let counter = if status.is_success() {
            &self.inner.responses_2xx
        } else if status.is_client_error() {
            &self.inner.responses_4xx
        } else {
            &self.inner.responses_5xx
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Registra una tarea que el pool rechazó
    pub fn task_dropped(&self) {
        self.inner.dropped_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// Suma bytes enviados
    pub fn add_bytes_sent(&self, bytes: usize) {
        self.inner.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = &self.inner;
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            accepted: data.accepted.load(Ordering::Relaxed),
            rejected: data.rejected.load(Ordering::Relaxed),
            closed: data.closed.load(Ordering::Relaxed),
            live_connections: data.live.load(Ordering::Acquire),
            responses_2xx: data.responses_2xx.load(Ordering::Relaxed),
            responses_4xx: data.responses_4xx.load(Ordering::Relaxed),
            responses_5xx: data.responses_5xx.load(Ordering::Relaxed),
            dropped_tasks: data.dropped_tasks.load(Ordering::Relaxed),
            bytes_sent: data.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Snapshot en formato JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub closed: u64,
    pub live_connections: usize,
    pub responses_2xx: u64,
    pub responses_4xx: u64,
    pub responses_5xx: u64,
    pub dropped_tasks: u64,
    pub bytes_sent: u64,
}
