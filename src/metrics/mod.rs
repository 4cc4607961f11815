//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Este módulo implementa la recolección de métricas del servidor:
//! - Conexiones aceptadas, rechazadas, cerradas y vivas
//! - Respuestas por clase de status
//! - Tareas descartadas por cola llena
//! - Bytes enviados

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
