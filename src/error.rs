//! # Errores del Servidor
//! src/error.rs

use crate::workers::PoolError;
use std::io;
use thiserror::Error;

/// Configuración inválida
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("configuración inválida: {0}")]
    Invalid(&'static str),
}

/// Errores al levantar o correr el servidor
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no se pudo hacer bind en {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("error de E/S: {0}")]
    Io(#[from] io::Error),

    #[error("no se pudo iniciar el pool de workers: {0}")]
    Pool(#[from] PoolError),
}
