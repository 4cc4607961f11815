//! # Configuración del Servidor
//! src/config.rs
//!
//! Este módulo define la configuración del servidor con soporte completo
//! para argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./reactor_httpd --port 8080 \
//!   --doc-root ./resources \
//!   --workers 8 \
//!   --max-tasks 10000
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTPD_PORT=8080 HTTPD_HOST=0.0.0.0 ./reactor_httpd
//! ```

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Configuración del servidor de archivos estáticos
#[derive(Debug, Clone, Parser)]
#[command(name = "reactor_httpd")]
#[command(about = "Servidor HTTP/1.1 de archivos estáticos con epoll y pool de workers")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor (0 = efímero)
    #[arg(short, long, default_value = "8080", env = "HTTPD_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTPD_HOST")]
    pub host: String,

    /// Prefijo que se antepone al path de cada request
    #[arg(long = "doc-root", default_value = "./resources", env = "HTTPD_DOC_ROOT")]
    pub doc_root: PathBuf,

    // === Workers ===

    /// Número de threads del pool
    #[arg(long, default_value = "8", env = "HTTPD_WORKERS")]
    pub workers: usize,

    /// Capacidad de la cola de tareas
    #[arg(long = "max-tasks", default_value = "10000", env = "HTTPD_MAX_TASKS")]
    pub max_tasks: usize,

    // === Reactor ===

    /// Máximo de conexiones vivas; al llegar aquí se responde "Server busy"
    #[arg(long = "max-connections", default_value = "65536", env = "HTTPD_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Eventos que se drenan por cada espera de readiness
    #[arg(long = "max-events", default_value = "10000", env = "HTTPD_MAX_EVENTS")]
    pub max_events: usize,

    /// Largo de la cola de conexiones pendientes (`listen`)
    #[arg(long, default_value = "64", env = "HTTPD_BACKLOG")]
    pub backlog: u32,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use reactor_httpd::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1"));
        }
        if self.max_tasks == 0 {
            return Err(ConfigError::Invalid("max tasks must be >= 1"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max connections must be >= 1"));
        }
        if self.max_events == 0 {
            return Err(ConfigError::Invalid("max events must be >= 1"));
        }
        if self.doc_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("doc root must not be empty"));
        }
        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║             Reactor HTTP/1.1 Server Configuration            ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!("   Doc root:     {}", self.doc_root.display());
        println!("   Backlog:      {}", self.backlog);
        println!();
        println!("👷 Worker Pool:");
        println!("   Workers:      {}", self.workers);
        println!("   Queue cap:    {}", self.max_tasks);
        println!();
        println!("⚡ Reactor:");
        println!("   Max conns:    {}", self.max_connections);
        println!("   Max events:   {}", self.max_events);
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            doc_root: PathBuf::from("./resources"),
            workers: 8,
            max_tasks: 10_000,
            max_connections: 65_536,
            max_events: 10_000,
            backlog: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_tasks, 10_000);
        assert_eq!(config.max_connections, 65_536);
    }

    #[test]
    fn test_address_custom() {
        let mut config = Config::default();
        config.host = "0.0.0.0".to_string();
        config.port = 3000;
        assert_eq!(config.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_success() {
        assert!(Config::default().validate().is_ok());
    }

    // ==================== Validación ====================

    #[test]
    fn test_validate_invalid_workers() {
        let mut config = Config::default();
        config.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_validate_invalid_max_tasks() {
        let mut config = Config::default();
        config.max_tasks = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max tasks"));
    }

    #[test]
    fn test_validate_invalid_max_connections() {
        let mut config = Config::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_max_events() {
        let mut config = Config::default();
        config.max_events = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_doc_root() {
        let mut config = Config::default();
        config.doc_root = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("doc root"));
    }

    // ==================== CLI ====================

    #[test]
    fn test_parse_cli_flags() {
        let config = Config::try_parse_from([
            "reactor_httpd",
            "--port",
            "9000",
            "--doc-root",
            "/srv/www",
            "--workers",
            "2",
            "--max-tasks",
            "16",
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.doc_root, PathBuf::from("/srv/www"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.max_tasks, 16);
    }

    #[test]
    fn test_parse_rejects_non_numeric_port() {
        assert!(Config::try_parse_from(["reactor_httpd", "--port", "abc"]).is_err());
    }

    #[test]
    fn test_config_print_summary() {
        // No debe hacer panic
        Config::default().print_summary();
    }
}
