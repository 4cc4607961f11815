//! # Reactor HTTP Server
//! src/lib.rs
//!
//! Servidor HTTP/1.1 de archivos estáticos orientado a eventos, hecho para
//! demostrar conceptos de sistemas operativos: multiplexación de E/S,
//! sincronización con mutex y semáforos, y manejo explícito de recursos.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: Parser incremental, composición de respuestas y estado por conexión
//! - `server`: Reactor epoll, tabla de slots y despertador
//! - `workers`: Pool de threads con cola acotada y semáforo contador
//! - `metrics`: Contadores del servidor
//! - `config`: Argumentos CLI y variables de entorno
//! - `error`: Tipos de error
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use reactor_httpd::config::Config;
//! use reactor_httpd::server::Server;
//!
//! let server = Server::bind(Config::default()).expect("Error al hacer bind");
//! server.run().expect("Error en el reactor");
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod server;
pub mod workers;
