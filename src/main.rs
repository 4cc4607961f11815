//! # Reactor HTTP Server - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor de archivos estáticos.

use anyhow::Context;
use reactor_httpd::config::Config;
use reactor_httpd::server::Server;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=================================");
    println!("  Reactor HTTP/1.1 Server");
    println!("  Principios de Sistemas Operativos");
    println!("=================================\n");

    // Configuración desde CLI o variables de entorno
    let config = Config::new();
    config.print_summary();

    let server = Server::bind(config).context("no se pudo iniciar el servidor")?;

    // Bloquea hasta que el reactor termine
    server.run().context("el reactor terminó con error")?;
    Ok(())
}
