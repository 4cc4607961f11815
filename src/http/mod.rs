//! # Módulo HTTP
//!
//! Este módulo implementa el subconjunto de HTTP/1.1 que el servidor
//! necesita para servir archivos estáticos, sin librerías de alto nivel:
//!
//! - Parsing incremental de requests (el request puede llegar en pedazos)
//! - Composición de la respuesta en un buffer acotado
//! - Mapeo en memoria del archivo servido
//! - La máquina de estados por conexión que une todo lo anterior
//!
//! Solo se acepta `GET` con versión `HTTP/1.1`.
//!
//! ### Formato de Request
//!
//! ```text
//! GET /index.html HTTP/1.1\r\n
//! Host: localhost\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 13\r\n
//! Content-Type: text/html\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! <html></html>
//! ```

pub mod connection; // Estado y ciclo read/process/write de un socket
pub mod mapped;     // Región mmap de solo lectura
pub mod request;    // Parser incremental
pub mod response;   // Buffer de respuesta acotado
pub mod status;     // Códigos de estado

// Re-exportamos los tipos principales para facilitar su uso
pub use connection::{Connection, ProcessOutcome, ReadError, WriteOutcome};
pub use mapped::MappedFile;
pub use request::{CheckState, LineStatus, Method, ParseOutcome, Request, RequestParser};
pub use response::{ComposeError, ResponseBuffer};
pub use status::StatusCode;
