//! # Composición de Respuestas HTTP
//! src/http/response.rs
//!
//! La respuesta se arma dentro de un buffer de capacidad fija. Cada
//! `append` es atómico: si el texto formateado no cabe, el buffer queda
//! como estaba y se reporta `ComposeError::Overflow`. Nunca se trunca.
//!
//! ## Formato de la respuesta
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 1234\r\n
//! Content-Type: text/html\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! <archivo mapeado | cuerpo fijo del error>
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use reactor_httpd::http::{ResponseBuffer, StatusCode};
//!
//! let mut response = ResponseBuffer::new();
//! response.compose_error(StatusCode::NotFound, false).unwrap();
//! assert!(response.as_bytes().starts_with(b"HTTP/1.1 404 Not Found\r\n"));
//! ```

use super::StatusCode;
use std::fmt;
use thiserror::Error;

/// Capacidad del buffer de escritura de cada conexión
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Errores al componer una respuesta
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// El texto formateado no cabe en el buffer
    #[error("el buffer de respuesta se desbordó (capacidad {capacity} bytes)")]
    Overflow { capacity: usize },
}

/// Buffer acotado donde se escriben status line, headers y cuerpos cortos
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuffer {
    /// Crea un buffer con `WRITE_BUFFER_SIZE` bytes
    pub fn new() -> Self {
        Self::with_capacity(WRITE_BUFFER_SIZE)
    }

    /// Crea un buffer con una capacidad específica
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Agrega texto formateado. Todo o nada.
    pub fn append(&mut self, args: fmt::Arguments<'_>) -> Result<(), ComposeError> {
        let capacity = self.buf.len();
        let mut cursor = Cursor {
            buf: &mut self.buf,
            len: self.len,
        };

        match fmt::write(&mut cursor, args) {
            Ok(()) => {
                self.len = cursor.len;
                Ok(())
            }
            Err(_) => Err(ComposeError::Overflow { capacity }),
        }
    }

    /// Status line: `HTTP/1.1 404 Not Found\r\n`
    pub fn add_status_line(&mut self, status: StatusCode) -> Result<(), ComposeError> {
        self.append(format_args!("HTTP/1.1 {}\r\n", status))
    }

    /// Headers fijos más la línea vacía que cierra el bloque
    pub fn add_headers(&mut self, content_length: usize, keep_alive: bool) -> Result<(), ComposeError> {
        self.add_content_length(content_length)?;
        self.add_content_type()?;
        self.add_linger(keep_alive)?;
        self.add_blank_line()
    }

    pub fn add_content_length(&mut self, content_length: usize) -> Result<(), ComposeError> {
        self.append(format_args!("Content-Length: {}\r\n", content_length))
    }

    pub fn add_content_type(&mut self) -> Result<(), ComposeError> {
        self.append(format_args!("Content-Type: {}\r\n", "text/html"))
    }

    pub fn add_linger(&mut self, keep_alive: bool) -> Result<(), ComposeError> {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.append(format_args!("Connection: {}\r\n", value))
    }

    pub fn add_blank_line(&mut self) -> Result<(), ComposeError> {
        self.append(format_args!("\r\n"))
    }

    /// Cuerpo inline (solo para los mensajes fijos de error)
    pub fn add_content(&mut self, content: &str) -> Result<(), ComposeError> {
        self.append(format_args!("{}", content))
    }

    /// Header block de un 200; el archivo viaja como segundo segmento
    pub fn compose_file(&mut self, file_len: usize, keep_alive: bool) -> Result<(), ComposeError> {
        self.add_status_line(StatusCode::FileOk)?;
        self.add_headers(file_len, keep_alive)
    }

    /// Respuesta completa de error: headers + cuerpo fijo en un solo segmento
    pub fn compose_error(&mut self, status: StatusCode, keep_alive: bool) -> Result<(), ComposeError> {
        let body = status.body();
        self.add_status_line(status)?;
        self.add_headers(body.len(), keep_alive)?;
        self.add_content(body)
    }

    /// Bytes escritos hasta ahora
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Descarta el contenido (la memoria se reutiliza)
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Adaptador `fmt::Write` que falla en vez de pasarse de la capacidad
struct Cursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len.checked_add(s.len()).ok_or(fmt::Error)?;
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(response: &ResponseBuffer) -> String {
        String::from_utf8(response.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_new_buffer() {
        let response = ResponseBuffer::new();
        assert!(response.is_empty());
        assert_eq!(response.capacity(), WRITE_BUFFER_SIZE);
    }

    #[test]
    fn test_compose_file_headers() {
        let mut response = ResponseBuffer::new();
        response.compose_file(1234, true).unwrap();

        assert_eq!(
            text(&response),
            "HTTP/1.1 200 OK\r\n\
             Content-Length: 1234\r\n\
             Content-Type: text/html\r\n\
             Connection: keep-alive\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_compose_error_inline_body() {
        let mut response = ResponseBuffer::new();
        response.compose_error(StatusCode::NotFound, false).unwrap();

        let body = StatusCode::NotFound.body();
        let text = text(&response);
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with(&format!("\r\n\r\n{}", body)));
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut response = ResponseBuffer::with_capacity(20);
        let result = response.compose_error(StatusCode::BadRequest, false);
        assert_eq!(result, Err(ComposeError::Overflow { capacity: 20 }));
    }

    #[test]
    fn test_overflow_keeps_previous_content() {
        let mut response = ResponseBuffer::with_capacity(24);
        response.add_status_line(StatusCode::FileOk).unwrap();
        let before = response.len();

        assert!(response.add_content_length(123456).is_err());
        assert_eq!(response.len(), before);
        assert_eq!(text(&response), "HTTP/1.1 200 OK\r\n");
    }

    #[test]
    fn test_exact_fit() {
        let mut response = ResponseBuffer::with_capacity(4);
        response.add_content("abcd").unwrap();
        assert_eq!(response.len(), 4);
        assert!(response.add_content("e").is_err());
    }

    #[test]
    fn test_clear() {
        let mut response = ResponseBuffer::new();
        response.add_blank_line().unwrap();
        response.clear();
        assert!(response.is_empty());
    }
}
