//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Este módulo define las clasificaciones que puede producir una conexión
//! después de parsear y resolver un request:
//!
//! - **2xx**: Éxito (200, archivo servible)
//! - **4xx**: Error del cliente (400, 403, 404)
//! - **5xx**: Error del servidor (500)
//!
//! Cada código de error lleva además un cuerpo fijo y corto que se envía
//! inline junto con los headers.

/// Clasificación final de un request ya resuelto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK - Archivo encontrado y mapeado en memoria
    FileOk = 200,

    /// 400 Bad Request - Sintaxis inválida o recurso imposible de servir
    BadRequest = 400,

    /// 403 Forbidden - El archivo no tiene permiso de lectura para "others"
    Forbidden = 403,

    /// 404 Not Found - El archivo no existe o no se pudo consultar
    NotFound = 404,

    /// 500 Internal Error - Falla inesperada al preparar la respuesta
    InternalError = 500,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_httpd::http::StatusCode;
    /// assert_eq!(StatusCode::FileOk.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Retorna el texto de razón (reason phrase) de la status line
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_httpd::http::StatusCode;
    /// assert_eq!(StatusCode::FileOk.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::InternalError.reason_phrase(), "Internal Error");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::FileOk => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Error",
        }
    }

    /// Cuerpo explicativo fijo que acompaña a cada código.
    ///
    /// Para `FileOk` el cuerpo es el archivo mapeado, así que aquí es vacío.
    pub fn body(&self) -> &'static str {
        match self {
            StatusCode::FileOk => "",
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalError => {
                "There was an unusual problem serving the requested file.\n"
            }
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::FileOk)
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
