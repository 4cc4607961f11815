//! # Parsing Incremental de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Este módulo implementa el parser por líneas que corre sobre el buffer de
//! lectura de cada conexión. Los bytes llegan en varios `read()` no
//! bloqueantes, así que el parser guarda sus cursores entre llamadas y
//! continúa exactamente donde se quedó.
//!
//! ## Máquinas de estado
//!
//! 1. **Sub-máquina de líneas** (`parse_line`): busca `\r\n` desde el último
//!    cursor y reemplaza ambos bytes por `\0` *in place*. Cada línea queda
//!    como un rango del buffer, sin copias ni allocations.
//! 2. **Máquina principal** (`CheckState`): `RequestLine` → `Headers` →
//!    `Content`.
//!
//! ```text
//! GET /index.html HTTP/1.1\r\n      <- RequestLine
//! Host: localhost\r\n               <- Headers
//! Connection: keep-alive\r\n        <- Headers
//! \r\n                              <- fin de headers
//! ```
//!
//! Los campos parseados se guardan como rangos (`Span`) dentro del buffer;
//! `RequestParser::request` construye una vista prestada sobre ese buffer.

use tracing::{debug, trace};

/// Métodos HTTP soportados (solo GET)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    Get,
}

impl Method {
    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
        }
    }
}

/// Estado de la máquina principal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Esperando la request line
    RequestLine,
    /// Leyendo headers hasta la línea vacía
    Headers,
    /// Esperando `Content-Length` bytes de body
    Content,
}

/// Resultado de extraer una línea
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Se encontró una línea completa terminada en `\r\n`
    Complete,
    /// Todavía no llega el terminador
    Incomplete,
    /// `\r` suelto o `\n` sin `\r` previo
    Malformed,
}

/// Resultado de una pasada del parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// El request no está completo, hay que leer más bytes
    NeedMoreData,
    /// Request completo y válido
    RequestReady,
    /// Error de sintaxis, terminal para este request
    BadRequest,
}

/// Rango `[start, end)` dentro del buffer de lectura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start..self.end]
    }
}

/// Vista de un request ya parseado, prestada del buffer de lectura
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    method: Method,
    target: &'a str,
    version: &'a str,
    host: Option<&'a str>,
    content_length: usize,
    keep_alive: bool,
    body: &'a [u8],
}

impl<'a> Request<'a> {
    /// Obtiene el método HTTP del request
    pub fn method(&self) -> Method {
        self.method
    }

    /// Target tal como llegó (ya sin esquema ni authority)
    pub fn target(&self) -> &'a str {
        self.target
    }

    /// Path sin query string ni fragmento
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_httpd::http::RequestParser;
    ///
    /// let mut buf = b"GET /a.html?x=1 HTTP/1.1\r\n\r\n".to_vec();
    /// let len = buf.len();
    /// let mut parser = RequestParser::new();
    /// parser.parse(&mut buf, len);
    /// assert_eq!(parser.request(&buf).unwrap().path(), "/a.html");
    /// ```
    pub fn path(&self) -> &'a str {
        self.target
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or(self.target)
    }

    /// Obtiene la versión HTTP
    pub fn version(&self) -> &'a str {
        self.version
    }

    /// Valor del header `Host`, si vino
    pub fn host(&self) -> Option<&'a str> {
        self.host
    }

    /// Valor del header `Content-Length` (0 si no vino)
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// `true` si el cliente pidió `Connection: keep-alive`
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Body recibido (no se interpreta)
    pub fn body(&self) -> &'a [u8] {
        self.body
    }
}

/// Parser incremental de un request HTTP/1.1
#[derive(Debug, Clone)]
pub struct RequestParser {
    /// Estado de la máquina principal
    state: CheckState,

    /// Posición del próximo byte a examinar
    checked_idx: usize,

    /// Inicio de la línea actual
    start_line: usize,

    /// Fin (exclusivo) de la última línea completa
    line_end: usize,

    method: Option<Method>,
    target: Option<Span>,
    version: Option<Span>,
    host: Option<Span>,
    content_length: usize,
    keep_alive: bool,
    body: Option<Span>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Crea un parser en el estado inicial
    pub fn new() -> Self {
        Self {
            state: CheckState::RequestLine,
            checked_idx: 0,
            start_line: 0,
            line_end: 0,
            method: None,
            target: None,
            version: None,
            host: None,
            content_length: 0,
            keep_alive: false,
            body: None,
        }
    }

    /// Vuelve al estado inicial para el siguiente request
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Estado actual de la máquina principal
    pub fn state(&self) -> CheckState {
        self.state
    }

    /// Cursor de escaneo dentro del buffer
    pub fn checked_idx(&self) -> usize {
        self.checked_idx
    }

    /// `true` si el request pidió keep-alive
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// `Content-Length` parseado hasta ahora
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Extrae una línea a partir de `checked_idx`.
    ///
    /// `filled` es la cantidad de bytes válidos en `buf`. Si la línea está
    /// completa, los dos bytes del terminador quedan en `\0`.
    pub fn parse_line(&mut self, buf: &mut [u8], filled: usize) -> LineStatus {
        let filled = filled.min(buf.len());

        while self.checked_idx < filled {
            let idx = self.checked_idx;
            match buf[idx] {
                b'\r' => {
                    if idx + 1 == filled {
                        return LineStatus::Incomplete;
                    }
                    if buf[idx + 1] != b'\n' {
                        return LineStatus::Malformed;
                    }
                    buf[idx] = 0;
                    buf[idx + 1] = 0;
                    self.line_end = idx;
                    self.checked_idx = idx + 2;
                    return LineStatus::Complete;
                }
                b'\n' => {
                    if idx > self.start_line && buf[idx - 1] == b'\r' {
                        buf[idx - 1] = 0;
                        buf[idx] = 0;
                        self.line_end = idx - 1;
                        self.checked_idx = idx + 1;
                        return LineStatus::Complete;
                    }
                    return LineStatus::Malformed;
                }
                _ => self.checked_idx += 1,
            }
        }

        LineStatus::Incomplete
    }

    /// Corre la máquina principal sobre los bytes disponibles.
    ///
    /// Se puede llamar varias veces sobre el mismo buffer a medida que
    /// crece `filled`; nunca re-examina bytes ya consumidos.
    pub fn parse(&mut self, buf: &mut [u8], filled: usize) -> ParseOutcome {
        let filled = filled.min(buf.len());

        loop {
            let line_status = match self.state {
                CheckState::Content => return self.parse_content(buf, filled),
                _ => self.parse_line(buf, filled),
            };

            match line_status {
                LineStatus::Complete => {}
                LineStatus::Incomplete => return ParseOutcome::NeedMoreData,
                LineStatus::Malformed => return ParseOutcome::BadRequest,
            }

            let line = Span::new(self.start_line, self.line_end);
            self.start_line = self.checked_idx;
            trace!(line = %String::from_utf8_lossy(line.slice(buf)), "línea HTTP");

            let outcome = match self.state {
                CheckState::RequestLine => self.parse_request_line(buf, line),
                CheckState::Headers => self.parse_header(buf, line),
                CheckState::Content => self.parse_content(buf, filled),
            };

            // NeedMoreData aquí significa "línea aceptada, seguir"
            if outcome != ParseOutcome::NeedMoreData {
                return outcome;
            }
        }
    }

    /// Construye la vista del request si ya se parseó la request line
    pub fn request<'a>(&self, buf: &'a [u8]) -> Option<Request<'a>> {
        let method = self.method?;
        let target = std::str::from_utf8(self.target?.slice(buf)).ok()?;
        let version = std::str::from_utf8(self.version?.slice(buf)).ok()?;
        let host = self
            .host
            .and_then(|span| std::str::from_utf8(span.slice(buf)).ok());
        let body = self.body.map(|span| span.slice(buf)).unwrap_or(&[]);

        Some(Request {
            method,
            target,
            version,
            host,
            content_length: self.content_length,
            keep_alive: self.keep_alive,
            body,
        })
    }

    /// Parsea `METHOD SP TARGET SP VERSION`
    fn parse_request_line(&mut self, buf: &[u8], line: Span) -> ParseOutcome {
        let text = line.slice(buf);
        let mut tokens = Tokens::new(text);

        let (Some(method), Some(target), Some(version), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return ParseOutcome::BadRequest;
        };

        if !method.slice(text).eq_ignore_ascii_case(b"GET") {
            debug!(method = %String::from_utf8_lossy(method.slice(text)), "método no soportado");
            return ParseOutcome::BadRequest;
        }

        if version.slice(text) != b"HTTP/1.1" {
            debug!(version = %String::from_utf8_lossy(version.slice(text)), "versión no soportada");
            return ParseOutcome::BadRequest;
        }

        // Target absoluto: http://host[:port]/path -> /path
        let mut target = target;
        let raw = target.slice(text);
        if raw.len() >= 7 && raw[..7].eq_ignore_ascii_case(b"http://") {
            match raw[7..].iter().position(|&b| b == b'/') {
                Some(pos) => target.start += 7 + pos,
                None => return ParseOutcome::BadRequest,
            }
        }

        let raw = target.slice(text);
        if raw.first() != Some(&b'/') || std::str::from_utf8(raw).is_err() {
            return ParseOutcome::BadRequest;
        }

        self.method = Some(Method::Get);
        self.target = Some(Span::new(line.start + target.start, line.start + target.end));
        self.version = Some(Span::new(line.start + version.start, line.start + version.end));
        self.state = CheckState::Headers;
        ParseOutcome::NeedMoreData
    }

    /// Parsea un header; la línea vacía cierra el bloque de headers
    fn parse_header(&mut self, buf: &[u8], line: Span) -> ParseOutcome {
        let text = line.slice(buf);

        if text.is_empty() {
            if self.content_length == 0 {
                return ParseOutcome::RequestReady;
            }
            // El body nunca cabría en el buffer
            if self.checked_idx.saturating_add(self.content_length) > buf.len() {
                debug!(content_length = self.content_length, "body más grande que el buffer");
                return ParseOutcome::BadRequest;
            }
            self.state = CheckState::Content;
            return ParseOutcome::NeedMoreData;
        }

        if let Some(offset) = header_value(text, b"Connection:") {
            if trim_end(&text[offset..]).eq_ignore_ascii_case(b"keep-alive") {
                self.keep_alive = true;
            }
        } else if let Some(offset) = header_value(text, b"Content-Length:") {
            let parsed = std::str::from_utf8(trim_end(&text[offset..]))
                .ok()
                .and_then(|value| value.parse::<usize>().ok());
            match parsed {
                Some(length) => self.content_length = length,
                None => return ParseOutcome::BadRequest,
            }
        } else if let Some(offset) = header_value(text, b"Host:") {
            self.host = Some(Span::new(line.start + offset, line.end));
        } else {
            debug!(header = %String::from_utf8_lossy(text), "header desconocido, se ignora");
        }

        ParseOutcome::NeedMoreData
    }

    /// Verifica que ya llegaron `Content-Length` bytes después de los headers
    fn parse_content(&mut self, buf: &mut [u8], filled: usize) -> ParseOutcome {
        let start = self.checked_idx;
        let end = start + self.content_length;

        if filled < end {
            return ParseOutcome::NeedMoreData;
        }

        if end < buf.len() {
            buf[end] = 0;
        }
        self.body = Some(Span::new(start, end));
        ParseOutcome::RequestReady
    }
}

/// Si `text` empieza con `name` (sin distinguir mayúsculas), retorna el
/// offset donde empieza el valor, ya saltando espacios y tabs.
fn header_value(text: &[u8], name: &[u8]) -> Option<usize> {
    if text.len() < name.len() || !text[..name.len()].eq_ignore_ascii_case(name) {
        return None;
    }
    let skipped = text[name.len()..]
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    Some(name.len() + skipped)
}

fn trim_end(value: &[u8]) -> &[u8] {
    let len = value
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |pos| pos + 1);
    &value[..len]
}

/// Iterador de tokens separados por espacios o tabs, como rangos relativos
struct Tokens<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a [u8]) -> Self {
        Self { text, pos: 0 }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        let is_blank = |b: u8| b == b' ' || b == b'\t';

        while self.pos < self.text.len() && is_blank(self.text[self.pos]) {
            self.pos += 1;
        }
        if self.pos == self.text.len() {
            return None;
        }

        let start = self.pos;
        while self.pos < self.text.len() && !is_blank(self.text[self.pos]) {
            self.pos += 1;
        }
        Some(Span::new(start, self.pos))
    }
}
