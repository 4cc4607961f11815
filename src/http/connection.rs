//! # Máquina de Estados de una Conexión
//! src/http/connection.rs
//!
//! Cada socket aceptado tiene una `Connection` que es dueña de sus buffers.
//! El ciclo de vida de un request es:
//!
//! 1. `read()`: el reactor drena el socket no bloqueante al buffer de lectura
//! 2. `process()`: un worker parsea y compone la respuesta (sin I/O de red)
//! 3. `write()`: el reactor envía los segmentos con `writev` hasta vaciarlos
//!
//! La respuesta tiene uno o dos segmentos: el header block (buffer acotado)
//! y, si es un 200, el archivo mapeado en memoria. El archivo nunca se copia
//! al buffer de escritura.
//!
//! El progreso del envío se deriva solo de `(bytes_to_send, bytes_sent)`:
//! los segmentos pendientes se recalculan en cada intento de escritura.

use super::mapped::MappedFile;
use super::request::{ParseOutcome, RequestParser};
use super::response::{ComposeError, ResponseBuffer};
use super::StatusCode;
use crate::metrics::MetricsCollector;
use crate::server::poller::Poller;
use std::ffi::OsString;
use std::fs;
use std::io::{self, IoSlice, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Capacidad del buffer de lectura
pub const READ_BUFFER_SIZE: usize = 2048;

/// Largo máximo del path resuelto en disco
pub const FILENAME_LEN: usize = 256;

/// Bit de lectura para "others"
const OTHERS_READ: u32 = libc::S_IROTH as u32;

/// Fallas de `read()`; todas terminan en el cierre de la conexión
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("el cliente cerró la conexión")]
    PeerClosed,

    #[error("la conexión ya está cerrada")]
    Closed,

    #[error("error de transporte: {0}")]
    Io(#[from] io::Error),
}

/// Resultado de `process()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// El request está incompleto: re-armar para lectura
    NeedMoreData,
    /// Respuesta compuesta: re-armar para escritura
    Ready(StatusCode),
    /// La respuesta no se pudo componer: cerrar
    Failed,
}

/// Resultado de `write()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// El socket se llenó; esperar al próximo evento de escritura
    Pending,
    /// Respuesta enviada completa; la conexión ya quedó reiniciada
    Done { keep_alive: bool },
}

/// Estado de una conexión HTTP
#[derive(Debug)]
pub struct Connection {
    /// Socket; `None` después de `close()`
    stream: Option<TcpStream>,
    fd: RawFd,
    peer: SocketAddr,

    read_buf: Box<[u8]>,
    read_pos: usize,
    parser: RequestParser,

    response: ResponseBuffer,
    mapped: Option<MappedFile>,
    bytes_to_send: usize,
    bytes_sent: usize,

    keep_alive: bool,
    real_file: PathBuf,
    file_len: usize,
    status: Option<StatusCode>,
}

impl Connection {
    /// Crea la conexión para un socket recién aceptado
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let fd = stream.as_raw_fd();
        Self {
            stream: Some(stream),
            fd,
            peer,
            read_buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            read_pos: 0,
            parser: RequestParser::new(),
            response: ResponseBuffer::new(),
            mapped: None,
            bytes_to_send: 0,
            bytes_sent: 0,
            keep_alive: false,
            real_file: PathBuf::new(),
            file_len: 0,
            status: None,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Bytes válidos en el buffer de lectura
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Clasificación del último request compuesto
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Drena todo lo disponible en el socket hasta `WouldBlock`, o hasta
    /// llenar el buffer de lectura.
    ///
    /// Retorna cuántos bytes se leyeron en esta llamada. Un buffer lleno no
    /// es un error aquí: `process()` decide si ya contiene un request.
    pub fn read(&mut self) -> Result<usize, ReadError> {
        let stream = self.stream.as_mut().ok_or(ReadError::Closed)?;
        let mut total = 0;

        while self.read_pos < self.read_buf.len() {

            match stream.read(&mut self.read_buf[self.read_pos..]) {
                Ok(0) => return Err(ReadError::PeerClosed),
                Ok(n) => {
                    self.read_pos += n;
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReadError::Io(e)),
            }
        }

        Ok(total)
    }

    /// Parsea lo acumulado y, si el request está completo, compone la respuesta.
    ///
    /// Con el buffer lleno y el request todavía incompleto no hay forma de
    /// seguir leyendo: la conexión se descarta (`Failed`).
    pub fn process(&mut self, doc_root: &Path) -> ProcessOutcome {
        let status = match self.process_read() {
            ParseOutcome::NeedMoreData if self.read_pos >= self.read_buf.len() => {
                debug!(peer = %self.peer, capacity = self.read_buf.len(), "buffer lleno sin un request completo");
                return ProcessOutcome::Failed;
            }
            ParseOutcome::NeedMoreData => return ProcessOutcome::NeedMoreData,
            ParseOutcome::BadRequest => {
                // Un 400 nunca mantiene la conexión
                self.keep_alive = false;
                StatusCode::BadRequest
            }
            ParseOutcome::RequestReady => {
                self.keep_alive = self.parser.keep_alive();
                self.do_request(doc_root)
            }
        };

        match self.process_write(status) {
            Ok(()) => {
                debug!(peer = %self.peer, status = status.as_u16(), "respuesta compuesta");
                ProcessOutcome::Ready(status)
            }
            Err(e) => {
                warn!(peer = %self.peer, status = status.as_u16(), error = %e, "no se pudo componer la respuesta");
                self.keep_alive = false;
                match self.process_write(StatusCode::InternalError) {
                    Ok(()) => ProcessOutcome::Ready(StatusCode::InternalError),
                    Err(_) => {
                        self.mapped = None;
                        ProcessOutcome::Failed
                    }
                }
            }
        }
    }

    /// Corre el parser sobre `read_buf[..read_pos]`
    pub fn process_read(&mut self) -> ParseOutcome {
        self.parser.parse(&mut self.read_buf, self.read_pos)
    }

    /// Resuelve el target contra el document root y mapea el archivo
    pub fn do_request(&mut self, doc_root: &Path) -> StatusCode {
        let real_file = {
            let Some(request) = self.parser.request(&self.read_buf) else {
                return StatusCode::InternalError;
            };
            let path = request.path();
            debug!(peer = %self.peer, method = request.method().as_str(), path, "request completo");

            if path.split('/').any(|segment| segment == "..") {
                debug!(peer = %self.peer, path, "path fuera del document root");
                return StatusCode::Forbidden;
            }

            let mut real_file = OsString::from(doc_root.as_os_str());
            real_file.push(path);
            if real_file.len() > FILENAME_LEN {
                return StatusCode::BadRequest;
            }
            PathBuf::from(real_file)
        };
        self.real_file = real_file;

        let metadata = match fs::metadata(&self.real_file) {
            Ok(metadata) => metadata,
            Err(_) => return StatusCode::NotFound,
        };

        if metadata.permissions().mode() & OTHERS_READ == 0 {
            return StatusCode::Forbidden;
        }

        // Directorios, FIFOs y dispositivos no se sirven
        if !metadata.is_file() {
            return StatusCode::BadRequest;
        }

        let Ok(file_len) = usize::try_from(metadata.len()) else {
            return StatusCode::InternalError;
        };
        self.file_len = file_len;

        if file_len == 0 {
            self.mapped = None;
            return StatusCode::FileOk;
        }

        match MappedFile::open(&self.real_file, file_len) {
            Ok(mapped) => {
                self.mapped = Some(mapped);
                StatusCode::FileOk
            }
            Err(e) => {
                warn!(file = %self.real_file.display(), error = %e, "no se pudo mapear el archivo");
                StatusCode::InternalError
            }
        }
    }

    /// Compone status line, headers y (si es error) el cuerpo fijo
    pub fn process_write(&mut self, status: StatusCode) -> Result<(), ComposeError> {
        self.response.clear();
        self.bytes_sent = 0;

        match status {
            StatusCode::FileOk => {
                self.response.compose_file(self.file_len, self.keep_alive)?;
                self.bytes_to_send = self.response.len() + self.file_len;
            }
            _ => {
                self.mapped = None;
                self.response.compose_error(status, self.keep_alive)?;
                self.bytes_to_send = self.response.len();
            }
        }

        self.status = Some(status);
        Ok(())
    }

    /// Envía los segmentos pendientes con scatter-gather.
    ///
    /// Un error aquí significa que la conexión debe cerrarse.
    pub fn write(&mut self) -> io::Result<WriteOutcome> {
        if self.stream.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "conexión cerrada"));
        }

        if self.bytes_to_send == 0 {
            self.reset();
            return Ok(WriteOutcome::Done { keep_alive: true });
        }

        loop {
            let result = {
                let header = self.response.as_bytes();
                let body: &[u8] = match &self.mapped {
                    Some(mapped) => mapped.as_slice(),
                    None => &[],
                };
                let segments = pending_segments(header, body, self.bytes_sent);
                match self.stream.as_mut() {
                    Some(stream) => stream.write_vectored(&segments),
                    None => return Err(io::Error::new(io::ErrorKind::NotConnected, "conexión cerrada")),
                }
            };

            match result {
                Ok(0) => {
                    self.mapped = None;
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "writev escribió 0 bytes"));
                }
                Ok(n) => self.bytes_sent += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(WriteOutcome::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.mapped = None;
                    return Err(e);
                }
            }

            if self.bytes_sent >= self.bytes_to_send {
                let keep_alive = self.keep_alive;
                self.reset();
                return Ok(WriteOutcome::Done { keep_alive });
            }
        }
    }

    /// Cierra la conexión. Idempotente: solo la primera llamada tiene efecto.
    ///
    /// Retorna `true` si esta llamada fue la que cerró.
    pub fn close(&mut self, poller: &Poller, metrics: &MetricsCollector) -> bool {
        let Some(stream) = self.stream.take() else {
            return false;
        };

        if let Err(e) = poller.unregister(self.fd) {
            debug!(fd = self.fd, error = %e, "no se pudo quitar el descriptor del epoll");
        }
        drop(stream);
        self.mapped = None;
        metrics.connection_closed();

        debug!(fd = self.fd, peer = %self.peer, "conexión cerrada");
        true
    }

    /// Deja la conexión lista para el siguiente request
    fn reset(&mut self) {
        self.read_buf.fill(0);
        self.read_pos = 0;
        self.parser.reset();
        self.response.clear();
        self.mapped = None;
        self.bytes_to_send = 0;
        self.bytes_sent = 0;
        self.keep_alive = false;
        self.file_len = 0;
        self.status = None;
    }
}

/// Segmentos que faltan por enviar, derivados solo de cuántos bytes ya salieron.
pub fn pending_segments<'a>(header: &'a [u8], body: &'a [u8], sent: usize) -> [IoSlice<'a>; 2] {
    if sent < header.len() {
        [IoSlice::new(&header[sent..]), IoSlice::new(body)]
    } else {
        let offset = (sent - header.len()).min(body.len());
        [IoSlice::new(&body[offset..]), IoSlice::new(&[])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::unix::ffi::OsStringExt;
    use std::thread;
    use std::time::Duration;

    /// Conexión del lado servidor (no bloqueante) + socket del cliente
    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (Connection::new(server, peer), client)
    }

    /// Lee hasta tener `expected` bytes acumulados
    fn read_until(conn: &mut Connection, expected: usize) {
        for _ in 0..200 {
            conn.read().unwrap();
            if conn.read_pos() >= expected {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("solo llegaron {} de {} bytes", conn.read_pos(), expected);
    }

    fn drain(conn: &mut Connection) -> WriteOutcome {
        for _ in 0..200 {
            match conn.write().unwrap() {
                WriteOutcome::Pending => thread::sleep(Duration::from_millis(5)),
                done => return done,
            }
        }
        panic!("la respuesta nunca terminó de enviarse");
    }

    fn read_response(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.read_exact(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_read_without_data_would_block() {
        let (mut conn, _client) = pair();
        assert_eq!(conn.read().unwrap(), 0);
        assert_eq!(conn.read_pos(), 0);
    }

    #[test]
    fn test_peer_closed() {
        let (mut conn, client) = pair();
        drop(client);

        let mut result = conn.read();
        for _ in 0..200 {
            if result.is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
            result = conn.read();
        }
        assert!(matches!(result, Err(ReadError::PeerClosed)));
    }

    #[test]
    fn test_buffer_full_without_request_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut conn, mut client) = pair();
        client.write_all(&vec![b'a'; READ_BUFFER_SIZE + 10]).unwrap();

        read_until(&mut conn, READ_BUFFER_SIZE);
        assert_eq!(conn.read_pos(), READ_BUFFER_SIZE);
        // Lleno: read() ya no consume más, pero tampoco falla
        assert_eq!(conn.read().unwrap(), 0);
        assert_eq!(conn.process(dir.path()), ProcessOutcome::Failed);
    }

    /// Request de exactamente `len` bytes, rellenado con un header extra
    fn padded_request(len: usize) -> Vec<u8> {
        let head = b"GET /index.html HTTP/1.1\r\nX-Pad: ";
        let tail = b"\r\n\r\n";
        let mut request = head.to_vec();
        request.resize(len - tail.len(), b'a');
        request.extend_from_slice(tail);
        request
    }

    #[test]
    fn test_request_filling_whole_buffer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), b"hola").unwrap();
        std::fs::set_permissions(dir.path().join("index.html"), fs::Permissions::from_mode(0o644)).unwrap();

        let (mut conn, mut client) = pair();
        let request = padded_request(READ_BUFFER_SIZE);
        assert_eq!(request.len(), READ_BUFFER_SIZE);
        client.write_all(&request).unwrap();
        read_until(&mut conn, READ_BUFFER_SIZE);

        assert_eq!(conn.process(dir.path()), ProcessOutcome::Ready(StatusCode::FileOk));
        let total = conn.bytes_to_send();
        assert_eq!(drain(&mut conn), WriteOutcome::Done { keep_alive: false });

        let response = read_response(&mut client, total);
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(b"hola"));
    }

    #[test]
    fn test_partial_request_needs_more_data() {
        let dir = tempfile::tempdir().unwrap();
        let (mut conn, mut client) = pair();

        client.write_all(b"GET /index.html HT").unwrap();
        read_until(&mut conn, 18);
        assert_eq!(conn.process(dir.path()), ProcessOutcome::NeedMoreData);

        client.write_all(b"TP/1.1\r\n\r\n").unwrap();
        read_until(&mut conn, 28);
        assert_eq!(conn.process(dir.path()), ProcessOutcome::Ready(StatusCode::NotFound));
    }

    #[test]
    fn test_serves_file_with_keep_alive() {
        let dir = tempfile::tempdir().unwrap();
        let content = b"<html><body>hola mundo</body></html>";
        std::fs::write(dir.path().join("index.html"), content).unwrap();
        std::fs::set_permissions(dir.path().join("index.html"), fs::Permissions::from_mode(0o644)).unwrap();

        let (mut conn, mut client) = pair();
        let request = b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
        client.write_all(request).unwrap();
        read_until(&mut conn, request.len());

        assert_eq!(conn.process(dir.path()), ProcessOutcome::Ready(StatusCode::FileOk));
        let total = conn.bytes_to_send();
        assert_eq!(drain(&mut conn), WriteOutcome::Done { keep_alive: true });

        let response = read_response(&mut client, total);
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", content.len())));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(response.ends_with(content));

        // La conexión quedó lista para otro request
        assert_eq!(conn.read_pos(), 0);
        assert_eq!(conn.bytes_to_send(), 0);
        assert_eq!(conn.status(), None);
    }

    #[test]
    fn test_bad_request_never_keeps_alive() {
        let dir = tempfile::tempdir().unwrap();
        let (mut conn, mut client) = pair();
        let request = b"POST /x HTTP/1.1\r\nConnection: keep-alive\r\n\r\n";
        client.write_all(request).unwrap();
        read_until(&mut conn, request.len());

        assert_eq!(conn.process(dir.path()), ProcessOutcome::Ready(StatusCode::BadRequest));
        assert!(!conn.keep_alive());
        assert_eq!(drain(&mut conn), WriteOutcome::Done { keep_alive: false });
    }

    #[test]
    fn test_do_request_classification() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("privado.html"), b"secreto").unwrap();
        std::fs::set_permissions(dir.path().join("privado.html"), fs::Permissions::from_mode(0o600)).unwrap();
        std::fs::create_dir(dir.path().join("carpeta")).unwrap();
        std::fs::set_permissions(dir.path().join("carpeta"), fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("vacio.html"), b"").unwrap();
        std::fs::set_permissions(dir.path().join("vacio.html"), fs::Permissions::from_mode(0o644)).unwrap();

        let fifo = std::ffi::CString::new(dir.path().join("tuberia").into_os_string().into_vec()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(fifo.as_ptr(), 0o644) }, 0);
        std::fs::set_permissions(dir.path().join("tuberia"), fs::Permissions::from_mode(0o644)).unwrap();

        let cases: [(&[u8], StatusCode); 6] = [
            (b"GET /no-existe.html HTTP/1.1\r\n\r\n", StatusCode::NotFound),
            (b"GET /privado.html HTTP/1.1\r\n\r\n", StatusCode::Forbidden),
            (b"GET /carpeta HTTP/1.1\r\n\r\n", StatusCode::BadRequest),
            (b"GET /../etc/passwd HTTP/1.1\r\n\r\n", StatusCode::Forbidden),
            (b"GET /vacio.html HTTP/1.1\r\n\r\n", StatusCode::FileOk),
            (b"GET /tuberia HTTP/1.1\r\n\r\n", StatusCode::BadRequest),
        ];

        for (request, expected) in cases {
            let (mut conn, mut client) = pair();
            client.write_all(request).unwrap();
            read_until(&mut conn, request.len());
            assert_eq!(conn.process(dir.path()), ProcessOutcome::Ready(expected));
        }
    }

    #[test]
    fn test_path_too_long() {
        let dir = tempfile::tempdir().unwrap();
        let (mut conn, mut client) = pair();
        let request = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(FILENAME_LEN));
        client.write_all(request.as_bytes()).unwrap();
        read_until(&mut conn, request.len());
        assert_eq!(conn.process(dir.path()), ProcessOutcome::Ready(StatusCode::BadRequest));
    }

    #[test]
    fn test_pending_segments_from_sent_count() {
        let header = b"HEADER";
        let body = b"0123456789";

        let segs = pending_segments(header, body, 0);
        assert_eq!(&*segs[0], b"HEADER");
        assert_eq!(&*segs[1], b"0123456789");

        let segs = pending_segments(header, body, 4);
        assert_eq!(&*segs[0], b"ER");
        assert_eq!(&*segs[1], b"0123456789");

        let segs = pending_segments(header, body, 6);
        assert_eq!(&*segs[0], b"0123456789");
        assert!(segs[1].is_empty());

        let segs = pending_segments(header, body, 13);
        assert_eq!(&*segs[0], b"6789");

        let segs = pending_segments(header, &[], 2);
        assert_eq!(&*segs[0], b"ADER");
        assert!(segs[1].is_empty());
    }
}
