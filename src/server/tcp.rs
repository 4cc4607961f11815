//! # Servidor TCP Orientado a Eventos
//! src/server/tcp.rs
//!
//! Un solo thread (el reactor) espera readiness sobre todos los sockets y
//! hace únicamente I/O no bloqueante. El parseo y la composición de la
//! respuesta corren en el pool de workers.
//!
//! ## Ciclo de una conexión
//!
//! ```text
//! accept ─► register(EPOLLIN, one-shot)
//!   EPOLLIN  ─► read() ─► submit(ConnTask) ─► worker: process()
//!                                              ├─ incompleto ─► modify(IN)
//!                                              └─ listo ──────► modify(OUT)
//!   EPOLLOUT ─► write() ─┬─ pendiente ─► modify(OUT)
//!                        ├─ keep-alive ─► modify(IN)
//!                        └─ close
//! ```
//!
//! Como los descriptores son one-shot, ningún otro evento llega mientras
//! alguien trabaja sobre la conexión. El guard del slot se suelta siempre
//! después de re-armar.

use super::poller::{Event, Events, Interest, Poller};
use super::slots::{ConnTable, Slot};
use super::waker::Waker;
use crate::config::Config;
use crate::error::ServerError;
use crate::http::{Connection, ProcessOutcome, WriteOutcome};
use crate::metrics::MetricsCollector;
use crate::workers::{Task, TaskPool};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tamaño de la tabla de slots (descriptores válidos: `0..MAX_FD`)
pub const MAX_FD: usize = 65536;

/// Mensaje que recibe un cliente rechazado
const BUSY_MESSAGE: &[u8] = b"Server busy";

/// Estado compartido entre el reactor y los workers
#[derive(Debug)]
pub struct ServerShared {
    pub poller: Poller,
    pub table: ConnTable,
    pub metrics: MetricsCollector,
    pub doc_root: PathBuf,
    pub max_connections: usize,
    #[cfg(test)]
    occupancy: tests::Occupancy,
}

impl ServerShared {
    /// Cierra y saca la conexión del slot, si hay una
    fn close_slot(&self, slot: &mut Slot) {
        if let Some(mut conn) = slot.take() {
            conn.close(&self.poller, &self.metrics);
        }
    }

    /// Re-arma el descriptor; si el kernel lo rechaza, cierra
    fn rearm(&self, slot: &mut Slot, fd: RawFd, interest: Interest) {
        if let Err(e) = self.poller.modify(fd, interest) {
            warn!(fd, ?interest, error = %e, "no se pudo re-armar el descriptor");
            self.close_slot(slot);
        }
    }
}

/// Una conexión con datos nuevos, lista para que un worker la procese
pub struct ConnTask {
    fd: RawFd,
    shared: Arc<ServerShared>,
}

impl Task for ConnTask {
    fn process(self) {
        let shared = &self.shared;
        let Some(mut slot) = shared.table.lock(self.fd) else {
            return;
        };
        #[cfg(test)]
        let _inside = shared.occupancy.enter(self.fd);

        let outcome = match slot.as_mut() {
            Some(conn) => panic::catch_unwind(AssertUnwindSafe(|| conn.process(&shared.doc_root))),
            None => return,
        };

        match outcome {
            Ok(ProcessOutcome::NeedMoreData) => shared.rearm(&mut slot, self.fd, Interest::Readable),
            Ok(ProcessOutcome::Ready(status)) => {
                shared.metrics.record_response(status);
                shared.rearm(&mut slot, self.fd, Interest::Writable);
            }
            Ok(ProcessOutcome::Failed) => shared.close_slot(&mut slot),
            Err(_) => {
                error!(fd = self.fd, "pánico procesando la conexión");
                shared.close_slot(&mut slot);
            }
        }
    }
}

/// Permite detener un servidor que corre en otro thread
#[derive(Debug, Clone)]
pub struct ServerHandle {
    waker: Arc<Waker>,
}

impl ServerHandle {
    /// Pide al reactor que termine
    pub fn shutdown(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

/// Servidor HTTP/1.1 de archivos estáticos
pub struct Server {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<ServerShared>,
    waker: Arc<Waker>,
    pool: TaskPool<ConnTask>,
}

impl Server {
    /// Valida la configuración, hace bind y arranca el pool
    pub fn bind(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        let address = config.address();
        let listener = TcpListener::bind(&address).map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
        set_backlog(listener.as_raw_fd(), config.backlog)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let poller = Poller::new()?;
        poller.register(listener.as_raw_fd(), false)?;

        let waker = Arc::new(Waker::new()?);
        poller.register(waker.fd(), false)?;

        let pool = TaskPool::new(config.workers, config.max_tasks)?;

        let shared = Arc::new(ServerShared {
            poller,
            table: ConnTable::new(MAX_FD),
            metrics: MetricsCollector::new(),
            doc_root: config.doc_root.clone(),
            max_connections: config.max_connections,
            #[cfg(test)]
            occupancy: tests::Occupancy::new(MAX_FD),
        });

        info!(address = %local_addr, doc_root = %config.doc_root.display(), "servidor escuchando");

        Ok(Self {
            config,
            listener,
            local_addr,
            shared,
            waker,
            pool,
        })
    }

    /// Dirección real del listener (útil con puerto 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            waker: Arc::clone(&self.waker),
        }
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.shared.metrics.clone()
    }

    /// Loop del reactor. Retorna cuando se llama `ServerHandle::shutdown`.
    pub fn run(mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(self.config.max_events);
        info!(
            workers = self.pool.workers(),
            max_tasks = self.pool.capacity(),
            "reactor iniciado"
        );

        let result = loop {
            if let Err(e) = self.shared.poller.wait(&mut events) {
                error!(error = %e, "falló la espera de eventos");
                break Err(ServerError::Io(e));
            }

            let mut stop = false;
            for event in events.iter() {
                if event.fd == self.waker.fd() {
                    self.waker.drain();
                    stop = true;
                    continue;
                }
                self.dispatch(event);
            }

            if stop {
                break Ok(());
            }
        };

        self.stop();
        result
    }

    fn dispatch(&self, event: Event) {
        if event.fd == self.listener.as_raw_fd() {
            self.accept();
            return;
        }

        let shared = &self.shared;
        let Some(mut slot) = shared.table.lock(event.fd) else {
            return;
        };
        let Some(conn) = slot.as_mut() else {
            return;
        };
        #[cfg(test)]
        let _inside = shared.occupancy.enter(event.fd);

        if event.is_error() {
            debug!(fd = event.fd, "error o hang-up en el socket");
            shared.close_slot(&mut slot);
        } else if event.is_readable() {
            match conn.read() {
                Ok(_) => self.submit(&mut slot, event.fd),
                Err(e) => {
                    debug!(fd = event.fd, error = %e, "lectura terminó la conexión");
                    shared.close_slot(&mut slot);
                }
            }
        } else if event.is_writable() {
            let to_send = conn.bytes_to_send();
            let before = conn.bytes_sent();

            match conn.write() {
                Ok(WriteOutcome::Pending) => {
                    shared.metrics.add_bytes_sent(conn.bytes_sent() - before);
                    shared.rearm(&mut slot, event.fd, Interest::Writable);
                }
                Ok(WriteOutcome::Done { keep_alive }) => {
                    shared.metrics.add_bytes_sent(to_send - before);
                    if keep_alive {
                        shared.rearm(&mut slot, event.fd, Interest::Readable);
                    } else {
                        shared.close_slot(&mut slot);
                    }
                }
                Err(e) => {
                    debug!(fd = event.fd, error = %e, "escritura terminó la conexión");
                    shared.close_slot(&mut slot);
                }
            }
        } else if event.is_read_closed() {
            shared.close_slot(&mut slot);
        }
    }

    /// Entrega la conexión al pool; si la cola está llena, se cierra
    fn submit(&self, slot: &mut Slot, fd: RawFd) {
        let task = ConnTask {
            fd,
            shared: Arc::clone(&self.shared),
        };

        if let Err(e) = self.pool.submit(task) {
            warn!(fd, error = %e, "tarea descartada, cerrando la conexión");
            self.shared.metrics.task_dropped();
            self.shared.close_slot(slot);
        }
    }

    /// Acepta una conexión pendiente (el listener es level-triggered)
    fn accept(&self) {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!(error = %e, "error al aceptar conexión");
                return;
            }
        };

        let shared = &self.shared;
        let fd = stream.as_raw_fd();

        if shared.metrics.live_connections() >= shared.max_connections || !shared.table.contains(fd) {
            shared.metrics.connection_rejected();
            reject_busy(stream, peer);
            return;
        }

        let Some(mut slot) = shared.table.lock(fd) else {
            return;
        };
        if let Err(e) = shared.poller.register(fd, true) {
            warn!(fd, %peer, error = %e, "no se pudo registrar la conexión");
            return;
        }

        *slot = Some(Box::new(Connection::new(stream, peer)));
        shared.metrics.connection_accepted();
        debug!(fd, %peer, "nueva conexión");
    }

    /// Detiene el pool y libera las conexiones que siguen vivas
    fn stop(&mut self) {
        self.pool.shutdown();

        let open = self.shared.table.occupied();
        for fd in &open {
            if let Some(mut slot) = self.shared.table.lock(*fd) {
                self.shared.close_slot(&mut slot);
            }
        }

        info!(closed = open.len(), "servidor detenido");
        info!(metrics = %self.shared.metrics.to_json(), "métricas finales");
    }
}

/// Ajusta el backlog de un socket que ya escucha.
///
/// `TcpListener::bind` hace su propio `listen`; en Linux un segundo
/// `listen` sobre el mismo socket solo cambia el largo de la cola.
fn set_backlog(fd: RawFd, backlog: u32) -> io::Result<()> {
    let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
    if unsafe { libc::listen(fd, backlog) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Responde "Server busy" y cierra
fn reject_busy(mut stream: TcpStream, peer: SocketAddr) {
    warn!(%peer, "servidor ocupado, conexión rechazada");
    if let Err(e) = stream.write_all(BUSY_MESSAGE) {
        debug!(%peer, error = %e, "no se pudo avisar el rechazo");
    }
}
