//! # Interfaz de Readiness (epoll)
//! src/server/poller.rs
//!
//! Envoltorio delgado sobre `epoll`. Los sockets de conexión se registran
//! edge-triggered y one-shot: después de cada evento el descriptor queda
//! desarmado hasta que alguien llame `modify`, así que un solo thread a la
//! vez lo maneja.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Interés con el que se re-arma un descriptor one-shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn flags(self) -> u32 {
        match self {
            Interest::Readable => libc::EPOLLIN as u32,
            Interest::Writable => libc::EPOLLOUT as u32,
        }
    }
}

/// Un evento de readiness ya copiado del buffer del kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub fd: RawFd,
    pub flags: u32,
}

impl Event {
    pub fn is_readable(&self) -> bool {
        self.flags & libc::EPOLLIN as u32 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.flags & libc::EPOLLOUT as u32 != 0
    }

    /// Error o hang-up del socket
    pub fn is_error(&self) -> bool {
        self.flags & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0
    }

    /// El peer cerró su lado de escritura
    pub fn is_read_closed(&self) -> bool {
        self.flags & libc::EPOLLRDHUP as u32 != 0
    }
}

/// Buffer reutilizable para `epoll_wait`
pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.buf[..self.len].iter().map(|raw| {
            // Copias por valor: la estructura es packed en x86_64
            let flags = raw.events;
            let data = raw.u64;
            Event {
                fd: data as RawFd,
                flags,
            }
        })
    }
}

/// Descriptor de epoll
#[derive(Debug)]
pub struct Poller {
    epfd: OwnedFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epfd: unsafe { OwnedFd::from_raw_fd(epfd) },
        })
    }

    /// Registra `fd` para lectura y lo pone en modo no bloqueante.
    ///
    /// Con `one_shot` queda edge-triggered y se desarma tras cada evento.
    pub fn register(&self, fd: RawFd, one_shot: bool) -> io::Result<()> {
        let mut flags = (libc::EPOLLIN | libc::EPOLLRDHUP) as u32;
        if one_shot {
            flags |= (libc::EPOLLET | libc::EPOLLONESHOT) as u32;
        }
        self.ctl(libc::EPOLL_CTL_ADD, fd, flags)?;
        set_nonblocking(fd)
    }

    /// Re-arma un descriptor one-shot con el interés indicado
    pub fn modify(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let flags = interest.flags() | (libc::EPOLLET | libc::EPOLLONESHOT | libc::EPOLLRDHUP) as u32;
        self.ctl(libc::EPOLL_CTL_MOD, fd, flags)
    }

    /// Quita el descriptor del conjunto de interés
    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe {
            libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Espera sin timeout hasta que haya eventos. `EINTR` se reintenta.
    pub fn wait(&self, events: &mut Events) -> io::Result<usize> {
        let capacity = i32::try_from(events.buf.len()).unwrap_or(i32::MAX);
        loop {
            let n = unsafe {
                libc::epoll_wait(self.epfd.as_raw_fd(), events.buf.as_mut_ptr(), capacity, -1)
            };
            if n >= 0 {
                events.len = n as usize;
                return Ok(events.len);
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                events.len = 0;
                return Err(err);
            }
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: flags,
            u64: fd as u64,
        };
        let rc = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// `O_NONBLOCK` vía `fcntl`
fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    /// `epoll_wait` con timeout corto para no colgar los tests
    fn poll_once(poller: &Poller, events: &mut Events, timeout_ms: i32) -> usize {
        let n = unsafe {
            libc::epoll_wait(
                poller.epfd.as_raw_fd(),
                events.buf.as_mut_ptr(),
                events.buf.len() as i32,
                timeout_ms,
            )
        };
        events.len = n.max(0) as usize;
        events.len
    }

    #[test]
    fn test_register_sets_nonblocking() {
        let poller = Poller::new().unwrap();
        let (server, _client) = socket_pair();
        poller.register(server.as_raw_fd(), true).unwrap();

        let flags = unsafe { libc::fcntl(server.as_raw_fd(), libc::F_GETFL) };
        assert!(flags & libc::O_NONBLOCK != 0);
    }

    #[test]
    fn test_readable_event_carries_fd() {
        let poller = Poller::new().unwrap();
        let (server, mut client) = socket_pair();
        poller.register(server.as_raw_fd(), true).unwrap();

        client.write_all(b"hola").unwrap();

        let mut events = Events::with_capacity(8);
        assert_eq!(poll_once(&poller, &mut events, 1000), 1);
        let event = events.iter().next().unwrap();
        assert_eq!(event.fd, server.as_raw_fd());
        assert!(event.is_readable());
        assert!(!event.is_error());
    }

    #[test]
    fn test_one_shot_disarms_until_modify() {
        let poller = Poller::new().unwrap();
        let (server, mut client) = socket_pair();
        poller.register(server.as_raw_fd(), true).unwrap();

        client.write_all(b"uno").unwrap();
        let mut events = Events::with_capacity(8);
        assert_eq!(poll_once(&poller, &mut events, 1000), 1);

        // Desarmado: más datos no generan otro evento
        client.write_all(b"dos").unwrap();
        assert_eq!(poll_once(&poller, &mut events, 50), 0);

        poller.modify(server.as_raw_fd(), Interest::Readable).unwrap();
        assert_eq!(poll_once(&poller, &mut events, 1000), 1);
    }

    #[test]
    fn test_modify_for_writable() {
        let poller = Poller::new().unwrap();
        let (server, _client) = socket_pair();
        poller.register(server.as_raw_fd(), true).unwrap();
        poller.modify(server.as_raw_fd(), Interest::Writable).unwrap();

        let mut events = Events::with_capacity(8);
        assert_eq!(poll_once(&poller, &mut events, 1000), 1);
        assert!(events.iter().next().unwrap().is_writable());
    }

    #[test]
    fn test_unregister() {
        let poller = Poller::new().unwrap();
        let (server, mut client) = socket_pair();
        poller.register(server.as_raw_fd(), false).unwrap();
        poller.unregister(server.as_raw_fd()).unwrap();

        client.write_all(b"hola").unwrap();
        let mut events = Events::with_capacity(8);
        assert_eq!(poll_once(&poller, &mut events, 50), 0);

        // Quitarlo dos veces es un error del kernel
        assert!(poller.unregister(server.as_raw_fd()).is_err());
    }
}
