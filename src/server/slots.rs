//! # Tabla de Conexiones
//! src/server/slots.rs
//!
//! Arena acotada indexada por descriptor. Cada slot tiene su propio
//! `Mutex`, que es el guard exclusivo de la conexión: quien lo tiene es el
//! único que toca sus buffers, y lo suelta solo después de re-armar el
//! descriptor en el epoll.

use crate::http::Connection;
use std::os::unix::io::RawFd;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type Slot = Option<Box<Connection>>;

#[derive(Debug)]
pub struct ConnTable {
    slots: Box<[Mutex<Slot>]>,
}

impl ConnTable {
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<Mutex<Slot>> = (0..capacity).map(|_| Mutex::new(None)).collect();
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// `true` si el descriptor cabe en la tabla
    pub fn contains(&self, fd: RawFd) -> bool {
        usize::try_from(fd).map_or(false, |index| index < self.slots.len())
    }

    /// Toma el guard del slot de `fd`. `None` si está fuera de rango.
    ///
    /// Un slot envenenado por un pánico se recupera tal cual.
    pub fn lock(&self, fd: RawFd) -> Option<MutexGuard<'_, Slot>> {
        let index = usize::try_from(fd).ok()?;
        let slot = self.slots.get(index)?;
        Some(slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Descriptores con una conexión instalada
    pub fn occupied(&self) -> Vec<RawFd> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .map(|(index, _)| index as RawFd)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_bounds() {
        let table = ConnTable::new(4);
        assert_eq!(table.capacity(), 4);
        assert!(table.contains(0));
        assert!(table.contains(3));
        assert!(!table.contains(4));
        assert!(!table.contains(-1));
        assert!(table.lock(4).is_none());
        assert!(table.lock(-1).is_none());
    }

    #[test]
    fn test_install_and_take() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        let fd = stream.as_raw_fd();

        let table = ConnTable::new(fd as usize + 1);
        *table.lock(fd).unwrap() = Some(Box::new(Connection::new(stream, peer)));
        assert_eq!(table.occupied(), vec![fd]);

        let conn = table.lock(fd).unwrap().take().unwrap();
        assert_eq!(conn.fd(), fd);
        assert!(table.occupied().is_empty());
    }

    #[test]
    fn test_slot_guard_is_exclusive() {
        let table = Arc::new(ConnTable::new(1));
        let inside = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                let inside = Arc::clone(&inside);
                let overlap = Arc::clone(&overlap);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = table.lock(0).unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlap.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_poisoned_slot_is_recovered() {
        let table = Arc::new(ConnTable::new(1));
        {
            let table = Arc::clone(&table);
            let _ = thread::spawn(move || {
                let _guard = table.lock(0).unwrap();
                panic!("pánico con el slot tomado");
            })
            .join();
        }
        assert!(table.lock(0).unwrap().is_none());
    }
}
