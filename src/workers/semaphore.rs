//! # Semáforo Contador
//! src/workers/semaphore.rs
//!
//! `wait` bloquea mientras el contador es cero; `post` lo incrementa y
//! despierta a un thread. Cada `post` corresponde a exactamente un `wait`.

use std::sync::{Condvar, Mutex, PoisonError};

/// Semáforo contador sobre `Mutex` + `Condvar`
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Crea un semáforo con un valor inicial
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    /// Decrementa el contador, bloqueando mientras sea cero
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count == 0 {
            count = self.condvar.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// Incrementa el contador y despierta a un thread en espera
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        self.condvar.notify_one();
    }

    /// Valor actual del contador
    pub fn value(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_initial_value() {
        let sem = Semaphore::new(3);
        assert_eq!(sem.value(), 3);
        sem.wait();
        assert_eq!(sem.value(), 2);
    }

    #[test]
    fn test_wait_blocks_until_post() {
        let sem = Arc::new(Semaphore::new(0));
        let woke = Arc::new(AtomicUsize::new(0));

        let handle = {
            let sem = Arc::clone(&sem);
            let woke = Arc::clone(&woke);
            thread::spawn(move || {
                sem.wait();
                woke.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(woke.load(Ordering::SeqCst), 0);

        sem.post();
        handle.join().unwrap();
        assert_eq!(woke.load(Ordering::SeqCst), 1);
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_each_post_wakes_one_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.wait())
            })
            .collect();

        for _ in 0..4 {
            sem.post();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sem.value(), 0);
    }
}
