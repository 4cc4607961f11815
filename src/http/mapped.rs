//! # Archivo Mapeado en Memoria
//! src/http/mapped.rs
//!
//! Handle exclusivo sobre una región `mmap` de solo lectura. La región se
//! libera en `Drop`, así que se desmapea exactamente una vez sin importar
//! si la respuesta terminó bien, falló, o la conexión se cerró.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;

/// Región `PROT_READ`/`MAP_PRIVATE` de un archivo completo
#[derive(Debug)]
pub struct MappedFile {
    ptr: NonNull<u8>,
    len: usize,
}

// La región es de solo lectura y pertenece a un único dueño
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Abre `path` y mapea `len` bytes.
    ///
    /// `len` debe ser mayor que cero (`mmap` de cero bytes es inválido).
    pub fn open(path: &Path, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no se puede mapear un archivo vacío",
            ));
        }

        let file = File::open(path)?;

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };

        // El mapping sobrevive al cierre del descriptor
        drop(file);

        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap retornó NULL"))?;

        Ok(Self { ptr, len })
    }

    /// Contenido del archivo
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}
