//! A one-shot pipe used by a forked child to report setup failures to its parent.
//!
//! With close-on-exec enabled, a successful `exec` in the child closes the write end, so the
//! parent's read returns no data. A child that fails writes a message and exits instead, and the
//! parent reads that message.

use crate::Error;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};

/// The most bytes returned by a single [`Pipe::read`].
const CHUNK_SIZE: usize = 1024;

#[derive(Debug)]
pub struct Pipe {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl Pipe {
    /// Creates a new pipe, optionally marking both ends close-on-exec.
    pub fn new(close_on_exec: bool) -> Result<Self, Error> {
        let flags = if close_on_exec {
            OFlag::O_CLOEXEC
        } else {
            OFlag::empty()
        };

        let (read, write) = unistd::pipe2(flags).map_err(std::io::Error::from)?;

        // SAFETY: pipe2 just returned these descriptors and nothing else owns them.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) };

        Ok(Self {
            read: Some(read),
            write: Some(write),
        })
    }

    /// Closes the read end. Does nothing if it is already closed or released.
    pub fn close_read(&mut self) {
        self.read.take();
    }

    /// Closes the write end. Does nothing if it is already closed or released.
    pub fn close_write(&mut self) {
        self.write.take();
    }

    /// Hands ownership of the read end to the caller.
    pub fn release_read(&mut self) -> Option<OwnedFd> {
        self.read.take()
    }

    /// Hands ownership of the write end to the caller.
    pub fn release_write(&mut self) -> Option<OwnedFd> {
        self.write.take()
    }

    /// Blocks until data is available or every write end is closed. An empty result means the
    /// writers went away without sending anything.
    pub fn read(&mut self) -> Result<Vec<u8>, Error> {
        let fd = self.read.as_ref().ok_or_else(closed_end)?;
        let mut buffer = [0u8; CHUNK_SIZE];

        let size = loop {
            match unistd::read(fd.as_raw_fd(), &mut buffer) {
                Err(Errno::EINTR) => continue,
                result => break result.map_err(std::io::Error::from)?,
            }
        };

        Ok(buffer[..size].to_vec())
    }

    /// Writes the whole message, blocking as needed.
    pub fn write(&mut self, mut bytes: &[u8]) -> Result<(), Error> {
        let fd = self.write.as_ref().ok_or_else(closed_end)?;

        while !bytes.is_empty() {
            match unistd::write(fd.as_raw_fd(), bytes) {
                Ok(size) => bytes = &bytes[size..],
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(std::io::Error::from(errno).into()),
            }
        }

        Ok(())
    }
}

fn closed_end() -> Error {
    std::io::Error::from(Errno::EBADF).into()
}
