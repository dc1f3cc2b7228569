//! Command input pipe: a world-writable FIFO polled without blocking.
//!
//! A single byte `'s'` asks the supervisor for an orderly stop; anything
//! else is ignored.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::AcqError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
}

pub struct CommandPipe {
    pipe: File,
}

impl CommandPipe {
    /// Create the FIFO if it does not exist yet (it normally does not on
    /// start, the pipe lives on a RAM disk), then open it non-blocking.
    pub fn create_and_open(path: &Path) -> Result<Self, AcqError> {
        if !path.exists() {
            mkfifo(path, 0o777).map_err(AcqError::PipeCreate)?;
        }
        let pipe = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(AcqError::PipeOpen)?;
        Ok(Self { pipe })
    }

    /// Non-blocking poll; never suspends.
    pub fn poll(&mut self) -> Option<Command> {
        let mut buf = [0u8; 1];
        match self.pipe.read(&mut buf) {
            Ok(1) if buf[0] == b's' => Some(Command::Stop),
            _ => None,
        }
    }
}

fn mkfifo(path: &Path, mode: libc::mode_t) -> io::Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    if unsafe { libc::mkfifo(cpath.as_ptr(), mode) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn stop_byte_is_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd_server");
        let mut pipe = CommandPipe::create_and_open(&path).unwrap();

        // Nothing written yet: poll must not block or fire.
        assert_eq!(pipe.poll(), None);

        // A writer shows up and sends the stop byte.
        let mut writer = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .unwrap();
        writer.write_all(b"s").unwrap();
        assert_eq!(pipe.poll(), Some(Command::Stop));

        // Unknown bytes are swallowed.
        writer.write_all(b"x").unwrap();
        assert_eq!(pipe.poll(), None);
    }

    #[test]
    fn existing_fifo_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd_server");
        drop(CommandPipe::create_and_open(&path).unwrap());
        assert!(CommandPipe::create_and_open(&path).is_ok());
    }
}
