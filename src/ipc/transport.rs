//! Named-pipe endpoints.
//!
//! Each client owns two FIFOs (requests, responses); the server owns one
//! well-known FIFO for session setup. Opening a FIFO blocks until the peer
//! opens the other end, so each side opens its endpoints once per session
//! and keeps them open: reads then block on data instead of hitting EOF
//! between messages.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::error::{EmsError, Result};
use crate::ipc::codec::send_exact;
use crate::ipc::messages::CLIENT_PIPE_MAX_LEN;

/// Check that `path` fits in a fixed-width endpoint name field.
pub fn validate_endpoint_name(path: &Path) -> Result<&str> {
    let name = path
        .to_str()
        .ok_or_else(|| EmsError::EndpointName(format!("{} is not valid UTF-8", path.display())))?;
    if name.is_empty() {
        return Err(EmsError::EndpointName("empty endpoint name".into()));
    }
    if name.len() >= CLIENT_PIPE_MAX_LEN {
        return Err(EmsError::EndpointName(format!(
            "{} is {} bytes, limit is {}",
            name,
            name.len(),
            CLIENT_PIPE_MAX_LEN - 1
        )));
    }
    Ok(name)
}

/// Remove a FIFO (or any stale file) at `path`. Missing files are fine.
pub fn remove_fifo(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EmsError::Transport(format!("failed to remove {}: {}", path.display(), e))),
    }
}

/// Create a fresh FIFO at `path` (mode 0640), replacing whatever was there.
pub fn create_fifo(path: &Path) -> Result<()> {
    remove_fifo(path)?;
    mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP)
        .map_err(|e| EmsError::Transport(format!("failed to create fifo {}: {}", path.display(), e)))?;
    debug!("Created fifo {}", path.display());
    Ok(())
}

/// Open the read end. Blocks until a writer opens the FIFO.
pub fn open_reader(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| EmsError::Transport(format!("failed to open {} for reading: {}", path.display(), e)))
}

/// Open the write end. Blocks until a reader opens the FIFO.
pub fn open_writer(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| EmsError::Transport(format!("failed to open {} for writing: {}", path.display(), e)))
}

/// The server's well-known setup endpoint.
///
/// Opened read+write so the open never blocks and reads never see EOF
/// while no client is connected. The FIFO is removed on drop.
#[derive(Debug)]
pub struct ServerEndpoint {
    path: PathBuf,
    file: File,
}

impl ServerEndpoint {
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        create_fifo(&path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| EmsError::Transport(format!("failed to open server fifo {}: {}", path.display(), e)))?;
        info!("Server endpoint bound at {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Independent handle on the same open FIFO, used by the acceptor.
    pub fn try_clone_reader(&self) -> Result<File> {
        self.file
            .try_clone()
            .map_err(|e| EmsError::Transport(format!("failed to clone server fifo: {}", e)))
    }

    /// Push a single NUL byte through the FIFO to unblock a pending read.
    pub fn wake(&self) -> Result<()> {
        let mut writer = &self.file;
        send_exact(&mut writer, &[0])
    }
}

impl Drop for ServerEndpoint {
    fn drop(&mut self) {
        if let Err(e) = remove_fifo(&self.path) {
            warn!("Failed to remove server fifo: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::fs::FileTypeExt;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_validate_endpoint_name() {
        assert_eq!(validate_endpoint_name(Path::new("/tmp/req")).unwrap(), "/tmp/req");

        let max = format!("/{}", "a".repeat(CLIENT_PIPE_MAX_LEN - 2));
        assert!(validate_endpoint_name(Path::new(&max)).is_ok());

        let too_long = format!("/{}", "a".repeat(CLIENT_PIPE_MAX_LEN - 1));
        assert!(matches!(
            validate_endpoint_name(Path::new(&too_long)),
            Err(EmsError::EndpointName(_))
        ));
        assert!(validate_endpoint_name(Path::new("")).is_err());
    }

    #[test]
    fn test_create_fifo_replaces_stale_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("req");
        fs::write(&path, b"stale").unwrap();

        create_fifo(&path).unwrap();
        assert!(fs::metadata(&path).unwrap().file_type().is_fifo());

        remove_fifo(&path).unwrap();
        assert!(!path.exists());
        remove_fifo(&path).unwrap();
    }

    #[test]
    fn test_fifo_carries_bytes_between_threads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pipe");
        create_fifo(&path).unwrap();

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            let mut w = open_writer(&writer_path).unwrap();
            w.write_all(b"ping").unwrap();
        });

        let mut r = open_reader(&path).unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        writer.join().unwrap();
        assert_eq!(buf, b"ping");
    }

    #[test]
    fn test_server_endpoint_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("server");
        {
            let endpoint = ServerEndpoint::bind(&path).unwrap();
            assert_eq!(endpoint.path(), path.as_path());
            assert!(fs::metadata(&path).unwrap().file_type().is_fifo());

            // open for write does not block: the endpoint itself is a reader
            let mut w = open_writer(&path).unwrap();
            w.write_all(b"x").unwrap();
            let mut r = endpoint.try_clone_reader().unwrap();
            let mut b = [0u8; 1];
            r.read_exact(&mut b).unwrap();
            assert_eq!(&b, b"x");
        }
        assert!(!path.exists());
    }
}
