//! Output channel acquisition
//!
//! The output channel is a named pipe at a well-known path. It is created on
//! first use, reused by later sessions and never removed here.

use log::{debug, info};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use tokio::net::unix::pipe;

use crate::error::OutputError;

/// Creates the FIFO at `path` unless one is already there.
pub fn ensure_fifo(path: &Path) -> Result<(), OutputError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {
            debug!("Reusing output pipe {}", path.display());
            Ok(())
        }
        Ok(_) => Err(OutputError::NotAFifo(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            mkfifo(path, Mode::from_bits_truncate(0o666)).map_err(|errno| {
                OutputError::Create {
                    path: path.to_path_buf(),
                    source: io::Error::from(errno),
                }
            })?;
            info!("Created output pipe {}", path.display());
            Ok(())
        }
        Err(e) => Err(OutputError::Create {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Ensures the FIFO exists and opens it read-write.
///
/// Holding both ends means the open never waits for the transcoder to attach.
pub fn open_output(path: &Path) -> Result<pipe::Sender, OutputError> {
    ensure_fifo(path)?;
    pipe::OpenOptions::new()
        .read_write(true)
        .open_sender(path)
        .map_err(|source| OutputError::Open {
            path: path.to_path_buf(),
            source,
        })
}
