//! Sysfs-style device interface: path construction and fixed-layout
//! positional reads/writes against a byte-addressable file backend
//! (spec §6.2). Rooted at a caller-supplied path rather than hard-coded to
//! `/sys/devices/acm` so tests can point it at a `tempfile::tempdir()`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use log::{error, trace};

use crate::error::AcmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdir {
    ConfigBin,
    Status,
    ControlBin,
    Error,
    Diag,
}

impl Subdir {
    fn name(self) -> &'static str {
        match self {
            Subdir::ConfigBin => "config_bin",
            Subdir::Status => "status",
            Subdir::ControlBin => "control_bin",
            Subdir::Error => "error",
            Subdir::Diag => "diag",
        }
    }
}

pub struct DeviceInterface {
    root: PathBuf,
}

impl DeviceInterface {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DeviceInterface { root: root.into() }
    }

    pub fn path(&self, subdir: Subdir, file: &str) -> PathBuf {
        self.root.join(subdir.name()).join(file)
    }

    fn open_rw(&self, subdir: Subdir, file: &str) -> io::Result<File> {
        let path = self.path(subdir, file);
        OpenOptions::new().read(true).write(true).open(path)
    }

    /// Writes `data` at `offset` within `subdir/file` using positional I/O,
    /// mirroring the original's `pwrite` usage so concurrent table writes
    /// to disjoint regions of the same file never need a shared seek.
    /// `create(true)` is a no-op against the real sysfs nodes (already
    /// present before the library ever opens them) and is what lets a
    /// `tempfile::tempdir()` stand in for that tree in tests without
    /// pre-touching every fixed-layout table file by hand.
    pub fn write_at(&self, subdir: Subdir, file: &str, offset: u64, data: &[u8]) -> Result<(), AcmError> {
        let path = self.path(subdir, file);
        let handle = OpenOptions::new().read(true).write(true).create(true).open(path).map_err(|e| map_io_error(subdir, file, e))?;
        handle.write_at(data, offset).map_err(|e| map_io_error(subdir, file, e))?;
        trace!("wrote {} bytes to {}/{} at offset {}", data.len(), subdir.name(), file, offset);
        Ok(())
    }

    pub fn read_at(&self, subdir: Subdir, file: &str, offset: u64, buf: &mut [u8]) -> Result<(), AcmError> {
        let handle = self.open_rw(subdir, file).map_err(|e| map_io_error(subdir, file, e))?;
        handle.read_exact_at(buf, offset).map_err(|e| map_io_error(subdir, file, e))?;
        Ok(())
    }

    /// Reads a short text-format scalar file (e.g. `status/msgbuf_count`),
    /// trimming whitespace, and parses it with `FromStr`. Returns `None` if
    /// the file is absent or the contents can't be parsed, matching the
    /// diagnostic/partial-failure convention of spec §7.
    pub fn read_text_scalar<T: std::str::FromStr>(&self, subdir: Subdir, file: &str) -> Option<T> {
        let path = self.path(subdir, file);
        let contents = std::fs::read_to_string(&path).ok()?;
        contents.trim().parse().ok()
    }

    pub fn write_text_scalar(&self, subdir: Subdir, file: &str, value: impl std::fmt::Display) -> Result<(), AcmError> {
        let path = self.path(subdir, file);
        std::fs::write(&path, format!("{value}")).map_err(|e| map_io_error(subdir, file, e))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn map_io_error(subdir: Subdir, file: &str, err: io::Error) -> AcmError {
    let errno = err.raw_os_error().unwrap_or(5); // default EIO
    error!("device I/O failed on {}/{}: {}", subdir.name(), file, err);
    AcmError::DeviceIo(errno)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tree() -> (tempfile::TempDir, DeviceInterface) {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["config_bin", "status", "control_bin", "error", "diag"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }
        let device = DeviceInterface::new(dir.path());
        (dir, device)
    }

    #[test]
    fn write_then_read_at_offset_round_trips() {
        let (_dir, device) = make_tree();
        let path = device.path(Subdir::ConfigBin, "sched_tab_row");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        device.write_at(Subdir::ConfigBin, "sched_tab_row", 8, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        device.read_at(Subdir::ConfigBin, "sched_tab_row", 8, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn write_at_creates_a_table_file_that_does_not_exist_yet() {
        // Real sysfs nodes always pre-exist; this is what lets a tempdir
        // stand in for that tree without pre-touching every table file.
        let (_dir, device) = make_tree();
        device.write_at(Subdir::ConfigBin, "m0_const_buffer", 0, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 3];
        device.read_at(Subdir::ConfigBin, "m0_const_buffer", 0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn reading_a_missing_file_maps_to_device_io_error() {
        let (_dir, device) = make_tree();
        let mut buf = [0u8; 4];
        let err = device.read_at(Subdir::ConfigBin, "does_not_exist", 0, &mut buf).unwrap_err();
        assert!(matches!(err, AcmError::DeviceIo(_)));
    }

    #[test]
    fn text_scalar_parses_trimmed_content() {
        let (_dir, device) = make_tree();
        device.write_text_scalar(Subdir::Status, "msgbuf_count", 32).unwrap();
        let value: Option<u32> = device.read_text_scalar(Subdir::Status, "msgbuf_count");
        assert_eq!(value, Some(32));
    }
}
