//! WAL channel over a raw block device or a preallocated file.

use super::staging::StagingPool;
use super::{CapacityReader, WalChannel};
use crate::config::WalChannelConfig;
use crate::error::{Error, Result};
use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::ops::Range;
use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use strata_core::align::{aligned_range, is_aligned, BLOCK_SIZE};
use strata_observability::metrics::{WAL_IO_ERRORS_TOTAL, WAL_READ_BYTES_TOTAL, WAL_WRITE_BYTES_TOTAL};
use tracing::{debug, info, warn};

/// What the WAL path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Regular file, created and sized on first open
    File,

    /// Raw block device
    BlockDevice,
}

/// WAL channel doing aligned direct I/O against a block device or file.
pub struct BlockDeviceChannel {
    path: PathBuf,

    /// Requested capacity. `None` in recovery mode, where storage decides.
    capacity_want: Option<u64>,

    config: WalChannelConfig,

    kind: DeviceKind,

    /// Negotiated capacity, resolved once per open
    capacity_fact: Option<u64>,

    file: Option<File>,

    staging: StagingPool,

    /// Read-modify-write for unaligned positions. Test harnesses only.
    unaligned_write: bool,

    /// Treat a regular file as a raw device. Test harnesses only.
    #[cfg(any(test, feature = "test-util"))]
    simulated_device: Option<SimulatedDevice>,
}

/// A regular file standing in for a block device, reporting `capacity`
/// from the capacity query, or failing it when `None`.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy)]
struct SimulatedDevice {
    capacity: Option<u64>,
}

impl BlockDeviceChannel {
    /// Create a channel for `path`. Nothing is touched on disk until `open`.
    ///
    /// Outside recovery mode `capacity_want` must be positive and block
    /// aligned. In recovery mode it is ignored.
    pub fn new(path: impl AsRef<Path>, capacity_want: u64, config: WalChannelConfig) -> Result<Self> {
        let capacity_want = if config.recovery_mode {
            None
        } else {
            if capacity_want == 0 || !is_aligned(capacity_want) {
                return Err(Error::InvalidCapacity(capacity_want));
            }
            Some(capacity_want)
        };

        let staging = StagingPool::new(
            config.init_staging_buffer_size,
            config.max_staging_buffer_size,
        );

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            capacity_want,
            config,
            kind: DeviceKind::File,
            capacity_fact: None,
            file: None,
            staging,
            unaligned_write: false,
            #[cfg(any(test, feature = "test-util"))]
            simulated_device: None,
        })
    }

    /// Check whether `O_DIRECT` can be used for `path`.
    ///
    /// Returns `None` if available, otherwise the reason it is not.
    pub fn check_available(path: impl AsRef<Path>) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            let path = path.as_ref();
            let (probe, created) = if path.exists() {
                (path.to_path_buf(), false)
            } else {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."));
                (dir.join(".strata-direct-io-probe"), true)
            };

            let result = OpenOptions::new()
                .read(true)
                .write(true)
                .create(created)
                .custom_flags(libc::O_DIRECT)
                .open(&probe);
            if created {
                let _ = std::fs::remove_file(&probe);
            }

            match result {
                Ok(_) => None,
                Err(e) => Some(format!("O_DIRECT not supported for {:?}: {}", path, e)),
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            let _ = path;
            Some("O_DIRECT not supported on this platform".to_string())
        }
    }

    /// Enable read-modify-write for unaligned writes.
    ///
    /// Not crash-atomic beyond a single block, so it only exists in test builds.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_unaligned_write(&mut self, enabled: bool) {
        self.unaligned_write = enabled;
    }

    /// Open the (regular file) path as if it were a block device whose
    /// capacity query returns `capacity`, or fails when `None`.
    #[cfg(any(test, feature = "test-util"))]
    pub fn simulate_block_device(&mut self, capacity: Option<u64>) {
        self.simulated_device = Some(SimulatedDevice { capacity });
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn is_recovery_mode(&self) -> bool {
        self.config.recovery_mode
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Number of live staging buffers. Each worker thread holds at most one,
    /// freed when the thread exits.
    pub fn staging_buffer_count(&self) -> usize {
        self.staging.len()
    }

    /// Capacity of the calling worker's staging buffer, if it has one.
    pub fn staging_buffer_capacity(&self) -> Option<usize> {
        self.staging.current_capacity()
    }

    // ---- Open helpers ----

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(target_os = "linux")]
        {
            if self.config.direct_io {
                options.custom_flags(libc::O_DIRECT);
            }
        }
        options
    }

    /// Existing regular file: its length is the capacity.
    fn check_existing_file(&mut self, len: u64) -> Result<()> {
        if let Some(want) = self.capacity_want {
            if want != len {
                return Err(Error::CapacityMismatch {
                    path: self.path.clone(),
                    want,
                    actual: len,
                });
            }
        }
        self.capacity_fact = Some(len);
        Ok(())
    }

    /// Missing file: create and size it, unless recovering.
    fn create_file(&mut self) -> Result<()> {
        let Some(want) = self.capacity_want else {
            return Err(Error::NotInitialized {
                path: self.path.clone(),
                reason: "file does not exist".to_string(),
            });
        };

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        file.set_len(want)?;
        file.sync_all()?;

        debug!(path = ?self.path, capacity = want, "Created WAL file");
        self.capacity_fact = Some(want);
        Ok(())
    }

    fn is_block_device(&self, meta: &Metadata) -> bool {
        #[cfg(any(test, feature = "test-util"))]
        {
            if self.simulated_device.is_some() && meta.is_file() {
                return true;
            }
        }
        meta.file_type().is_block_device()
    }

    fn query_device_capacity(&self) -> io::Result<u64> {
        #[cfg(any(test, feature = "test-util"))]
        {
            if let Some(device) = self.simulated_device {
                return device.capacity.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "capacity query not supported")
                });
            }
        }
        device_capacity(&self.path)
    }

    /// Block device: the requested capacity must fit on the device.
    fn check_device_capacity(&self) -> Result<()> {
        match self.query_device_capacity() {
            Ok(actual) => {
                if let Some(want) = self.capacity_want {
                    if want > actual {
                        return Err(Error::CapacityMismatch {
                            path: self.path.clone(),
                            want,
                            actual,
                        });
                    }
                }
            }
            Err(e) => {
                warn!(
                    path = ?self.path,
                    error = %e,
                    "Failed to get block device capacity, skipping check"
                );
            }
        }
        Ok(())
    }

    /// Validate against the persisted header and resolve the fact capacity.
    fn check_capacity(&mut self, reader: Option<&dyn CapacityReader>) -> Result<()> {
        let header = match reader {
            Some(reader) => reader.capacity(&*self)?,
            None => None,
        };

        match (header, self.capacity_fact) {
            (None, _) if self.config.recovery_mode && reader.is_some() => {
                return Err(Error::NotInitialized {
                    path: self.path.clone(),
                    reason: "empty header".to_string(),
                });
            }
            (None, _) => {}
            (Some(capacity), None) => {
                // Recovery on a block device: only the header knows
                self.capacity_fact = Some(capacity);
            }
            (Some(capacity), Some(fact)) if capacity != fact => {
                return Err(Error::CapacityMismatch {
                    path: self.path.clone(),
                    want: fact,
                    actual: capacity,
                });
            }
            (Some(_), Some(_)) => {}
        }

        if self.capacity_fact.is_none() {
            return Err(Error::NotInitialized {
                path: self.path.clone(),
                reason: "capacity unknown without a header reader".to_string(),
            });
        }
        Ok(())
    }

    // ---- I/O helpers ----

    fn file(&self) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::NotOpen(self.path.clone()))
    }

    /// Aligned superrange of `[start, start + len)`, bounded by the capacity.
    fn aligned_extent(&self, start: u64, len: usize) -> Result<Range<u64>> {
        let out_of_bounds = || Error::OutOfBounds {
            start,
            end: start.saturating_add(len as u64),
            capacity: self.capacity_fact.unwrap_or(0),
        };

        let end = start
            .checked_add(len as u64)
            .filter(|end| *end <= u64::MAX - BLOCK_SIZE)
            .ok_or_else(out_of_bounds)?;

        let range = aligned_range(start, end);
        if let Some(capacity) = self.capacity_fact {
            if range.end > capacity {
                return Err(out_of_bounds());
            }
        }
        Ok(range)
    }

    fn write_aligned(&self, file: &File, buf: &[u8], position: u64) -> Result<()> {
        debug_assert!(is_aligned(position) && is_aligned(buf.len() as u64));
        // Short writes are resumed from where they stopped
        file.write_all_at(buf, position).map_err(|e| {
            WAL_IO_ERRORS_TOTAL.with_label_values(&["write"]).inc();
            Error::Io(e)
        })?;
        WAL_WRITE_BYTES_TOTAL.inc_by(buf.len() as u64);
        Ok(())
    }

    fn read_aligned(&self, file: &File, buf: &mut [u8], position: u64) -> Result<()> {
        debug_assert!(is_aligned(position) && is_aligned(buf.len() as u64));
        file.read_exact_at(buf, position).map_err(|e| {
            WAL_IO_ERRORS_TOTAL.with_label_values(&["read"]).inc();
            Error::Io(e)
        })?;
        WAL_READ_BYTES_TOTAL.inc_by(buf.len() as u64);
        Ok(())
    }

    /// Read the aligned superrange, splice `src` in, write it back.
    fn write_unaligned(&self, file: &File, src: &[u8], position: u64) -> Result<()> {
        let range = self.aligned_extent(position, src.len())?;
        if src.is_empty() {
            return Ok(());
        }

        let size = range.end - range.start;
        let mut staging = self.staging.checkout(size)?;
        let buf = &mut staging[..size as usize];

        self.read_aligned(file, buf, range.start)?;
        let offset = (position - range.start) as usize;
        buf[offset..offset + src.len()].copy_from_slice(src);
        self.write_aligned(file, buf, range.start)
    }
}

impl WalChannel for BlockDeviceChannel {
    fn open(&mut self, reader: Option<&dyn CapacityReader>) -> Result<()> {
        if self.file.is_some() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "WAL channel is already open",
            )));
        }
        self.capacity_fact = None;

        match std::fs::metadata(&self.path) {
            Ok(meta) if self.is_block_device(&meta) => {
                self.kind = DeviceKind::BlockDevice;
                self.check_device_capacity()?;
                // Provisional until the header is checked
                self.capacity_fact = self.capacity_want;
            }
            Ok(meta) if meta.is_file() => {
                self.kind = DeviceKind::File;
                self.check_existing_file(meta.len())?;
            }
            Ok(_) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{:?} is neither a file nor a block device", self.path),
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.kind = DeviceKind::File;
                self.create_file()?;
            }
            Err(e) => return Err(e.into()),
        }

        let file = self.open_options().open(&self.path).map_err(|e| {
            WAL_IO_ERRORS_TOTAL.with_label_values(&["open"]).inc();
            Error::Io(e)
        })?;
        self.file = Some(file);

        if let Err(e) = self.check_capacity(reader) {
            self.file = None;
            self.capacity_fact = None;
            return Err(e);
        }

        info!(
            path = ?self.path,
            kind = ?self.kind,
            capacity = ?self.capacity_fact,
            recovery = self.config.recovery_mode,
            direct_io = self.config.direct_io,
            "WAL channel opened"
        );

        Ok(())
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if !self.config.direct_io {
                if let Err(e) = file.sync_data() {
                    debug!(path = ?self.path, error = %e, "Ignoring sync error on WAL close");
                }
            }
            drop(file);
            info!(path = ?self.path, "WAL channel closed");
        }
    }

    fn capacity(&self) -> Option<u64> {
        self.capacity_fact
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, src: &[u8], position: u64) -> Result<()> {
        let file = self.file()?;
        if self.unaligned_write {
            return self.write_unaligned(file, src, position);
        }

        if !is_aligned(position) {
            return Err(Error::Misaligned(position));
        }
        let range = self.aligned_extent(position, src.len())?;
        let size = range.end - range.start;
        if size == 0 {
            return Ok(());
        }

        let mut staging = self.staging.checkout(size)?;
        let buf = &mut staging[..size as usize];
        buf[..src.len()].copy_from_slice(src);
        buf[src.len()..].fill(0);

        self.write_aligned(file, buf, position)
    }

    fn read(&self, dst: &mut [u8], position: u64) -> Result<usize> {
        let file = self.file()?;
        let range = self.aligned_extent(position, dst.len())?;
        if dst.is_empty() {
            return Ok(0);
        }

        let size = range.end - range.start;
        let mut staging = self.staging.checkout(size)?;
        let buf = &mut staging[..size as usize];
        self.read_aligned(file, buf, range.start)?;

        let offset = (position - range.start) as usize;
        dst.copy_from_slice(&buf[offset..offset + dst.len()]);
        Ok(dst.len())
    }

    fn flush(&self) -> Result<()> {
        // O_DIRECT writes bypass the page cache
        if self.config.direct_io {
            return Ok(());
        }
        self.file()?.sync_data()?;
        Ok(())
    }
}

/// Real size of a block device, found by seeking to its end.
fn device_capacity(path: &Path) -> io::Result<u64> {
    let mut device = File::open(path)?;
    device.seek(SeekFrom::End(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CAPACITY: u64 = 16 * BLOCK_SIZE;

    fn test_config() -> WalChannelConfig {
        WalChannelConfig {
            direct_io: false,
            ..Default::default()
        }
    }

    fn recovery_config() -> WalChannelConfig {
        WalChannelConfig {
            recovery_mode: true,
            ..test_config()
        }
    }

    fn open_channel(dir: &TempDir) -> BlockDeviceChannel {
        let mut channel =
            BlockDeviceChannel::new(dir.path().join("wal"), CAPACITY, test_config()).unwrap();
        channel.open(None).unwrap();
        channel
    }

    #[test]
    fn test_new_rejects_unaligned_capacity() {
        let dir = TempDir::new().unwrap();
        let err = BlockDeviceChannel::new(dir.path().join("wal"), 4097, test_config())
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidCapacity(4097)));

        assert!(matches!(
            BlockDeviceChannel::new(dir.path().join("wal"), 0, test_config()),
            Err(Error::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_recovery_ignores_requested_capacity() {
        let dir = TempDir::new().unwrap();
        // Unaligned but ignored in recovery mode
        let channel = BlockDeviceChannel::new(dir.path().join("wal"), 4097, recovery_config());
        assert!(channel.is_ok());
    }

    #[test]
    fn test_fresh_open_creates_file() {
        let dir = TempDir::new().unwrap();
        let channel = open_channel(&dir);

        assert_eq!(channel.kind(), DeviceKind::File);
        assert_eq!(channel.capacity(), Some(CAPACITY));
        assert_eq!(
            std::fs::metadata(dir.path().join("wal")).unwrap().len(),
            CAPACITY
        );
    }

    #[test]
    fn test_reopen_with_mismatched_capacity() {
        let dir = TempDir::new().unwrap();
        let mut first = open_channel(&dir);
        first.close();

        let mut second =
            BlockDeviceChannel::new(dir.path().join("wal"), 2 * CAPACITY, test_config()).unwrap();
        let err = second.open(None).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityMismatch { want, actual, .. } if want == 2 * CAPACITY && actual == CAPACITY
        ));
        assert!(!second.is_open());
    }

    #[test]
    fn test_recovery_trusts_file_size() {
        let dir = TempDir::new().unwrap();
        open_channel(&dir).close();

        let mut channel =
            BlockDeviceChannel::new(dir.path().join("wal"), 0, recovery_config()).unwrap();
        channel.open(None).unwrap();
        assert_eq!(channel.capacity(), Some(CAPACITY));
    }

    #[test]
    fn test_recovery_of_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut channel =
            BlockDeviceChannel::new(dir.path().join("wal"), 0, recovery_config()).unwrap();
        let err = channel.open(None).unwrap_err();
        assert!(matches!(err, Error::NotInitialized { .. }));
        assert!(!dir.path().join("wal").exists());
    }

    #[test]
    fn test_recovery_with_empty_header() {
        let dir = TempDir::new().unwrap();
        open_channel(&dir).close();

        let reader = |_: &dyn WalChannel| -> Result<Option<u64>> { Ok(None) };
        let mut channel =
            BlockDeviceChannel::new(dir.path().join("wal"), 0, recovery_config()).unwrap();
        let err = channel.open(Some(&reader)).unwrap_err();
        assert!(matches!(err, Error::NotInitialized { ref reason, .. } if reason == "empty header"));
    }

    #[test]
    fn test_header_capacity_mismatch() {
        let dir = TempDir::new().unwrap();
        let reader = |_: &dyn WalChannel| -> Result<Option<u64>> { Ok(Some(2 * CAPACITY)) };
        let mut channel =
            BlockDeviceChannel::new(dir.path().join("wal"), CAPACITY, test_config()).unwrap();
        let err = channel.open(Some(&reader)).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityMismatch { want, actual, .. } if want == CAPACITY && actual == 2 * CAPACITY
        ));
    }

    #[test]
    fn test_header_reader_sees_open_channel() {
        let dir = TempDir::new().unwrap();
        let reader = |channel: &dyn WalChannel| -> Result<Option<u64>> {
            let mut header = [0u8; 8];
            channel.read(&mut header, 0)?;
            // Fresh file is all zeroes: no header yet
            assert_eq!(header, [0u8; 8]);
            Ok(channel.capacity())
        };
        let mut channel =
            BlockDeviceChannel::new(dir.path().join("wal"), CAPACITY, test_config()).unwrap();
        channel.open(Some(&reader)).unwrap();
        assert_eq!(channel.capacity(), Some(CAPACITY));
    }

    #[test]
    fn test_double_open_rejected() {
        let dir = TempDir::new().unwrap();
        let mut channel = open_channel(&dir);
        assert!(channel.open(None).is_err());
        // Still usable
        assert_eq!(channel.capacity(), Some(CAPACITY));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let channel = open_channel(&dir);

        let data: Vec<u8> = (0..BLOCK_SIZE as usize * 2).map(|i| (i % 251) as u8).collect();
        channel.write(&data, BLOCK_SIZE).unwrap();

        let mut out = vec![0u8; data.len()];
        assert_eq!(channel.read(&mut out, BLOCK_SIZE).unwrap(), data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn test_write_pads_tail_with_zeroes() {
        let dir = TempDir::new().unwrap();
        let channel = open_channel(&dir);

        channel.write(&vec![0xFFu8; BLOCK_SIZE as usize], 0).unwrap();
        channel.write(b"hello", 0).unwrap();

        let mut out = vec![0xAAu8; BLOCK_SIZE as usize];
        channel.read(&mut out, 0).unwrap();
        assert_eq!(&out[..5], b"hello");
        assert!(out[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_read_unaligned_window() {
        let dir = TempDir::new().unwrap();
        let channel = open_channel(&dir);

        let data: Vec<u8> = (0..BLOCK_SIZE as usize * 3).map(|i| (i % 199) as u8).collect();
        channel.write(&data, 0).unwrap();

        let mut out = vec![0u8; 5000];
        channel.read(&mut out, 3000).unwrap();
        assert_eq!(&out[..], &data[3000..8000]);
    }

    #[test]
    fn test_misaligned_write_rejected() {
        let dir = TempDir::new().unwrap();
        let channel = open_channel(&dir);
        assert!(matches!(channel.write(b"x", 10), Err(Error::Misaligned(10))));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let dir = TempDir::new().unwrap();
        let channel = open_channel(&dir);

        // Last block is fine, one byte past it is not
        channel.write(b"tail", CAPACITY - BLOCK_SIZE).unwrap();
        let err = channel.write(&vec![0u8; BLOCK_SIZE as usize + 1], CAPACITY - BLOCK_SIZE);
        assert!(matches!(err, Err(Error::OutOfBounds { capacity: CAPACITY, .. })));

        let mut out = vec![0u8; 10];
        assert!(matches!(
            channel.read(&mut out, CAPACITY - 5),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            channel.read(&mut out, u64::MAX - 3),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_io_before_open_rejected() {
        let dir = TempDir::new().unwrap();
        let channel =
            BlockDeviceChannel::new(dir.path().join("wal"), CAPACITY, test_config()).unwrap();
        assert!(matches!(channel.write(b"x", 0), Err(Error::NotOpen(_))));
        let mut out = [0u8; 1];
        assert!(matches!(channel.read(&mut out, 0), Err(Error::NotOpen(_))));
    }

    #[test]
    fn test_unaligned_write_preserves_neighbours() {
        let dir = TempDir::new().unwrap();
        let mut channel = open_channel(&dir);

        let original = vec![0x5Au8; BLOCK_SIZE as usize];
        channel.write(&original, 0).unwrap();

        channel.set_unaligned_write(true);
        channel.write(&[1u8; 10], 0).unwrap();

        let mut out = vec![0u8; BLOCK_SIZE as usize];
        channel.read(&mut out, 0).unwrap();
        assert_eq!(&out[..10], &[1u8; 10]);
        assert_eq!(&out[10..], &original[10..]);
    }

    #[test]
    fn test_unaligned_write_across_blocks() {
        let dir = TempDir::new().unwrap();
        let mut channel = open_channel(&dir);

        let original: Vec<u8> = (0..BLOCK_SIZE as usize * 3).map(|i| (i % 97) as u8).collect();
        channel.write(&original, 0).unwrap();

        channel.set_unaligned_write(true);
        let patch = vec![0xEEu8; 200];
        channel.write(&patch, BLOCK_SIZE * 2 - 100).unwrap();

        let mut out = vec![0u8; original.len()];
        channel.read(&mut out, 0).unwrap();

        let start = BLOCK_SIZE as usize * 2 - 100;
        assert_eq!(&out[..start], &original[..start]);
        assert_eq!(&out[start..start + 200], &patch[..]);
        assert_eq!(&out[start + 200..], &original[start + 200..]);
    }

    #[test]
    fn test_staging_buffer_limit() {
        let dir = TempDir::new().unwrap();
        let config = WalChannelConfig {
            max_staging_buffer_size: 2 * BLOCK_SIZE,
            ..test_config()
        };
        let mut channel =
            BlockDeviceChannel::new(dir.path().join("wal"), CAPACITY, config).unwrap();
        channel.open(None).unwrap();

        channel.write(&vec![1u8; 2 * BLOCK_SIZE as usize], 0).unwrap();
        let err = channel.write(&vec![1u8; 2 * BLOCK_SIZE as usize + 1], 0);
        assert!(matches!(err, Err(Error::StagingBufferTooLarge { .. })));
    }

    #[test]
    fn test_staging_buffer_reused_by_worker() {
        let dir = TempDir::new().unwrap();
        let channel = open_channel(&dir);

        channel.write(&vec![1u8; 3 * BLOCK_SIZE as usize], 0).unwrap();
        assert_eq!(channel.staging_buffer_capacity(), Some(3 * BLOCK_SIZE as usize));

        // Smaller request reuses the larger buffer
        channel.write(b"small", 0).unwrap();
        assert_eq!(channel.staging_buffer_capacity(), Some(3 * BLOCK_SIZE as usize));
        assert_eq!(channel.staging_buffer_count(), 1);
    }

    #[test]
    fn test_flush_and_close() {
        let dir = TempDir::new().unwrap();
        let mut channel = open_channel(&dir);
        channel.write(b"durable", 0).unwrap();
        channel.flush().unwrap();
        channel.close();
        assert!(!channel.is_open());
        // Second close is a no-op
        channel.close();
    }

    /// A preallocated regular file to stand in for a device.
    fn device_file(dir: &TempDir, len: u64) -> std::path::PathBuf {
        let path = dir.path().join("device");
        std::fs::File::create(&path).unwrap().set_len(len).unwrap();
        path
    }

    #[test]
    fn test_block_device_within_capacity() {
        let dir = TempDir::new().unwrap();
        let path = device_file(&dir, 4 * CAPACITY);

        // Device larger than requested: only the requested range is used
        let mut channel = BlockDeviceChannel::new(&path, CAPACITY, test_config()).unwrap();
        channel.simulate_block_device(Some(4 * CAPACITY));
        channel.open(None).unwrap();

        assert_eq!(channel.kind(), DeviceKind::BlockDevice);
        assert_eq!(channel.capacity(), Some(CAPACITY));
        assert!(matches!(
            channel.write(b"x", CAPACITY),
            Err(Error::OutOfBounds { capacity: CAPACITY, .. })
        ));
    }

    #[test]
    fn test_block_device_smaller_than_requested() {
        let dir = TempDir::new().unwrap();
        let path = device_file(&dir, CAPACITY);

        let mut channel = BlockDeviceChannel::new(&path, 2 * CAPACITY, test_config()).unwrap();
        channel.simulate_block_device(Some(CAPACITY));
        let err = channel.open(None).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityMismatch { want, actual, .. } if want == 2 * CAPACITY && actual == CAPACITY
        ));
        assert!(!channel.is_open());
        // Devices are never resized
        assert_eq!(std::fs::metadata(&path).unwrap().len(), CAPACITY);
    }

    #[test]
    fn test_block_device_capacity_query_failure_skips_check() {
        let dir = TempDir::new().unwrap();
        let path = device_file(&dir, CAPACITY);

        let mut channel = BlockDeviceChannel::new(&path, CAPACITY, test_config()).unwrap();
        channel.simulate_block_device(None);
        channel.open(None).unwrap();

        assert_eq!(channel.kind(), DeviceKind::BlockDevice);
        assert_eq!(channel.capacity(), Some(CAPACITY));
        channel.write(b"still writable", 0).unwrap();
    }

    #[test]
    fn test_block_device_recovery_adopts_header_capacity() {
        let dir = TempDir::new().unwrap();
        let path = device_file(&dir, 4 * CAPACITY);

        let reader = |_: &dyn WalChannel| -> Result<Option<u64>> { Ok(Some(2 * CAPACITY)) };
        let mut channel = BlockDeviceChannel::new(&path, 0, recovery_config()).unwrap();
        channel.simulate_block_device(Some(4 * CAPACITY));
        channel.open(Some(&reader)).unwrap();

        assert_eq!(channel.kind(), DeviceKind::BlockDevice);
        assert_eq!(channel.capacity(), Some(2 * CAPACITY));
    }

    #[test]
    fn test_block_device_recovery_needs_header_reader() {
        let dir = TempDir::new().unwrap();
        let path = device_file(&dir, CAPACITY);

        let mut channel = BlockDeviceChannel::new(&path, 0, recovery_config()).unwrap();
        channel.simulate_block_device(Some(CAPACITY));
        let err = channel.open(None).unwrap_err();
        assert!(matches!(err, Error::NotInitialized { .. }));
        assert!(!channel.is_open());
        assert_eq!(channel.capacity(), None);
    }

    #[test]
    fn test_check_available_reports_result() {
        let dir = TempDir::new().unwrap();
        // tmpfs may or may not support O_DIRECT; either answer is fine,
        // but the probe must not leave files behind.
        let _ = BlockDeviceChannel::check_available(dir.path().join("wal"));
        assert!(!dir.path().join(".strata-direct-io-probe").exists());
    }
}
