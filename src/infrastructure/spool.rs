//! Disk-backed spill buffer
//!
//! A write-then-read byte buffer that keeps its head in memory and spills the
//! tail to a temporary file. Responses repackaged from large repositories can
//! exceed what is comfortable to hold in memory, yet must carry a
//! `Content-Length`, so the full payload is staged here before any byte is
//! sent.
//!
//! Every buffer that has spilled registers its temp file in a process-wide
//! registry; the shutdown path calls [`cleanup_temp_files`] to unlink
//! whatever is still open.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

static SPOOL_REGISTRY: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn register(path: &Path) {
    if let Ok(mut reg) = SPOOL_REGISTRY.lock() {
        reg.insert(path.to_path_buf());
    }
}

fn unregister(path: &Path) {
    if let Ok(mut reg) = SPOOL_REGISTRY.lock() {
        reg.remove(path);
    }
}

/// Unlink every temp file still registered. Intended for the shutdown hook.
pub fn cleanup_temp_files() {
    if let Ok(mut reg) = SPOOL_REGISTRY.lock() {
        for path in reg.drain() {
            let _ = std::fs::remove_file(path);
        }
    }
}

struct TailFile {
    file: File,
    path: PathBuf,
}

/// Write-then-read buffer with an in-memory head and a disk-backed tail.
///
/// Writes below `mem_limit` never touch the disk; the tail is appended to a
/// lazily created temp file in `disk_block` granularity. `disk_block` should
/// be a power-of-two multiple of 4 KiB to line up with disk sector sizes.
///
/// The buffer is strictly mode-switched: the first read flushes pending tail
/// bytes and refuses further writes until [`reset`](SpoolBuffer::reset).
pub struct SpoolBuffer {
    mem: Vec<u8>,
    mem_limit: usize,
    disk_block: usize,
    tail: Option<TailFile>,
    /// Pending tail bytes not yet written, located at file offset `block_off`
    block: Vec<u8>,
    block_off: u64,
    pos: u64,
    len: u64,
    reading: bool,
}

impl SpoolBuffer {
    pub fn new(mem_limit: usize, disk_block: usize) -> Self {
        SpoolBuffer {
            mem: Vec::new(),
            mem_limit,
            disk_block: disk_block.max(1),
            tail: None,
            block: Vec::new(),
            block_off: 0,
            pos: 0,
            len: 0,
            reading: false,
        }
    }

    /// Total number of bytes written
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Restart reading from offset zero
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Truncate the buffer, delete the temp file, and return to write mode
    pub fn reset(&mut self) {
        self.drop_tail();
        self.mem.clear();
        self.block.clear();
        self.block_off = 0;
        self.pos = 0;
        self.len = 0;
        self.reading = false;
    }

    /// Read at an absolute offset without moving the cursor
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.switch_to_read()?;
        self.read_from(buf, offset).map(|(n, _)| n)
    }

    fn drop_tail(&mut self) {
        if let Some(tail) = self.tail.take() {
            drop(tail.file);
            unregister(&tail.path);
            let _ = std::fs::remove_file(&tail.path);
        }
    }

    fn ensure_tail(&mut self) -> io::Result<&mut TailFile> {
        if self.tail.is_none() {
            let (file, path) = tempfile::Builder::new()
                .prefix("modgate-spool-")
                .tempfile()?
                .keep()
                .map_err(|e| io::Error::other(e.to_string()))?;
            register(&path);
            self.tail = Some(TailFile { file, path });
        }
        Ok(self.tail.as_mut().unwrap())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let off = self.block_off;
        let block = std::mem::take(&mut self.block);
        let tail = self.ensure_tail()?;
        tail.file.seek(SeekFrom::Start(off))?;
        tail.file.write_all(&block)?;
        self.block_off = off + block.len() as u64;
        Ok(())
    }

    fn switch_to_read(&mut self) -> io::Result<()> {
        if !self.reading {
            self.flush_block()?;
            self.reading = true;
        }
        Ok(())
    }

    /// Write tail bytes at a file-relative offset, buffering sequential
    /// appends in `disk_block` units and patching or bypassing the pending
    /// block for positioned writes.
    fn write_tail(&mut self, file_off: u64, buf: &[u8]) -> io::Result<()> {
        let block_end = self.block_off + self.block.len() as u64;
        if file_off == block_end {
            self.block.extend_from_slice(buf);
            if self.block.len() >= self.disk_block {
                self.flush_block()?;
            }
            return Ok(());
        }
        if file_off >= self.block_off && file_off + buf.len() as u64 <= block_end {
            let start = (file_off - self.block_off) as usize;
            self.block[start..start + buf.len()].copy_from_slice(buf);
            return Ok(());
        }
        self.flush_block()?;
        let tail = self.ensure_tail()?;
        tail.file.seek(SeekFrom::Start(file_off))?;
        tail.file.write_all(buf)?;
        // leave the empty pending block positioned after this write so a
        // following sequential append lands back in it
        self.block_off = file_off + buf.len() as u64;
        Ok(())
    }

    /// Read at `offset`, returning the count and whether the head was hit
    fn read_from(&mut self, buf: &mut [u8], offset: u64) -> io::Result<(usize, bool)> {
        if offset >= self.len || buf.is_empty() {
            return Ok((0, false));
        }
        let remaining = (self.len - offset) as usize;
        if (offset as usize) < self.mem.len() {
            let start = offset as usize;
            let n = buf.len().min(self.mem.len() - start).min(remaining);
            buf[..n].copy_from_slice(&self.mem[start..start + n]);
            return Ok((n, true));
        }
        let tail = match self.tail.as_mut() {
            Some(tail) => tail,
            None => return Ok((0, false)),
        };
        tail.file.seek(SeekFrom::Start(offset - self.mem_limit as u64))?;
        let n = buf.len().min(remaining);
        let read = tail.file.read(&mut buf[..n])?;
        Ok((read, false))
    }
}

impl Write for SpoolBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.reading {
            return Err(io::Error::other("spool buffer is in read mode"));
        }
        let mut remaining = buf;
        let mut written = 0usize;

        if (self.pos as usize) < self.mem_limit && !remaining.is_empty() {
            let start = self.pos as usize;
            let n = remaining.len().min(self.mem_limit - start);
            if self.mem.len() < start + n {
                self.mem.resize(start + n, 0);
            }
            self.mem[start..start + n].copy_from_slice(&remaining[..n]);
            self.pos += n as u64;
            written += n;
            remaining = &remaining[n..];
        }

        if !remaining.is_empty() {
            // a seek may have jumped past the head; the gap reads as zeros
            if self.mem.len() < self.mem_limit {
                self.mem.resize(self.mem_limit, 0);
            }
            let file_off = self.pos - self.mem_limit as u64;
            self.write_tail(file_off, remaining)?;
            self.pos += remaining.len() as u64;
            written += remaining.len();
        }

        self.len = self.len.max(self.pos);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SpoolBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.switch_to_read()?;
        let (n, _) = self.read_from(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SpoolBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => self.len as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of spool buffer",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl Drop for SpoolBuffer {
    fn drop(&mut self) {
        self.drop_tail();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_stays_in_memory() {
        let mut buf = SpoolBuffer::new(1024, 64);
        buf.write_all(b"hello world").unwrap();
        assert_eq!(buf.len(), 11);
        assert!(buf.tail.is_none());

        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn large_payload_spills_to_disk_and_reads_back() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut buf = SpoolBuffer::new(1024, 512);
        buf.write_all(&payload).unwrap();
        assert_eq!(buf.len(), payload.len() as u64);

        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);

        let path = buf.tail.as_ref().unwrap().path.clone();
        buf.reset();
        assert!(!path.exists());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn refuses_writes_after_first_read_until_reset() {
        let mut buf = SpoolBuffer::new(16, 16);
        buf.write_all(b"abc").unwrap();
        let mut one = [0u8; 1];
        buf.read(&mut one).unwrap();
        assert!(buf.write(b"more").is_err());

        buf.reset();
        buf.write_all(b"fresh").unwrap();
        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"fresh");
    }

    #[test]
    fn rewind_replays_from_zero() {
        let mut buf = SpoolBuffer::new(8, 8);
        buf.write_all(b"0123456789abcdef").unwrap();
        let mut first = Vec::new();
        buf.read_to_end(&mut first).unwrap();
        buf.rewind();
        let mut second = Vec::new();
        buf.read_to_end(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn read_at_crosses_the_memory_boundary() {
        let payload: Vec<u8> = (0..64u8).collect();
        let mut buf = SpoolBuffer::new(16, 8);
        buf.write_all(&payload).unwrap();

        let mut window = [0u8; 8];
        let n = buf.read_at(&mut window, 12).unwrap();
        // the head read stops at the memory boundary
        assert_eq!(&window[..n], &payload[12..12 + n]);
        let n = buf.read_at(&mut window, 40).unwrap();
        assert_eq!(&window[..n], &payload[40..40 + n]);
    }

    #[test]
    fn backpatching_while_writing_is_visible_on_read() {
        let mut buf = SpoolBuffer::new(8, 8);
        buf.write_all(&[0u8; 32]).unwrap();
        // patch inside the memory head
        buf.seek(SeekFrom::Start(2)).unwrap();
        buf.write_all(b"HH").unwrap();
        // patch inside the spilled tail
        buf.seek(SeekFrom::Start(20)).unwrap();
        buf.write_all(b"TT").unwrap();
        buf.seek(SeekFrom::End(0)).unwrap();
        buf.write_all(b"Z").unwrap();

        buf.rewind();
        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 33);
        assert_eq!(&out[2..4], b"HH");
        assert_eq!(&out[20..22], b"TT");
        assert_eq!(out[32], b'Z');
    }

    #[test]
    fn cleanup_unlinks_registered_files() {
        let mut buf = SpoolBuffer::new(4, 4);
        buf.write_all(&[1u8; 64]).unwrap();
        let path = buf.tail.as_ref().unwrap().path.clone();
        cleanup_temp_files();
        assert!(!path.exists());
        // forget the tail so drop does not try to double-remove
        buf.tail.take();
    }
}
