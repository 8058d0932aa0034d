//! Front-to-back reader over local file headers.
//!
//! Entry data is bounded by the sizes in the local header when they are
//! present. Entries flagged with a trailing data descriptor are bounded by
//! the end of their DEFLATE stream, or for stored entries by the first
//! descriptor record whose CRC-32 and size match the bytes before it. CRC
//! and sizes are checked for every entry once its data ends.
//!
//! Nothing is read past the current record, so only a few kilobytes are
//! held in memory whatever the entry size.

use std::io::{self, BufRead, Read};

use crc32fast::Hasher;
use flate2::bufread::DeflateDecoder;

use crate::error::{StoreError, StoreResult};
use crate::io::{read_retrying, CHUNK_SIZE};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_SIG: u32 = 0x0605_4b50;
const ZIP64_END_OF_CENTRAL_SIG: u32 = 0x0606_4b50;
const DESCRIPTOR_SIG: u32 = 0x0807_4b50;

const LOCAL_HEADER_LEN: usize = 30;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DESCRIPTOR: u16 = 0x0008;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const ZIP64_EXTRA_ID: u16 = 0x0001;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Checksums {
    crc32: u32,
    compressed: u64,
    uncompressed: u64,
}

/// One parsed local file header.
#[derive(Debug, Clone)]
pub(crate) struct LocalHeader {
    pub(crate) name: String,
    flags: u16,
    method: u16,
    declared: Checksums,
    zip64: bool,
}

impl LocalHeader {
    pub(crate) fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    fn has_descriptor(&self) -> bool {
        self.flags & FLAG_DESCRIPTOR != 0
    }

    /// Uncompressed size, or 0 when it only follows the data.
    pub(crate) fn declared_size(&self) -> u64 {
        if self.has_descriptor() {
            0
        } else {
            self.declared.uncompressed
        }
    }

    fn descriptor_len(&self) -> usize {
        if self.zip64 {
            24
        } else {
            16
        }
    }
}

/// Buffered source that can look ahead a bounded number of bytes.
pub(crate) struct LocalReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    consumed: u64,
}

impl<R: Read> LocalReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(CHUNK_SIZE * 2),
            pos: 0,
            eof: false,
            consumed: 0,
        }
    }

    /// Buffered bytes, at least `n` of them unless the source ended first.
    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.buf.len() - self.pos < n {
            self.buf.drain(..self.pos);
            self.pos = 0;

            let mut chunk = [0u8; CHUNK_SIZE];
            while self.buf.len() < n && !self.eof {
                let read = read_retrying(&mut self.inner, &mut chunk)?;
                if read == 0 {
                    self.eof = true;
                } else {
                    self.buf.extend_from_slice(&chunk[..read]);
                }
            }
        }
        Ok(&self.buf[self.pos..])
    }

    /// Next local header, or `None` once the central directory begins.
    pub(crate) fn next_header(&mut self) -> StoreResult<Option<LocalHeader>> {
        let head = self.peek(4)?;
        if head.len() < 4 {
            return Err(StoreError::corrupt(if head.is_empty() {
                "empty stream".to_string()
            } else {
                "container ended before its central directory".to_string()
            }));
        }

        match u32::from_le_bytes([head[0], head[1], head[2], head[3]]) {
            LOCAL_HEADER_SIG => self.read_header().map(Some),
            CENTRAL_HEADER_SIG | END_OF_CENTRAL_SIG | ZIP64_END_OF_CENTRAL_SIG => Ok(None),
            other => Err(StoreError::corrupt(format!(
                "invalid local file header signature {:#010x}",
                other
            ))),
        }
    }

    fn read_header(&mut self) -> StoreResult<LocalHeader> {
        let mut fixed = [0u8; LOCAL_HEADER_LEN];
        self.read_exact(&mut fixed).map_err(truncated)?;

        let flags = le16(&fixed, 6);
        let method = le16(&fixed, 8);
        let mut declared = Checksums {
            crc32: le32(&fixed, 14),
            compressed: u64::from(le32(&fixed, 18)),
            uncompressed: u64::from(le32(&fixed, 22)),
        };
        let name_len = usize::from(le16(&fixed, 26));
        let extra_len = usize::from(le16(&fixed, 28));

        let mut name = vec![0u8; name_len];
        self.read_exact(&mut name).map_err(truncated)?;
        let mut extra = vec![0u8; extra_len];
        self.read_exact(&mut extra).map_err(truncated)?;

        let name = String::from_utf8(name)
            .map_err(|_| StoreError::corrupt("entry name is not valid UTF-8"))?;

        if flags & FLAG_ENCRYPTED != 0 {
            return Err(StoreError::corrupt(format!(
                "entry '{}' is encrypted",
                name
            )));
        }
        if method != METHOD_STORED && method != METHOD_DEFLATED {
            return Err(StoreError::corrupt(format!(
                "entry '{}' uses unsupported compression method {}",
                name, method
            )));
        }

        let zip64 = apply_zip64_extra(&extra, &mut declared)?;

        Ok(LocalHeader {
            name,
            flags,
            method,
            declared,
            zip64,
        })
    }

    /// Reader over the data of the entry whose header was just read.
    ///
    /// Call [`EntryBody::finish`] afterwards; it moves the source to the
    /// next record and checks CRC and sizes.
    pub(crate) fn body<'a>(&'a mut self, header: &LocalHeader) -> EntryBody<'a, R> {
        let start = self.consumed;
        let descriptor_len = header.descriptor_len();

        let data = match (header.method, header.has_descriptor()) {
            (METHOD_DEFLATED, true) => Data::DeflatedToEnd(DeflateDecoder::new(self)),
            (METHOD_DEFLATED, false) => {
                Data::Deflated(DeflateDecoder::new(self.take(header.declared.compressed)))
            }
            (_, true) => Data::StoredToDescriptor(DescriptorScan {
                source: self,
                hasher: Hasher::new(),
                emitted: 0,
                record_len: descriptor_len,
                found: None,
            }),
            (_, false) => Data::Stored(self.take(header.declared.compressed)),
        };

        EntryBody {
            data,
            expected: (!header.has_descriptor()).then_some(header.declared),
            zip64: header.zip64,
            start,
            hasher: Hasher::new(),
            produced: 0,
        }
    }
}

impl<R: Read> Read for LocalReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for LocalReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos == self.buf.len() {
            return self.peek(1);
        }
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.buf.len() - self.pos);
        self.pos += amt;
        self.consumed += amt as u64;
    }
}

enum Data<'a, R> {
    Stored(io::Take<&'a mut LocalReader<R>>),
    Deflated(DeflateDecoder<io::Take<&'a mut LocalReader<R>>>),
    DeflatedToEnd(DeflateDecoder<&'a mut LocalReader<R>>),
    StoredToDescriptor(DescriptorScan<'a, R>),
}

impl<R: Read> Data<'_, R> {
    fn source(&mut self) -> &mut LocalReader<R> {
        match self {
            Data::Stored(take) => &mut **take.get_mut(),
            Data::Deflated(decoder) => &mut **decoder.get_mut().get_mut(),
            Data::DeflatedToEnd(decoder) => &mut **decoder.get_mut(),
            Data::StoredToDescriptor(scan) => &mut *scan.source,
        }
    }
}

/// Decompressed data of one entry.
pub(crate) struct EntryBody<'a, R> {
    data: Data<'a, R>,
    expected: Option<Checksums>,
    zip64: bool,
    start: u64,
    hasher: Hasher,
    produced: u64,
}

impl<R: Read> EntryBody<'_, R> {
    /// Skip unread data, read a trailing descriptor and verify the entry.
    pub(crate) fn finish(mut self, name: &str) -> StoreResult<()> {
        io::copy(&mut self, &mut io::sink()).map_err(truncated)?;
        if let Data::Deflated(decoder) = &mut self.data {
            io::copy(decoder.get_mut(), &mut io::sink()).map_err(truncated)?;
        }

        let (compressed, trailer) = match &mut self.data {
            Data::StoredToDescriptor(scan) => (scan.emitted, scan.found),
            data => (data.source().consumed - self.start, None),
        };

        let expected = match (self.expected, trailer) {
            (Some(declared), _) => declared,
            (None, Some(found)) => found,
            (None, None) => read_descriptor(self.data.source(), self.zip64)?,
        };

        if compressed != expected.compressed {
            return Err(StoreError::corrupt(format!(
                "entry '{}' has {} bytes of data, expected {}",
                name, compressed, expected.compressed
            )));
        }
        if self.produced != expected.uncompressed {
            return Err(StoreError::corrupt(format!(
                "entry '{}' decompressed to {} bytes, expected {}",
                name, self.produced, expected.uncompressed
            )));
        }
        let crc32 = self.hasher.clone().finalize();
        if crc32 != expected.crc32 {
            return Err(StoreError::corrupt(format!(
                "entry '{}' CRC-32 {:#010x} does not match {:#010x}",
                name, crc32, expected.crc32
            )));
        }
        Ok(())
    }
}

impl<R: Read> Read for EntryBody<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.data {
            Data::Stored(take) => take.read(buf)?,
            Data::Deflated(decoder) => decoder.read(buf)?,
            Data::DeflatedToEnd(decoder) => decoder.read(buf)?,
            Data::StoredToDescriptor(scan) => scan.read(buf)?,
        };
        self.hasher.update(&buf[..n]);
        self.produced += n as u64;
        Ok(n)
    }
}

/// Stored data of unknown length, ended by its data descriptor.
struct DescriptorScan<'a, R> {
    source: &'a mut LocalReader<R>,
    hasher: Hasher,
    emitted: u64,
    record_len: usize,
    found: Option<Checksums>,
}

impl<R: Read> Read for DescriptorScan<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.found.is_some() || buf.is_empty() {
            return Ok(0);
        }

        let record_len = self.record_len;
        let window = self.source.peek(CHUNK_SIZE + record_len)?;
        if window.len() < record_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "data descriptor not found",
            ));
        }

        // A record must fit in the window to be checked; later starts wait.
        let mut safe = window.len() + 1 - record_len;
        let mut found = None;
        for at in 0..safe {
            if window[at..at + 4] != DESCRIPTOR_SIG.to_le_bytes() {
                continue;
            }
            let record = parse_descriptor(&window[at + 4..at + record_len], record_len == 24);
            let mut hasher = self.hasher.clone();
            hasher.update(&window[..at]);
            if record.compressed == self.emitted + at as u64
                && record.uncompressed == record.compressed
                && record.crc32 == hasher.finalize()
            {
                found = Some((at, record));
                safe = at;
                break;
            }
        }

        let n = safe.min(buf.len());
        buf[..n].copy_from_slice(&window[..n]);
        self.hasher.update(&buf[..n]);
        self.emitted += n as u64;
        self.source.consume(n);

        if let Some((at, record)) = found {
            if at == n {
                self.source.consume(record_len);
                self.found = Some(record);
            }
        }
        Ok(n)
    }
}

fn read_descriptor<R: Read>(source: &mut LocalReader<R>, zip64: bool) -> StoreResult<Checksums> {
    let head = source.peek(4)?;
    if head.len() >= 4 && head[..4] == DESCRIPTOR_SIG.to_le_bytes() {
        source.consume(4);
    }

    let mut record = [0u8; 20];
    let len = if zip64 { 20 } else { 12 };
    source.read_exact(&mut record[..len]).map_err(truncated)?;
    Ok(parse_descriptor(&record[..len], zip64))
}

/// CRC-32 and both sizes, without the optional signature.
fn parse_descriptor(bytes: &[u8], zip64: bool) -> Checksums {
    if zip64 {
        Checksums {
            crc32: le32(bytes, 0),
            compressed: le64(bytes, 4),
            uncompressed: le64(bytes, 12),
        }
    } else {
        Checksums {
            crc32: le32(bytes, 0),
            compressed: u64::from(le32(bytes, 4)),
            uncompressed: u64::from(le32(bytes, 8)),
        }
    }
}

/// Replace saturated sizes from a ZIP64 extra field. Returns whether one
/// was present, which also widens the data descriptor.
fn apply_zip64_extra(extra: &[u8], declared: &mut Checksums) -> StoreResult<bool> {
    let mut rest = extra;
    while rest.len() >= 4 {
        let id = le16(rest, 0);
        let len = usize::from(le16(rest, 2));
        let field = rest
            .get(4..4 + len)
            .ok_or_else(|| StoreError::corrupt("extra field overruns header"))?;

        if id == ZIP64_EXTRA_ID {
            let mut offset = 0;
            for size in [&mut declared.uncompressed, &mut declared.compressed] {
                if *size == u64::from(u32::MAX) && field.len() >= offset + 8 {
                    *size = le64(field, offset);
                    offset += 8;
                }
            }
            return Ok(true);
        }
        rest = &rest[4 + len..];
    }
    Ok(false)
}

fn truncated(err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        StoreError::corrupt("container is truncated")
    } else {
        StoreError::Io(err)
    }
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le64(bytes: &[u8], at: usize) -> u64 {
    u64::from(le32(bytes, at)) | (u64::from(le32(bytes, at + 4)) << 32)
}
