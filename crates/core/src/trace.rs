//! Trace record wire format and the streaming reader.
//!
//! Trace files are produced out-of-tree by an instrumentation pass that
//! injects magic-op sequences at region boundaries (see the trace extractor
//! contract); this module only consumes the resulting binary stream.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Number of source address slots per record.
pub const NUM_SOURCE_ADDRS: usize = 4;
/// Number of destination address slots per record.
pub const NUM_DEST_ADDRS: usize = 4;
/// Fixed width of the opcode field, null-padded.
pub const OPCODE_LEN: usize = 32;

/// Sentinel opcode marking the start of an offload-eligible region.
pub const OPCODE_ROI_BEGIN: &str = "ROI_BEGIN";
/// Sentinel opcode marking the end of an offload-eligible region.
pub const OPCODE_ROI_END: &str = "ROI_END";

/// Wire-exact size of one [`TraceRecord`], in bytes.
pub const RECORD_SIZE: usize = 8 * (3 + NUM_SOURCE_ADDRS + NUM_DEST_ADDRS + 1) + OPCODE_LEN;

/// One fixed-width instruction descriptor read from a trace file.
///
/// Zero in an address slot means "absent". `opcode` is compared against the
/// sentinel constants above to detect `ROI_BEGIN`/`ROI_END` markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    /// Originating process ID (selects which Host core owns the master trace).
    pub process_id: u64,
    /// Thread ID; records whose `thread_id` differs from the reading core's
    /// own are redirected to that thread's scheduling queue (§4.5).
    pub thread_id: u64,
    /// Instruction pointer (virtual address), 0 if I-fetch is not modeled for this record.
    pub inst_pointer: u64,
    /// Up to 4 source (load) addresses; 0 means absent.
    pub source_addr: [u64; NUM_SOURCE_ADDRS],
    /// Up to 4 destination (store) addresses; 0 means absent.
    pub dest_addr: [u64; NUM_DEST_ADDRS],
    /// Active region ID for `ROI_BEGIN`/`ROI_END` markers; otherwise the
    /// region the instruction was emitted under.
    pub region_id: u64,
    /// Null-padded, fixed-width 32-byte opcode string.
    pub opcode: [u8; OPCODE_LEN],
}

impl TraceRecord {
    /// Returns the opcode as a `&str`, trimmed of trailing NUL padding.
    pub fn opcode_str(&self) -> &str {
        let end = self.opcode.iter().position(|&b| b == 0).unwrap_or(OPCODE_LEN);
        std::str::from_utf8(&self.opcode[..end]).unwrap_or("")
    }

    /// True if this record is a `ROI_BEGIN` sentinel.
    pub fn is_roi_begin(&self) -> bool {
        self.opcode_str() == OPCODE_ROI_BEGIN
    }

    /// True if this record is a `ROI_END` sentinel.
    pub fn is_roi_end(&self) -> bool {
        self.opcode_str() == OPCODE_ROI_END
    }

    /// True if either a source or destination address slot is non-zero.
    pub fn has_memory_operand(&self) -> bool {
        self.source_addr.iter().any(|&a| a != 0) || self.dest_addr.iter().any(|&a| a != 0)
    }

    /// Builds a record with the given opcode and no memory operands, used
    /// by tests and by the scheduling-queue priming path.
    pub fn marker(opcode: &str, region_id: u64, thread_id: u64) -> Self {
        let mut bytes = [0u8; OPCODE_LEN];
        let src = opcode.as_bytes();
        let n = src.len().min(OPCODE_LEN);
        bytes[..n].copy_from_slice(&src[..n]);
        Self {
            process_id: 0,
            thread_id,
            inst_pointer: 0,
            source_addr: [0; NUM_SOURCE_ADDRS],
            dest_addr: [0; NUM_DEST_ADDRS],
            region_id,
            opcode: bytes,
        }
    }

    fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let mut offset = 0;
        let mut put_u64 = |v: u64| {
            buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
            offset += 8;
        };
        put_u64(self.process_id);
        put_u64(self.thread_id);
        put_u64(self.inst_pointer);
        for &a in &self.source_addr {
            put_u64(a);
        }
        for &a in &self.dest_addr {
            put_u64(a);
        }
        put_u64(self.region_id);
        buf[offset..offset + OPCODE_LEN].copy_from_slice(&self.opcode);
        buf
    }

    fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        let mut offset = 0;
        let mut take_u64 = || {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[offset..offset + 8]);
            let v = u64::from_le_bytes(bytes);
            offset += 8;
            v
        };
        let process_id = take_u64();
        let thread_id = take_u64();
        let inst_pointer = take_u64();
        let mut source_addr = [0u64; NUM_SOURCE_ADDRS];
        for slot in &mut source_addr {
            *slot = take_u64();
        }
        let mut dest_addr = [0u64; NUM_DEST_ADDRS];
        for slot in &mut dest_addr {
            *slot = take_u64();
        }
        let region_id = take_u64();
        let mut opcode = [0u8; OPCODE_LEN];
        opcode.copy_from_slice(&buf[offset..offset + OPCODE_LEN]);
        Self {
            process_id,
            thread_id,
            inst_pointer,
            source_addr,
            dest_addr,
            region_id,
            opcode,
        }
    }
}

/// Streams fixed-width [`TraceRecord`]s sequentially from a file.
pub struct TraceReader {
    reader: BufReader<File>,
}

impl TraceReader {
    /// Opens `path` for sequential trace reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }

    /// Reads the next record, or `None` at end of file.
    pub fn next_record(&mut self) -> io::Result<Option<TraceRecord>> {
        let mut buf = [0u8; RECORD_SIZE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Ok(Some(TraceRecord::from_bytes(&buf))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Writes fixed-width [`TraceRecord`]s sequentially to a file, the
/// counterpart to [`TraceReader`] used to produce synthetic trace fixtures.
pub struct TraceWriter {
    writer: std::io::BufWriter<File>,
}

impl TraceWriter {
    /// Creates (or truncates) `path` for sequential trace writing.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: std::io::BufWriter::new(File::create(path)?),
        })
    }

    /// Appends one record to the stream.
    pub fn write_record(&mut self, record: &TraceRecord) -> io::Result<()> {
        use std::io::Write as _;
        self.writer.write_all(&record.to_bytes())
    }
}
