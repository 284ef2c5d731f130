//! Fluent construction of synthetic trace record sequences, the test-side
//! counterpart to [`mcpsim_core::trace::TraceWriter`].

use mcpsim_core::trace::{TraceRecord, TraceWriter, OPCODE_ROI_BEGIN, OPCODE_ROI_END};

/// Accumulates [`TraceRecord`]s one instruction at a time, either to hand to
/// a harness directly or to flush to a temp file for `Simulator::new`.
#[derive(Default)]
pub struct TraceBuilder {
    records: Vec<TraceRecord>,
    thread_id: u64,
}

impl TraceBuilder {
    /// Starts an empty builder on thread 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the thread ID stamped on every subsequent record.
    pub fn thread(mut self, thread_id: u64) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Appends a `ROI_BEGIN` marker for `region`.
    pub fn roi_begin(mut self, region: u64) -> Self {
        self.records.push(TraceRecord::marker(OPCODE_ROI_BEGIN, region, self.thread_id));
        self
    }

    /// Appends a `ROI_END` marker for `region`.
    pub fn roi_end(mut self, region: u64) -> Self {
        self.records.push(TraceRecord::marker(OPCODE_ROI_END, region, self.thread_id));
        self
    }

    /// Appends a non-memory instruction with no offload region.
    pub fn bubble(mut self, opcode: &str) -> Self {
        self.records.push(TraceRecord::marker(opcode, 0, self.thread_id));
        self
    }

    /// Appends a plain load outside any region.
    pub fn load(self, addr: u64) -> Self {
        self.region_load(0, 0, addr)
    }

    /// Appends a plain store outside any region.
    pub fn store(self, addr: u64) -> Self {
        self.region_store(0, 0, addr)
    }

    /// Appends a load tagged with `region` and `inst_pointer`, for exercising
    /// offload routing (which dispatches on `inst_pointer`, not on the
    /// address being loaded).
    pub fn region_load(mut self, region: u64, inst_pointer: u64, addr: u64) -> Self {
        let mut record = TraceRecord::marker("LOAD", region, self.thread_id);
        record.inst_pointer = inst_pointer;
        record.source_addr[0] = addr;
        self.records.push(record);
        self
    }

    /// Appends a store tagged with `region` and `inst_pointer`.
    pub fn region_store(mut self, region: u64, inst_pointer: u64, addr: u64) -> Self {
        let mut record = TraceRecord::marker("STORE", region, self.thread_id);
        record.inst_pointer = inst_pointer;
        record.dest_addr[0] = addr;
        self.records.push(record);
        self
    }

    /// Consumes the builder, returning the accumulated records.
    pub fn build(self) -> Vec<TraceRecord> {
        self.records
    }

    /// Flushes the accumulated records to a fresh temp file, ready to be
    /// named in a `--trace` argument or `Simulator::new`'s trace list.
    pub fn into_file(self) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("create temp trace file");
        let mut writer = TraceWriter::create(file.path()).expect("open temp trace file for writing");
        for record in &self.records {
            writer.write_record(record).expect("write trace record");
        }
        file
    }
}
