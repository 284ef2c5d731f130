//! `TestContext`: a fluent builder that wires a [`Simulator`] from a
//! [`Config`] plus zero or more Host trace fixtures, so scenario tests don't
//! each re-derive the plumbing `mcpsim-cli`'s `cmd_run` does.

use std::collections::HashMap;
use std::path::PathBuf;

use mcpsim_core::config::{Config, SimMode};
use mcpsim_core::memory::{LatencyMemory, Memory};
use mcpsim_core::offload::MemVsNonMem;
use mcpsim_core::opcode_table::OpcodeTable;
use mcpsim_core::sim::Simulator;
use mcpsim_core::trace::{TraceRecord, TraceWriter};

/// Builds a `Simulator` ready to run, defaulting to a Host-Only, single-core
/// configuration with no trace assigned.
pub struct TestContext {
    pub config: Config,
    traces: Vec<tempfile::NamedTempFile>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Starts from `Config::default()`.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            traces: Vec::new(),
        }
    }

    /// Sets the offload policy mode.
    pub fn sim_mode(mut self, mode: SimMode) -> Self {
        self.config.sim_mode = mode;
        self
    }

    /// Sets the NMP core count (and thus the address mapper's vault count).
    pub fn number_mcp_cores(mut self, n: u32) -> Self {
        self.config.number_mcp_cores = n;
        self
    }

    /// Sets the hard instruction-count termination limit.
    pub fn expected_limit_insts(mut self, n: u64) -> Self {
        self.config.expected_limit_insts = n;
        self
    }

    /// Sets the stand-in memory model's fixed per-access latency.
    pub fn mem_latency_cycles(mut self, cycles: u64) -> Self {
        self.config.mem_latency_cycles = cycles;
        self
    }

    /// Appends one Host trace file, assigning it to the next core by
    /// position and growing `number_cores` to match.
    pub fn host_trace(mut self, records: Vec<TraceRecord>) -> Self {
        let file = tempfile::NamedTempFile::new().expect("create temp trace file");
        let mut writer = TraceWriter::create(file.path()).expect("open temp trace file for writing");
        for record in &records {
            writer.write_record(record).expect("write trace record");
        }
        self.traces.push(file);
        self.config.number_cores = self.traces.len() as u32;
        self
    }

    fn trace_paths(&self) -> Vec<PathBuf> {
        self.traces.iter().map(|f| f.path().to_path_buf()).collect()
    }

    /// Builds the `Simulator`, backed by the stand-in [`LatencyMemory`]
    /// model configured from `self.config`.
    ///
    /// # Panics
    ///
    /// Panics if construction fails; scenario tests are expected to build a
    /// valid configuration and call this only once they have.
    pub fn build(self) -> Simulator {
        let memory = Box::new(LatencyMemory::new(
            self.config.mem_latency_cycles,
            self.config.mem_clk_ns,
            self.config.mem_max_in_flight,
        ));
        self.build_with_memory(memory)
    }

    /// Builds the `Simulator` with a caller-supplied memory model, for tests
    /// that drive a mock rather than the stand-in latency model.
    ///
    /// # Panics
    ///
    /// Panics if construction fails.
    pub fn build_with_memory(self, memory: Box<dyn Memory>) -> Simulator {
        let traces = self.trace_paths();
        Simulator::new(self.config, traces, OpcodeTable::empty(), Box::new(MemVsNonMem), HashMap::new(), memory)
            .expect("test harness built an invalid simulator configuration")
    }
}
