//! Configuration system for the co-simulation engine.
//!
//! This module defines every config key named in the external interface. It
//! provides:
//! 1. **Defaults:** baseline HMC geometry, tick periods, and policy knobs.
//! 2. **Structures:** a flat root [`Config`] matching the source's flat key
//!    namespace, with `#[serde(default = "...")]` fallbacks so a config file
//!    only needs to override what it cares about.
//! 3. **Enums:** core organization, simulation mode, and cache topology.
//!
//! Configuration is supplied as JSON at the path named by `--config`; use
//! [`Config::default`] to get a runnable Host-Only configuration without a
//! file at all.

use serde::Deserialize;

/// Default configuration constants, grounded in the original `Config.h`
/// getter fallbacks.
mod defaults {
    /// Host core clock, in MHz.
    pub const CPU_FREQUENCY: f64 = 4000.0;

    /// NMP core clock, in MHz.
    pub const MCP_FREQUENCY: f64 = 1600.0;

    /// Number of Host cores.
    pub const NUMBER_CORES: u32 = 1;

    /// Number of NMP cores (one per vault is typical, but not enforced).
    pub const NUMBER_MCP_CORES: u32 = 16;

    /// Number of NLP cores colocated with the LLC.
    pub const LLC_SLICE: u32 = 4;

    /// HMC channels.
    pub const CHANNELS: u32 = 4;

    /// HMC ranks per channel.
    pub const RANKS: u32 = 1;

    /// HMC subarrays per bank.
    pub const SUBARRAYS: u32 = 8;

    /// HMC stacks (single stack assumed, see spec Non-goals).
    pub const STACKS: u32 = 1;

    /// Per-offload-decision overhead, in Host cycles.
    pub const OVERHEAD_CYCLE: u64 = 100;

    /// Bounded NMP/NLP input queue depth; 0 means unlimited.
    pub const MCP_CORE_QUEUE_MAX_SIZE: u32 = 0;

    /// Reorder window depth (out-of-order Host/NLP cores).
    pub const WINDOW_DEPTH: usize = 128;

    /// Reorder window retirement width (instructions retired per tick).
    pub const WINDOW_IPC: usize = 4;

    /// Warmup instruction count (Host-only, memory-only phase).
    pub const SIMULATED_WARMUP_INSTS: u64 = 0;

    /// Instruction-count termination limit; 0 means unlimited.
    pub const EXPECTED_LIMIT_INSTS: u64 = 0;

    /// Address bits considered significant by the vault mapper.
    pub const MAX_ADDRESS_BITS: u32 = 34;

    /// Transaction (byte-offset-within-burst) bits in the vault mapper.
    pub const TX_BITS: u32 = 5;

    /// Flit bits in the vault mapper (column field width before the vault field).
    pub const FLIT_NUM_BITS: u32 = 8;

    /// L1 accumulated hit latency, in cycles.
    pub const L1_LATENCY: u64 = 4;

    /// L2 accumulated hit latency, in cycles.
    pub const L2_LATENCY: u64 = 16;

    /// L3 (LLC) accumulated hit latency, in cycles.
    pub const L3_LATENCY: u64 = 47;

    /// L1 cache size, in bytes.
    pub const L1_SIZE: usize = 32 * 1024;

    /// L2 cache size, in bytes.
    pub const L2_SIZE: usize = 256 * 1024;

    /// LLC size, in bytes.
    pub const L3_SIZE: usize = 8 * 1024 * 1024;

    /// Cache block size, in bytes.
    pub const LINE_BYTES: usize = 64;

    /// Cache associativity (uniform across levels).
    pub const ASSOC: usize = 8;

    /// Outstanding misses per cache (MSHR count).
    pub const MSHR_COUNT: usize = 8;

    /// Per-access energy, in nanojoules, one entry per level (L1, L2, L3).
    pub const ENERGY_PER_ACCESS: [f64; 3] = [0.494, 3.307, 6.995];

    /// Fixed per-access latency for the stand-in memory model, in cycles.
    pub const MEM_LATENCY_CYCLES: u64 = 100;

    /// Stand-in memory model's own tick period, in nanoseconds.
    pub const MEM_CLK_NS: f64 = 1.25;

    /// Outstanding-request capacity of the stand-in memory model.
    pub const MEM_MAX_IN_FLIGHT: usize = 64;
}

/// Core execution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoreOrg {
    /// In-order issue and retirement, no reorder window.
    InOrder,
    /// Out-of-order retirement via a fixed-capacity reorder window.
    #[default]
    OutOrder,
}

/// Instruction issue width descriptor for NMP/NLP cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstIssue {
    /// One instruction issued per tick.
    #[default]
    Single,
}

/// Host cache topology selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheTopology {
    /// Private L1/L2 per core plus a shared LLC.
    #[default]
    #[serde(rename = "all")]
    All,
    /// LLC only; Host cores issue directly to the shared cache.
    L3,
}

/// NMP cache topology selector; NMP cores have at most one private level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum McpCacheTopology {
    /// Each NMP core has a private L1.
    #[default]
    L1,
    /// NMP cores issue directly to memory, uncached.
    None,
}

/// Offload policy mode (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SimMode {
    /// Everything executes on the Host; ROI markers are skipped.
    #[default]
    #[serde(rename = "Host-Only")]
    HostOnly,
    /// Every ROI region is unconditionally offloaded.
    #[serde(rename = "All-Offload")]
    AllOffload,
    /// Offload decided per-region from BB-info / telemetry.
    #[serde(rename = "Co-Simulation")]
    CoSimulation,
    /// Every non-marker instruction bypasses to NMP.
    #[serde(rename = "MCP-Only")]
    McpOnly,
}

/// An on/off switch spelled the way the source config spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    /// Feature enabled.
    On,
    /// Feature disabled.
    Off,
}

impl Toggle {
    /// Returns whether this toggle is `On`.
    pub fn is_on(self) -> bool {
        matches!(self, Toggle::On)
    }
}

/// Root configuration structure. Fields mirror the flat namespace named in
/// the external interfaces section exactly; there is deliberately no nested
/// nesting to stay close to the original key names.
///
/// # Examples
///
/// ```
/// use mcpsim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.number_cores, 1);
/// assert!(config.early_exit.is_on());
/// ```
///
/// Deserializing a partial override from JSON:
///
/// ```
/// use mcpsim_core::config::{Config, SimMode};
///
/// let json = r#"{
///     "sim_mode": "All-Offload",
///     "number_mcp_cores": 8,
///     "nlp_facility": "on"
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.sim_mode, SimMode::AllOffload);
/// assert_eq!(config.number_mcp_cores, 8);
/// assert!(config.nlp_facility.is_on());
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Memory standard; only `"HMC"` is currently valid.
    #[serde(default = "Config::default_standard")]
    pub standard: String,
    /// HMC channels.
    #[serde(default = "Config::default_channels")]
    pub channels: u32,
    /// HMC ranks per channel.
    #[serde(default = "Config::default_ranks")]
    pub ranks: u32,
    /// HMC subarrays per bank.
    #[serde(default = "Config::default_subarrays")]
    pub subarrays: u32,
    /// HMC stacks; single stack assumed (Non-goals).
    #[serde(default = "Config::default_stacks")]
    pub stacks: u32,

    /// Host core clock, in MHz.
    #[serde(default = "Config::default_cpu_frequency")]
    pub cpu_frequency: f64,
    /// NMP core clock, in MHz.
    #[serde(default = "Config::default_mcp_frequency")]
    pub mcp_frequency: f64,

    /// Number of Host cores.
    #[serde(default = "Config::default_number_cores")]
    pub number_cores: u32,
    /// Number of NMP cores.
    #[serde(default = "Config::default_number_mcp_cores")]
    pub number_mcp_cores: u32,
    /// Number of NLP cores colocated with the LLC.
    #[serde(default = "Config::default_llc_slice")]
    pub llc_slice: u32,

    /// Host core execution model.
    #[serde(default)]
    pub core_org: CoreOrg,
    /// NMP core execution model.
    #[serde(default)]
    pub mcp_core_org: CoreOrg,
    /// NMP core issue width descriptor.
    #[serde(default)]
    pub mcp_core_inst_issue: InstIssue,

    /// Host cache topology.
    #[serde(default)]
    pub cache: CacheTopology,
    /// NMP cache topology.
    #[serde(default)]
    pub mcp_cache: McpCacheTopology,

    /// Bounded NMP/NLP input queue depth; 0 means unlimited.
    #[serde(default = "Config::default_mcp_core_queue_max_size")]
    pub mcp_core_queue_max_size: u32,

    /// Offload policy mode.
    #[serde(default)]
    pub sim_mode: SimMode,
    /// Whether the NLP (LLC-side) processor is present.
    #[serde(default = "Config::default_nlp_off")]
    pub nlp_facility: Toggle,

    /// Per-offload-decision overhead charged to the initiating Host core.
    #[serde(default = "Config::default_overhead_cycle")]
    pub overhead_cycle: u64,

    /// Whether additional worker threads may be spawned to parse peer traces.
    /// Not exercised by the single-threaded tick loop (§5); retained so
    /// config files written for the original tool still parse.
    #[serde(default = "Config::default_toggle_off")]
    pub host_thread_spawning: Toggle,
    /// Whether the blocking instruction-fetch model is active.
    #[serde(default = "Config::default_toggle_on")]
    pub consider_inst_fetching: Toggle,

    /// Instructions to run before the main (multi-domain) phase begins.
    #[serde(default = "Config::default_simulated_warmup_insts")]
    pub simulated_warmup_insts: u64,
    /// Hard instruction-count termination limit; 0 means unlimited.
    #[serde(default = "Config::default_expected_limit_insts")]
    pub expected_limit_insts: u64,

    /// Directory containing `proc_{id}_bb_info.json` descriptors.
    #[serde(default = "Config::default_json_path")]
    pub json_path: String,
    /// Path to DRAMPower memory specification file (consumed only by the
    /// energy-reporting side of the stand-in memory model).
    #[serde(default = "Config::default_drampower_memspecs")]
    pub drampower_memspecs: String,

    /// Early-exit termination mode; defaults on (§4.8).
    #[serde(default = "Config::default_early_exit")]
    pub early_exit: Toggle,

    /// Fixed per-access latency for the stand-in memory model, in cycles.
    #[serde(default = "Config::default_mem_latency_cycles")]
    pub mem_latency_cycles: u64,
    /// Stand-in memory model's own tick period, in nanoseconds.
    #[serde(default = "Config::default_mem_clk_ns")]
    pub mem_clk_ns: f64,
    /// Outstanding-request capacity of the stand-in memory model.
    #[serde(default = "Config::default_mem_max_in_flight")]
    pub mem_max_in_flight: usize,

    /// Path to a two-column `opcode,cycles` CSV used to look up non-memory
    /// bubble cycles; `None` means every opcode defaults to zero bubbles.
    #[serde(default)]
    pub opcode_table_path: Option<String>,
}

impl Config {
    fn default_standard() -> String {
        "HMC".to_string()
    }
    fn default_channels() -> u32 {
        defaults::CHANNELS
    }
    fn default_ranks() -> u32 {
        defaults::RANKS
    }
    fn default_subarrays() -> u32 {
        defaults::SUBARRAYS
    }
    fn default_stacks() -> u32 {
        defaults::STACKS
    }
    fn default_cpu_frequency() -> f64 {
        defaults::CPU_FREQUENCY
    }
    fn default_mcp_frequency() -> f64 {
        defaults::MCP_FREQUENCY
    }
    fn default_number_cores() -> u32 {
        defaults::NUMBER_CORES
    }
    fn default_number_mcp_cores() -> u32 {
        defaults::NUMBER_MCP_CORES
    }
    fn default_llc_slice() -> u32 {
        defaults::LLC_SLICE
    }
    fn default_mcp_core_queue_max_size() -> u32 {
        defaults::MCP_CORE_QUEUE_MAX_SIZE
    }
    fn default_nlp_off() -> Toggle {
        Toggle::Off
    }
    fn default_overhead_cycle() -> u64 {
        defaults::OVERHEAD_CYCLE
    }
    fn default_toggle_off() -> Toggle {
        Toggle::Off
    }
    fn default_toggle_on() -> Toggle {
        Toggle::On
    }
    fn default_simulated_warmup_insts() -> u64 {
        defaults::SIMULATED_WARMUP_INSTS
    }
    fn default_expected_limit_insts() -> u64 {
        defaults::EXPECTED_LIMIT_INSTS
    }
    fn default_json_path() -> String {
        ".".to_string()
    }
    fn default_drampower_memspecs() -> String {
        String::new()
    }
    fn default_early_exit() -> Toggle {
        Toggle::On
    }
    fn default_mem_latency_cycles() -> u64 {
        defaults::MEM_LATENCY_CYCLES
    }
    fn default_mem_clk_ns() -> f64 {
        defaults::MEM_CLK_NS
    }
    fn default_mem_max_in_flight() -> usize {
        defaults::MEM_MAX_IN_FLIGHT
    }

    /// Whether Host cores have private L1/L2 caches in front of the LLC.
    ///
    /// This is an OR, not an AND, preserved from the original: core-private
    /// caching is on if either `cache == "all"` or `mcp_cache == "L1"`, even
    /// though the latter names the NMP side. Config files relying on this
    /// quirk still behave identically.
    pub fn has_core_caches(&self) -> bool {
        self.cache == CacheTopology::All || self.mcp_cache == McpCacheTopology::L1
    }

    /// Whether a shared LLC exists at all (it always does in this topology
    /// set, but the check mirrors the source's conditional construction).
    pub fn has_l3_cache(&self) -> bool {
        matches!(self.cache, CacheTopology::All | CacheTopology::L3)
    }

    /// Geometry used by the address-to-vault mapper.
    pub fn max_address_bits(&self) -> u32 {
        defaults::MAX_ADDRESS_BITS
    }
    /// Transaction bits consumed by the vault mapper.
    pub fn tx_bits(&self) -> u32 {
        defaults::TX_BITS
    }
    /// Flit bits consumed by the vault mapper.
    pub fn flit_num_bits(&self) -> u32 {
        defaults::FLIT_NUM_BITS
    }

    /// Reorder window depth.
    pub fn window_depth(&self) -> usize {
        defaults::WINDOW_DEPTH
    }
    /// Reorder window retirement width.
    pub fn window_ipc(&self) -> usize {
        defaults::WINDOW_IPC
    }

    /// Per-level cache geometry: `(size_bytes, latency_cycles)` for L1, L2, L3.
    pub fn cache_levels() -> [(usize, u64); 3] {
        [
            (defaults::L1_SIZE, defaults::L1_LATENCY),
            (defaults::L2_SIZE, defaults::L2_LATENCY),
            (defaults::L3_SIZE, defaults::L3_LATENCY),
        ]
    }
    /// Cache block size shared by every level.
    pub fn line_bytes(&self) -> usize {
        defaults::LINE_BYTES
    }
    /// Cache associativity shared by every level.
    pub fn assoc(&self) -> usize {
        defaults::ASSOC
    }
    /// Outstanding-miss (MSHR) capacity shared by every level.
    pub fn mshr_count(&self) -> usize {
        defaults::MSHR_COUNT
    }
    /// Per-level energy constant, in nanojoules per access.
    pub fn energy_per_access() -> [f64; 3] {
        defaults::ENERGY_PER_ACCESS
    }

    /// Validates the loaded config against the constraints named in the
    /// error handling design (§11.1 `SimError::Config`).
    pub fn validate(&self) -> Result<(), crate::common::SimError> {
        if self.standard != "HMC" {
            return Err(crate::common::SimError::Config(format!(
                "unsupported memory standard {:?}; only \"HMC\" is implemented",
                self.standard
            )));
        }
        if self.number_cores == 0 {
            return Err(crate::common::SimError::Config(
                "number_cores must be at least 1".to_string(),
            ));
        }
        if self.sim_mode != SimMode::HostOnly && self.number_mcp_cores == 0 {
            return Err(crate::common::SimError::Config(
                "number_mcp_cores must be at least 1 unless sim_mode is Host-Only".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            standard: Self::default_standard(),
            channels: Self::default_channels(),
            ranks: Self::default_ranks(),
            subarrays: Self::default_subarrays(),
            stacks: Self::default_stacks(),
            cpu_frequency: Self::default_cpu_frequency(),
            mcp_frequency: Self::default_mcp_frequency(),
            number_cores: Self::default_number_cores(),
            number_mcp_cores: Self::default_number_mcp_cores(),
            llc_slice: Self::default_llc_slice(),
            core_org: CoreOrg::default(),
            mcp_core_org: CoreOrg::default(),
            mcp_core_inst_issue: InstIssue::default(),
            cache: CacheTopology::default(),
            mcp_cache: McpCacheTopology::default(),
            mcp_core_queue_max_size: Self::default_mcp_core_queue_max_size(),
            sim_mode: SimMode::default(),
            nlp_facility: Self::default_nlp_off(),
            overhead_cycle: Self::default_overhead_cycle(),
            host_thread_spawning: Self::default_toggle_off(),
            consider_inst_fetching: Self::default_toggle_on(),
            simulated_warmup_insts: Self::default_simulated_warmup_insts(),
            expected_limit_insts: Self::default_expected_limit_insts(),
            json_path: Self::default_json_path(),
            drampower_memspecs: Self::default_drampower_memspecs(),
            early_exit: Self::default_early_exit(),
            mem_latency_cycles: Self::default_mem_latency_cycles(),
            mem_clk_ns: Self::default_mem_clk_ns(),
            mem_max_in_flight: Self::default_mem_max_in_flight(),
            opcode_table_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn unsupported_standard_is_rejected() {
        let mut config = Config::default();
        config.standard = "DDR4".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn has_core_caches_is_an_or_not_an_and() {
        let mut config = Config::default();
        config.cache = CacheTopology::L3;
        config.mcp_cache = McpCacheTopology::L1;
        assert!(config.has_core_caches());
    }
}
