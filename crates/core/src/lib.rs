//! Near-memory-processing co-simulation engine.
//!
//! This crate implements a cycle-level, trace-driven, discrete-event
//! co-simulator for a 3D-stacked (HMC-style) near-memory-processing system.
//! It drives three execution domains against recorded instruction traces:
//! 1. **Host:** general-purpose cores with private L1/L2 caches and a shared LLC.
//! 2. **NMP:** one compute unit per memory vault, private L1 only, no LLC.
//! 3. **NLP:** LLC-side compute units that use the Host's LLC as their only
//!    backing store.
//!
//! The top-level [`sim::Simulator`] owns every domain's [`processor::Processor`],
//! the shared LLC, the [`memory::Memory`] model, and a [`stats::StatsRegistry`],
//! and advances them tick by tick on independently clocked schedules.

/// Compiler basic-block annotation loading (`proc_{id}_bb_info.json`).
pub mod bb_info;
/// Inclusive, write-back, write-allocate cache hierarchy with MSHR-based misses.
pub mod cache;
/// Shared time-ordered completion queues a cache chain schedules into.
pub mod cache_system;
/// Addressing, configuration, and fatal-error types shared across the crate.
pub mod common;
/// Simulator configuration: defaults, enums, and the top-level `Config` struct.
pub mod config;
/// The trace-driven per-core execution model and its scheduling queue.
pub mod core_model;
/// The external DRAM timing model contract and a fixed-latency reference implementation.
pub mod memory;
/// Offload decision policy, region nesting, and the pluggable strategy trait.
pub mod offload;
/// Opcode-to-bubble-cycle lookup table.
pub mod opcode_table;
/// One execution domain's cores and their shared cache-completion system.
pub mod processor;
/// Fixed-capacity out-of-order retirement buffer.
pub mod reorder_window;
/// Top-level `Simulator`: multi-clock tick scheduling and per-domain control flow.
pub mod sim;
/// Per-domain and aggregate performance counters.
pub mod stats;
/// Wire-exact trace record format and file reader.
pub mod trace;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Fatal, non-retryable simulation error.
pub use crate::common::SimError;
/// Top-level simulator; owns every domain's processor, the shared LLC, and memory.
pub use crate::sim::Simulator;
