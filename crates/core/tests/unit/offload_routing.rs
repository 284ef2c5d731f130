//! All-Offload mode: records inside an offload region never retire on Host,
//! they dispatch to the NMP domain instead. Per-vault precision is exercised
//! white-box inside `sim.rs`'s own test module; here we only assert the
//! aggregate, publicly observable outcome.

use mcpsim_core::config::SimMode;

use crate::common::builder::TraceBuilder;
use crate::common::harness::TestContext;

#[test]
fn all_offload_region_dispatches_every_record_to_nmp() {
    let trace = TraceBuilder::new()
        .roi_begin(5)
        .region_load(5, 0x000, 0x10)
        .region_load(5, 0x200, 0x20)
        .roi_end(5)
        .build();

    let mut simulator = TestContext::new()
        .sim_mode(SimMode::AllOffload)
        .number_mcp_cores(4)
        .host_trace(trace)
        .build();
    simulator.run_to_completion().expect("run to completion");

    let stats = simulator.stats();
    assert_eq!(stats.host.total_cpu_instructions, 0);
    assert_eq!(stats.nmp.total_cpu_instructions, 2);
    assert_eq!(stats.host.record_region_count, 1);
    assert_eq!(stats.host.record_offload_region_count, 1);
}
