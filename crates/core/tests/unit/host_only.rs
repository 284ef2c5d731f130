//! Host-Only mode: every record retires on the Host core, nothing is ever
//! offloaded regardless of region markers.

use crate::common::builder::TraceBuilder;
use crate::common::harness::TestContext;

#[test]
fn single_region_stays_on_host_and_retires_every_instruction() {
    let trace = TraceBuilder::new()
        .roi_begin(3)
        .load(0x1000)
        .store(0x2000)
        .roi_end(3)
        .build();

    let mut simulator = TestContext::new().host_trace(trace).build();
    simulator.run_to_completion().expect("run to completion");

    let stats = simulator.stats();
    assert_eq!(stats.host.total_cpu_instructions, 2);
    assert_eq!(stats.host.total_memory_instructions, 2);
    assert_eq!(stats.host.record_region_count, 1);
    assert_eq!(stats.host.record_offload_region_count, 0);
    assert_eq!(stats.nmp.total_cpu_instructions, 0);
    assert_eq!(stats.nlp.total_cpu_instructions, 0);
}

#[test]
fn bubbles_outside_any_region_cost_no_memory_instructions() {
    let trace = TraceBuilder::new().bubble("ADD").bubble("ADD").load(0x1000).build();

    let mut simulator = TestContext::new().host_trace(trace).build();
    simulator.run_to_completion().expect("run to completion");

    let stats = simulator.stats();
    assert_eq!(stats.host.total_cpu_instructions, 3);
    assert_eq!(stats.host.total_memory_instructions, 1);
}
