//! `expected_limit_insts` halts the run once the cross-domain instruction
//! count is reached, rather than waiting on the trace to exhaust.

use crate::common::builder::TraceBuilder;
use crate::common::harness::TestContext;

#[test]
fn expected_limit_insts_halts_execution_early() {
    let trace = TraceBuilder::new()
        .load(0x1000)
        .load(0x2000)
        .load(0x3000)
        .load(0x4000)
        .build();

    let mut simulator = TestContext::new().expected_limit_insts(2).host_trace(trace).build();
    simulator.run_to_completion().expect("run to completion");

    let stats = simulator.stats();
    assert_eq!(stats.host.record_insts, Some(2));
    assert_eq!(stats.host.total_cpu_instructions, 2);
}
