//! Proves the harness can drive a `Simulator` against a hand-mocked
//! [`mcpsim_core::memory::Memory`] implementation instead of the stand-in
//! [`mcpsim_core::memory::LatencyMemory`].

use crate::common::builder::TraceBuilder;
use crate::common::harness::TestContext;
use crate::common::mocks::accept_everything;

#[test]
fn runs_against_a_hand_mocked_memory_model() {
    let trace = TraceBuilder::new().load(0x1000).store(0x2000).build();

    let mut simulator = TestContext::new().host_trace(trace).build_with_memory(Box::new(accept_everything()));
    simulator.run_to_completion().expect("run to completion");

    let stats = simulator.stats();
    assert_eq!(stats.host.total_cpu_instructions, 2);
    assert_eq!(stats.host.total_memory_instructions, 2);
}
