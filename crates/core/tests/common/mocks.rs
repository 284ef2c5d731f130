//! A hand-mocked [`Memory`] implementation, built with `mockall::mock!`
//! against the external trait exactly as the teacher's bus mock does for
//! `Device` — not `#[automock]` on the trait definition itself, since the
//! trait lives in `mcpsim-core`, not in this test crate.

use mcpsim_core::memory::{Memory, Request};
use mockall::mock;

mock! {
    pub SimMemory {}

    impl Memory for SimMemory {
        fn send_request(&mut self, req: &mut Request, now_cycle: u64) -> bool;
        fn tick(&mut self, now_cycle: u64);
        fn poll_completed(&mut self) -> Option<Request>;
        fn pending_request_count(&self) -> u64;
        fn pending_link_packet_count(&self) -> u64;
        fn clk_ns(&self) -> f64;
        fn page_allocator(&mut self, vaddr: u64, core_id: u32) -> u64;
    }
}

/// Builds a `MockSimMemory` that behaves like a zero-latency, infinite-capacity
/// memory: every request is accepted and becomes visible on the same tick it
/// was sent, `page_allocator` is the identity, and there is never anything
/// outstanding. Good enough to prove the harness can drive a `Simulator`
/// against a mock rather than the stand-in [`mcpsim_core::memory::LatencyMemory`].
pub fn accept_everything() -> MockSimMemory {
    let mut mock = MockSimMemory::new();
    mock.expect_send_request().returning(|req, now| {
        req.depart = now;
        true
    });
    mock.expect_tick().returning(|_| {});
    mock.expect_poll_completed().returning(|| None);
    mock.expect_pending_request_count().returning(|| 0);
    mock.expect_pending_link_packet_count().returning(|| 0);
    mock.expect_clk_ns().returning(|| 1.0);
    mock.expect_page_allocator().returning(|vaddr, _core_id| vaddr);
    mock
}
