//! Focused end-to-end scenarios driven through the harness, one module per
//! concern.

mod config_validation;
mod host_only;
mod instruction_limit;
mod mock_memory;
mod offload_routing;
