// Test utilities for ethex unit and integration testing.

pub mod chain_builder;
pub mod mock_node;
pub mod test_env;

pub use tempfile::TempDir;

// Re-export commonly used items
pub use chain_builder::ChainBuilder;
pub use mock_node::MockEthNode;
pub use test_env::{install_test_env, scratch_store};
