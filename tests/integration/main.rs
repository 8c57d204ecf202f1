//! Integration test entry point.

mod mock_broker;
