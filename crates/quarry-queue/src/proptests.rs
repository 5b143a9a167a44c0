//! Property-based tests for queue delivery order.
