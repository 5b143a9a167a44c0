//! Property-based tests for pause nesting.
