//! Integration tests for the cirrus CLI
//!
//! These tests drive the compiled binary end to end.

mod cli_tests;
