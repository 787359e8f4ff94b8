//! Unit tests for the session module.

mod loopback_tests;
