//! Unit tests for the message module.
//!
//! Tests are organised by builder, covering happy paths, rejected appends and
//! finalisation.
