// src/resilience/tests/mod.rs
//! Tests for store failure detection and recovery
