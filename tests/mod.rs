//! Test module organization.
//!
//! This module organizes all integration tests for the tile coherence engine.


/// Common utility and error type tests.
mod common_tests;

/// Configuration parsing and validation tests.
mod config_tests;



/// End-to-end system integration tests.
mod integration_tests;


/// Protocol message and request queue tests.
mod queue_tests;



/// Tile L1/L2 controller tests.
mod tile_tests;
