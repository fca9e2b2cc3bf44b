//! Test Helper Utilities
//!
//! Shared utilities for testing mediaguard-df

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{generate_test_wav, test_wav_bytes, AudioConfig};
