//! Test helper modules for cadenza-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - audio_generator: WAV fixtures written with hound
//! - scripted_decoder: in-memory decoder with constant-valued PCM
//! - harness: engine with manual clock and memory backend

#![allow(dead_code)]

pub mod audio_generator;
pub mod harness;
pub mod scripted_decoder;

pub use audio_generator::{generate_sine_wav, read_wav_bytes};
pub use harness::{samples, test_config, wait_until, TestEngine, TICK};
pub use scripted_decoder::{ScriptedDecoderFactory, ScriptedMedium};
