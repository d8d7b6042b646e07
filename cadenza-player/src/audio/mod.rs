//! External audio boundaries: decoders and output backends

pub mod cpal_backend;
pub mod decoder;
pub mod memory_backend;
pub mod output;
pub mod types;

pub use cpal_backend::CpalBackend;
pub use decoder::{Decoder, DecoderFactory, SymphoniaDecoderFactory};
pub use memory_backend::MemoryBackend;
pub use output::{AudioBackend, OutputSink, SinkKind};
pub use types::{AudioEffect, FormatInfo, PcmChunk};
