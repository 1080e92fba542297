//! Ingestion Pipeline: turns decoded upstream frames into cached, fanned-out
//! ticks and candles.

pub mod pipeline;

pub use pipeline::IngestionPipeline;
