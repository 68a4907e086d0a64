//! The transmit pipeline (C12, §4.13): turns one `TxDescriptor` into
//! resampled IQ samples written into a TX ring buffer.

pub mod tx_pipeline;

pub use tx_pipeline::TxPipeline;
