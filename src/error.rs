//! Error taxonomy for configuration and construction-time failures.
//!
//! Per the error handling design, only config invariants and construction
//! failures surface as `Result`. Everything observable by the upper-MAC at
//! runtime (PLCF/TB CRC failure, infeasible packet sizes, TX buffer
//! unavailability, ...) is reported through plain fields on report structs,
//! never through this taxonomy.

use thiserror::Error;

/// Fatal configuration error, raised only at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("field `{field}` = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("chunk_length ({chunk_length}) is not a multiple of the resample stride ({stride})")]
    ChunkNotAlignedToStride { chunk_length: u64, stride: u64 },

    #[error("{nof_sync_workers} sync workers requested but the RX buffer can only be split into {max_splits}")]
    TooManySyncWorkers {
        nof_sync_workers: u32,
        max_splits: u32,
    },

    #[error("json export enabled with only {nof_tx_rx_workers} TX/RX worker(s); at least 2 are required so one can stall on disk I/O")]
    JsonExportNeedsTwoWorkers { nof_tx_rx_workers: u32 },

    #[error("failed to parse worker pool config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime construction error (not a MAC-visible PHY event).
#[derive(Debug, Error)]
pub enum PhyError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("resampler requires at least {required} input samples, got {got}")]
    ResampleUnderflow { required: usize, got: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
