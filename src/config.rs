//! Worker-pool configuration: the config surface named in §6, JSON-parsed
//! once at startup, every numeric field validated against a documented
//! `[min, max]` range at the site where it is consumed.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// CPU affinity / real-time priority hint for one worker thread.
///
/// Best-effort: on platforms where pinning threads or raising scheduling
/// priority is unavailable through safe, portable means, these hints are
/// accepted but ignored rather than causing a startup failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThreadCorePrioConfig {
    pub core: Option<u32>,
    pub priority: Option<i32>,
}

impl Default for ThreadCorePrioConfig {
    fn default() -> Self {
        Self {
            core: None,
            priority: None,
        }
    }
}

/// One worker_pool_config per logical PHY (§6), JSON-parsed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Every worker pool has a unique ID starting at 0.
    pub id: u32,

    /// Minimum oversampling factor at the radio device class's maximum
    /// (u, b), used to derive the hardware sample rate before resampling
    /// negotiation.
    pub os_min: u32,

    /// Number of jobs bufferable in the job queue (C9). Typical value 64+.
    pub nof_jobs: usize,

    /// RX ring buffer length, in slots, on the radio side (24 slots ~ 10ms).
    pub rx_ant_streams_length_slots: u32,

    /// Chunk length (C6), in u=8 subslots. A value of 32 is two slots.
    pub rx_chunk_length_u8subslot: u32,

    /// Resampling unit length, in u=8 subslots (typical 1, 2, 4).
    pub rx_chunk_unit_length_u8subslot: u32,

    /// Regular-job period, in multiples of chunks (C7 job_regular_period).
    pub rx_job_regular_period: u32,

    /// Number of sync workers (C10 pool size).
    pub nof_worker_sync: u32,

    /// Number of TX/RX workers (C11 pool size). Must be >= 2 when
    /// `json_export_length > 0` so that one worker stalling on disk I/O
    /// cannot stall the whole pool (§5).
    pub nof_worker_tx_rx: u32,

    /// Per-worker thread affinity/priority hints.
    pub threads_core_prio_config_sync_vec: Vec<ThreadCorePrioConfig>,
    pub threads_core_prio_config_tx_rx_vec: Vec<ThreadCorePrioConfig>,

    /// Default channel-estimation mode: true selects LR (left-right),
    /// false selects L (left-only, lower latency/quality).
    pub chestim_mode_lr_default: bool,
    pub chestim_mode_lr_t_stride_default: u32,

    /// Number of entries buffered before a JSON export flush; 0 disables
    /// export entirely (feature `json-export` also gates compilation).
    pub json_export_length: u32,

    /// Maximum number of sync reports a sync worker may buffer before it
    /// must block on the baton (§4.7).
    pub max_bufferable_syncs: usize,
}

impl WorkerPoolConfig {
    /// Parse from a JSON document and validate every numeric field.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let cfg: WorkerPoolConfig = serde_json::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate every field against its documented range, and cross-field
    /// invariants (chunk/stride alignment, RX-buffer split feasibility,
    /// JSON-export worker count).
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("os_min", self.os_min as f64, 1.0, 64.0)?;
        check_range("nof_jobs", self.nof_jobs as f64, 1.0, 1 << 20)?;
        check_range(
            "rx_ant_streams_length_slots",
            self.rx_ant_streams_length_slots as f64,
            1.0,
            1 << 16,
        )?;
        check_range(
            "rx_chunk_length_u8subslot",
            self.rx_chunk_length_u8subslot as f64,
            1.0,
            1 << 16,
        )?;
        check_range(
            "rx_chunk_unit_length_u8subslot",
            self.rx_chunk_unit_length_u8subslot as f64,
            1.0,
            1024.0,
        )?;
        check_range(
            "rx_job_regular_period",
            self.rx_job_regular_period as f64,
            1.0,
            1 << 16,
        )?;
        check_range("nof_worker_sync", self.nof_worker_sync as f64, 1.0, 64.0)?;
        check_range(
            "nof_worker_tx_rx",
            self.nof_worker_tx_rx as f64,
            1.0,
            64.0,
        )?;
        check_range(
            "chestim_mode_lr_t_stride_default",
            self.chestim_mode_lr_t_stride_default as f64,
            1.0,
            64.0,
        )?;
        check_range(
            "max_bufferable_syncs",
            self.max_bufferable_syncs as f64,
            1.0,
            4096.0,
        )?;

        if self.rx_chunk_unit_length_u8subslot == 0
            || self.rx_chunk_length_u8subslot % self.rx_chunk_unit_length_u8subslot != 0
        {
            return Err(ConfigError::ChunkNotAlignedToStride {
                chunk_length: self.rx_chunk_length_u8subslot as u64,
                stride: self.rx_chunk_unit_length_u8subslot as u64,
            });
        }

        // rx_ant_streams_length_slots must be divisible by
        // nof_worker_sync * rx_chunk_length_u8subslot expressed in the same
        // unit; here both are already in u8-subslot-equivalent slots so we
        // require divisibility by the number of sync workers directly.
        if self.rx_ant_streams_length_slots % self.nof_worker_sync != 0 {
            return Err(ConfigError::TooManySyncWorkers {
                nof_sync_workers: self.nof_worker_sync,
                max_splits: self.rx_ant_streams_length_slots,
            });
        }

        if self.json_export_length > 0 && self.nof_worker_tx_rx < 2 {
            return Err(ConfigError::JsonExportNeedsTwoWorkers {
                nof_tx_rx_workers: self.nof_worker_tx_rx,
            });
        }

        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
