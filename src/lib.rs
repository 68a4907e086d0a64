// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # dectnrp-phy
//!
//! A pure Rust PHY layer for DECT NR+ (ETSI TS 103 636-3), built around a
//! pool of worker threads that turn a shared-memory RX ring buffer into
//! synchronized, decoded transport blocks, and a transmit pipeline that
//! turns MAC transport blocks back into baseband IQ samples.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dectnrp_phy::config::WorkerPoolConfig;
//! use dectnrp_phy::pool::worker_pool::WorkerPool;
//!
//! fn main() {
//!     let cfg: WorkerPoolConfig =
//!         serde_json::from_str(include_str!("../tests/fixtures/worker_pool_config.json"))
//!             .expect("valid worker_pool_config.json");
//!     // let pool = WorkerPool::start(cfg, ring, make_chunk, termination_point, synced_rx, tx_renderer, tx_buffers, callbacks);
//!     // pool.stop();
//!     let _ = cfg;
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          MAC (upper layer)                          |
//! |                  `TerminationPoint` trait (§6 boundary)             |
//! +---------------------------------------------------------------------+
//! |                         Worker Pool (C7-C11)                        |
//! |  Sync workers --baton--> Job Queue (C9) --token--> TX/RX workers     |
//! +---------------------------------------------------------------------+
//! |      Sync (C5a-c/C6)     |   TX pipeline (C12)  | RX-synced (C13)    |
//! |  autocorr / crosscorr     |  OFDM mod + codebook |  OFDM demod + FEC  |
//! +---------------------------------------------------------------------+
//! |           C1 RX ring / C2 TX ring / C3 resampler-pacer               |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`pool::worker_pool::WorkerPool`] | Owns every sync and TX/RX worker thread for one logical PHY |
//! | [`mac_iface::TerminationPoint`] | The trait the upper-MAC implements to receive jobs and reports |
//! | [`sync::SyncChunk`] | Per-chunk autocorrelation/crosscorrelation state machine (C6) |
//! | [`tx::TxPipeline`] | Renders one `TxDescriptor` into IQ samples (C12) |
//! | [`rx_synced::RxSynced`] | Blind PLCF search plus HARQ-aware PDC decode (C13) |
//! | [`channel_est::ChannelLut`] | Cache of precomputed Wiener filters keyed by (SNR, rho) |
//!
//! ## Features
//!
//! - `json-export` (default): double-buffered rotating JSON trace export (§6)
//! - `integer-cfo-search`: enables the (expensive, default-off) integer-CFO
//!   frequency-domain search during autocorrelation peak refinement
//!
//! ## Non-goals
//!
//! Channel coding internals (Turbo/CRC), modulation tables, and the MAC PDU
//! decoder are treated as black-box libraries behind the interfaces named in
//! §6; spatial multiplexing (N_SS > 1) and a standards-exact Turbo code are
//! out of scope (see [`codec`] and [`channel_est`] module docs).

/// CPU affinity hints, worker-pool sizing and the `WorkerPoolConfig` JSON
/// schema (§6), every field range-validated at the site where it is used.
pub mod config;
/// Shared DSP building blocks: window design, moving sums, and the
/// rational resampler/pacer (C3).
pub mod dsp;
/// Configuration and construction-time error taxonomy (§7).
pub mod error;
/// The MAC-boundary interface: `TerminationPoint`, jobs, and reports (§6).
pub mod mac_iface;
/// Sample-rate pacing shared between the resampler and the worker pool.
pub mod pacer;
/// The worker-pool concurrency core (§2 C7-C11, §5): baton-serialized sync
/// workers feeding a job queue drained by token-serialized TX/RX workers.
pub mod pool;
/// C1/C2: RX (read-only) and TX (outer/inner-locked) ring buffers shared
/// with the external radio subsystem.
pub mod ring;
/// The complex baseband sample type shared across every DSP stage.
pub mod sample;
/// ETSI TS 103 636-3 ("Part 3") packet-structure formulas: numerologies,
/// derived packet sizes, the transmission-mode table, and the PCC/PDC/DRS
/// cell-placement state machines.
pub mod sections_part3;
/// C5a-c/C6: autocorrelation detection, autocorrelation peak refinement,
/// crosscorrelation fine-peak search, and the `SyncChunk` orchestration.
pub mod sync;

/// Channel-coding, CRC, and modulation building blocks, treated as
/// black-box libraries per §1 ("Channel coding internals (Turbo/CRC),
/// modulation tables, and the MAC PDU decoder are treated as black-box
/// libraries with the interfaces enumerated in §6").
pub mod codec;
/// The transmit pipeline (C12, §4.13): turns one `TxDescriptor` into
/// resampled IQ samples written into a TX ring buffer.
pub mod tx;
/// The synchronized-receive pipeline (C13, §4.12) and its supporting
/// per-symbol estimators (§9).
pub mod rx_synced;

/// Wiener-filter channel estimation LUTs (C14, §9).
pub mod channel_est;

/// Double-buffered rotating JSON trace export (§6 "External interfaces").
#[cfg(feature = "json-export")]
pub mod json_export;

pub use config::WorkerPoolConfig;
pub use error::{ConfigError, PhyError};
pub use mac_iface::TerminationPoint;
pub use pool::worker_pool::WorkerPool;
pub use sample::Sample;
pub use sync::{SyncChunk, SyncReport};
pub use tx::TxPipeline;
