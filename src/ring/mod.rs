//! C1/C2: RX (read-only) and TX (outer/inner-locked) ring buffers shared
//! with the external radio subsystem.

pub mod rx_ring;
pub mod tx_ring;
