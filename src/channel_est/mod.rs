//! C14: channel estimation at DRS pilot cells, smoothed by a precomputed
//! Wiener-filter weight vector looked up by SNR/Doppler/delay-spread (§4.12
//! "Channel estimation").

pub mod channel_lut;
pub mod wiener;

pub use channel_lut::{ChannelLut, SubcarrierInterpolationTable};
pub use wiener::WienerFilter;
