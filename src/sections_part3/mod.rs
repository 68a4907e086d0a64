//! ETSI TS 103 636-3 ("Part 3") packet-structure formulas: numerologies,
//! derived packet-sizes, the transmission-mode table, and the PCC/PDC/DRS
//! cell-placement state machines.

pub mod layout;
pub mod numerologies;
pub mod packet_sizes;
pub mod tmmode;
