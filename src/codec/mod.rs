//! Channel-coding, CRC, and modulation building blocks, treated as
//! black-box libraries per spec.md §1 ("Channel coding internals (Turbo/CRC),
//! modulation tables, and the MAC PDU decoder are treated as black-box
//! libraries with the interfaces enumerated in §6"). These are reference
//! implementations behind those interfaces — correct and self-consistent,
//! not a standards-exact Turbo code.

pub mod crc;
pub mod fec;
pub mod modulation;
