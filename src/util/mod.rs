//! Utility modules

pub mod binary;
pub mod crc;
