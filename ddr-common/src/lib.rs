//! DDR Relay - Common Types & Logic

pub mod core;
pub mod live;
