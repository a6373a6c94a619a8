#[macro_use]
mod macros; // this should be previous than the mod phy; fuck rust

pub mod bsd;
pub mod config;
pub mod iface;
pub mod phy;
pub mod rand;
pub mod socket;
pub mod storage;
pub mod time;
pub mod wire;
