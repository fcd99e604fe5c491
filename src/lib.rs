//! Offline forensic analyzer for a Ceph BlueStore/BlueFS OSD image: parses
//! the BlueStore label, replays the embedded BlueFS log, loads the RocksDB
//! key-value store it holds, and reconstructs objects, their slack, and
//! unallocated regions of the device.

pub mod bluefs;
pub mod cursor;
pub mod error;
pub mod image;
pub mod kv;
pub mod label;
pub mod osd;
pub mod reconstruct;
pub mod structured;
