//! Typed argument structs for every external tool.
//!
//! Each struct implements `ToolArgs` and maps its fields to the exact argv the
//! utility expects. Grouped by concern.

pub mod disk;
pub mod encryption;
pub mod mount;
pub mod network;
pub mod system;
