//! Packet I/O: framing, raw sockets, bridge adapters and the per-bridge
//! packet port.

pub mod bridge;
pub mod capture;
pub mod frame;
pub mod port;
