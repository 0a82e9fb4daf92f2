//! A DHCPv4 intercepting agent for bridge interfaces.
//!
//! Each configured bridge is observed through a filtered capture socket
//! and handled in one of two modes: UDP relay (rewrite `giaddr`, forward
//! to a configured server, correlate replies by transaction id) or
//! man-in-the-middle (intercept on the bridge, egress upstream through a
//! trusted port). The codec layer is a strict RFC 2131/2132/3046
//! implementation over a small typed-field framework.

pub mod codec;
pub mod core;
pub mod netio;
pub mod utils;
