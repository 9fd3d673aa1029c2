//! Infrastructure layer: wire formats and the concrete adapters behind the
//! domain ports.

pub mod dto;
pub mod surface;
pub mod transport;
