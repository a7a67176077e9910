//! Data types shared across the library.
//!
//! - Connection lifecycle state
//! - Response kinds used for correlation
//! - GATT endpoints required by the data channel

pub mod connection;

pub use connection::{ConnectionState, Endpoint, ResponseKind};
