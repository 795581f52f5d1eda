//! A decoder and gateway core for the RAMSES-II radio protocol used by
//! Honeywell evohome heating systems.
//!
//! The crate turns raw ASCII packet lines captured off an HGI80-compatible
//! USB dongle into typed [`Message`]s, tracks the resulting device/zone/
//! domain topology in an [`EntityRegistry`], and — when wired to a live
//! serial port via [`Gateway`] — drives the outbound command queue and the
//! bind-protocol handshake used to pair a new device to a controller.
//!
//! Nothing here talks to a network; the gateway owns one local serial
//! device and everything downstream of it.

#![warn(missing_docs)]
#![deny(missing_debug_implementations)]

pub mod address;
pub mod bind_state;
pub mod clock;
pub mod code;
pub mod entity;
pub mod error;
pub mod field;
pub mod frame;
pub mod gateway;
pub mod index;
pub mod message;
pub mod opentherm;
pub mod parsers;
pub mod payload;
pub mod qos;
pub mod transport;
pub mod verb;

pub use address::{DeviceId, DeviceType};
pub use entity::EntityRegistry;
pub use error::Error;
pub use frame::Frame;
pub use gateway::{Gateway, GatewayConfig};
pub use message::Message;
pub use payload::Payload;
