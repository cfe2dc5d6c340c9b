//! Core types for APDU communication with a secure element
//!
//! This crate provides the building blocks shared by every layer of the
//! protocol stack: the [`Command`] and [`Response`] wire model, the
//! [`StatusWord`] type with the device's status-word contract, and the
//! [`Device`] transport capability trait that concrete transports implement.

pub mod command;
pub mod error;
pub mod response;
pub mod status;
pub mod transport;

pub use command::Command;
pub use error::{Error, TransportError};
pub use response::Response;
pub use status::StatusWord;
pub use transport::{Device, DEFAULT_READ_TIMEOUT};

#[cfg(any(test, feature = "mock"))]
pub use transport::MockDevice;

/// Commonly used imports
pub mod prelude {
    pub use crate::command::Command;
    pub use crate::error::{Error, TransportError};
    pub use crate::response::Response;
    pub use crate::status::{common, StatusWord};
    pub use crate::transport::Device;
}
