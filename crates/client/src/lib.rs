//! Client-side protocol stack for managing applications on a secure element
//!
//! This crate implements the management protocol spoken over
//! `tessera-transport` devices: the binary codecs for the device's wire
//! structures, the mutual-authentication handshake and the secure channel
//! wrapper derived from it, application manifests and images, and the
//! [`DeviceClient`] orchestrator exposing the high-level operations
//! (install, delete, list, CA management, version and memory queries,
//! firmware upgrade).
//!
//! One [`DeviceClient`] owns one device handle. The secure channel chains IV
//! state across wrap/unwrap calls, so a client must not be shared across
//! threads without external serialization; open one client per device
//! instead.

pub mod client;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod image;
pub mod manifest;
pub mod peer;
pub mod scp;
pub mod types;

pub use client::{AppIterator, DeviceClient};
pub use error::{Error, ErrorKind, Result};

/// Commonly used imports
pub mod prelude {
    pub use crate::client::DeviceClient;
    pub use crate::constants::{ins, secure_ins, DEFAULT_CLA};
    pub use crate::crypto::{PrivateKey, PublicKey};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::manifest::AppManifest;
    pub use crate::peer::{AuthPeer, SoftAuthPeer};
    pub use crate::types::{AppInfo, MemoryInfo, VersionInfo};

    #[cfg(feature = "remote")]
    pub use crate::peer::{HsmAuthPeer, HsmScript};
}
