//! Protocol constants

/// Default command class byte
pub const DEFAULT_CLA: u8 = 0xE0;

/// Plain instruction codes
pub mod ins {
    /// Carrier for secure-wrapped instructions
    pub const SECUINS: u8 = 0x00;
    /// Read version information
    pub const GET_VERSION: u8 = 0x01;
    /// Validate the target identifier
    pub const VALIDATE_TARGET_ID: u8 = 0x04;
    /// Start the authentication handshake (nonce exchange)
    pub const INITIALIZE_AUTHENTICATION: u8 = 0x50;
    /// Push one entry of the server certificate chain
    pub const VALIDATE_CERTIFICATE: u8 = 0x51;
    /// Pull one entry of the device certificate chain
    pub const GET_CERTIFICATE: u8 = 0x52;
    /// Finish the handshake
    pub const MUTUAL_AUTHENTICATE: u8 = 0x53;
    /// Start a custom endorsement
    pub const ENDORSE_SET_START: u8 = 0xC0;
    /// Commit a custom endorsement certificate
    pub const ENDORSE_SET_COMMIT: u8 = 0xC2;
    /// Run an installed application by name
    pub const RUN_APP: u8 = 0xD8;
}

/// Secure-wrapped instruction codes
pub mod secure_ins {
    /// Position the load cursor inside the image
    pub const SET_LOAD_OFFSET: u8 = 5;
    /// Load one chunk of image data
    pub const LOAD: u8 = 6;
    /// Commit the loaded application
    pub const COMMIT: u8 = 9;
    /// Create an application slot
    pub const CREATE_APP: u8 = 11;
    /// Delete an application by name
    pub const DELETE_APP: u8 = 12;
    /// List installed applications (first page)
    pub const LIST_APPS: u8 = 14;
    /// List installed applications (next page)
    pub const LIST_APPS_CONTINUE: u8 = 15;
    /// Read version information over the secure channel
    pub const GET_VERSION: u8 = 16;
    /// Read memory usage information
    pub const GET_MEMORY_INFORMATION: u8 = 17;
    /// Install a custom certificate authority
    pub const SETUP_CUSTOM_CERTIFICATE: u8 = 18;
    /// Delete the custom certificate authority
    pub const RESET_CUSTOM_CERTIFICATE: u8 = 19;
    /// Delete an application by content hash
    pub const DELETE_APP_BY_HASH: u8 = 21;
    /// Hand over to the MCU bootloader
    pub const MCU_BOOTLOADER: u8 = 0xB0;
}

/// Certificate roles signed into chain entries
pub mod cert_role {
    /// Server master key
    pub const SIGNER: u8 = 0x01;
    /// Device master key
    pub const DEVICE: u8 = 0x02;
    /// Server ephemeral key
    pub const SIGNER_EPHEMERAL: u8 = 0x11;
    /// Device ephemeral key
    pub const DEVICE_EPHEMERAL: u8 = 0x12;
}

/// Marks the final entry when walking a certificate chain
pub const P1_LAST_CERTIFICATE: u8 = 0x80;
