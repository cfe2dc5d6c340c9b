//! Application manifests
//!
//! A manifest names the application, the targets it can be installed on, and
//! the per-target binary and installation parameters. TOML is the native
//! format; JSON is kept for compatibility and tried second.

mod json;
mod toml;

pub use json::JsonManifest;
pub use toml::TomlManifest;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::codec::params::{
    AppParam, DerivationPath, CURVE_BLS12381G1, CURVE_ED25519, CURVE_PRIME256R1, CURVE_SECP256K1,
    CURVE_SLIP21,
};
use crate::codec::CodecError;

/// Errors raised by manifest loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),

    /// Neither TOML nor JSON could parse the file
    #[error("manifest is neither TOML nor JSON\nTOML error: {toml}\nJSON error: {json}")]
    Format {
        /// Error from the TOML attempt
        toml: String,
        /// Error from the JSON attempt
        json: String,
    },

    /// The file parsed as neither format, or a single format failed
    #[error("manifest parse error: {0}")]
    Parse(String),

    /// A required field is missing
    #[error("manifest is missing field {0}")]
    MissingField(&'static str),

    /// A field value is malformed
    #[error("invalid manifest field {0}")]
    InvalidField(&'static str),

    /// The manifest has no installation data for the connected device
    #[error("manifest has no installation information for target {target_id:#010x}")]
    IncompatibleDevice {
        /// Target id of the connected device
        target_id: u32,
    },

    /// Parameter serialization failed
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Per-target installation description consumed by the install path
pub trait AppManifest: fmt::Debug {
    /// Application name
    fn app_name(&self) -> Result<&str, ManifestError>;

    /// Targets this manifest can install on
    fn targets(&self) -> Vec<u32>;

    /// Size of the trailing data region
    fn data_size(&self, target_id: u32) -> u32;

    /// Application flag word
    fn application_flags(&self, target_id: u32) -> u32;

    /// Declared API level, if any
    fn api_level(&self, target_id: u32) -> Option<u32>;

    /// Path of the application image
    fn binary_path(&self, target_id: u32) -> Result<PathBuf, ManifestError>;

    /// Serialize the installation parameter blob, ordered by manifest field
    /// order
    fn serialize_parameters(&self, target_id: u32) -> Result<Vec<u8>, ManifestError>;

    /// Check the manifest covers the connected device
    fn assert_compatible_device(&self, target_id: u32) -> Result<(), ManifestError> {
        if self.targets().contains(&target_id) {
            Ok(())
        } else {
            Err(ManifestError::IncompatibleDevice { target_id })
        }
    }
}

/// Load a manifest, trying TOML first and JSON second
pub fn from_file(path: &Path) -> Result<Box<dyn AppManifest>, ManifestError> {
    let text = std::fs::read_to_string(path)?;
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let toml_error = match TomlManifest::parse(&text, dir.clone()) {
        Ok(manifest) => return Ok(Box::new(manifest)),
        Err(e) => e,
    };
    match JsonManifest::parse(&text, dir) {
        Ok(manifest) => Ok(Box::new(manifest)),
        Err(json_error) => Err(ManifestError::Format {
            toml: toml_error.to_string(),
            json: json_error.to_string(),
        }),
    }
}

/// An integer field that may appear as a native integer or a string
enum FlexibleInt<'a> {
    Int(i64),
    Str(&'a str),
}

/// Parse a manifest integer; strings are hexadecimal, with or without a
/// leading `0x`
fn flexible_hex_u32(value: Option<FlexibleInt<'_>>, default: u32) -> Result<u32, ManifestError> {
    match value {
        None => Ok(default),
        Some(FlexibleInt::Int(n)) => {
            u32::try_from(n).map_err(|_| ManifestError::InvalidField("integer out of range"))
        }
        Some(FlexibleInt::Str(s)) => {
            let digits = s.trim().strip_prefix("0x").unwrap_or_else(|| s.trim());
            u32::from_str_radix(digits, 16)
                .map_err(|_| ManifestError::InvalidField("invalid hex integer"))
        }
    }
}

/// Parse a manifest integer; strings are decimal
fn flexible_u32(value: Option<FlexibleInt<'_>>) -> Result<Option<u32>, ManifestError> {
    match value {
        None => Ok(None),
        Some(FlexibleInt::Int(n)) => u32::try_from(n)
            .map(Some)
            .map_err(|_| ManifestError::InvalidField("integer out of range")),
        Some(FlexibleInt::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ManifestError::InvalidField("invalid integer")),
    }
}

/// Map manifest curve names onto the curve flag bitmask
fn curve_flags(names: &[&str]) -> Result<u8, ManifestError> {
    let mut flags = 0;
    for name in names {
        flags |= match *name {
            "secp256k1" => CURVE_SECP256K1,
            "prime256r1" => CURVE_PRIME256R1,
            "ed25519" => CURVE_ED25519,
            "slip21" => CURVE_SLIP21,
            "bls12381g1" => CURVE_BLS12381G1,
            _ => return Err(ManifestError::InvalidField("unknown curve name")),
        };
    }
    Ok(flags)
}

/// Build the derivation-path parameter from manifest curves and paths
///
/// SLIP21 labels are flagged through the curve mask, not per path.
fn derivation_path_param(curves: &[&str], paths: Vec<String>) -> Result<AppParam, ManifestError> {
    let curve_mask = curve_flags(curves)?;
    let (paths, slip21_paths) = if curve_mask & CURVE_SLIP21 != 0 {
        (Vec::new(), paths)
    } else {
        (paths, Vec::new())
    };
    Ok(AppParam::DerivationPath(DerivationPath {
        curves: curve_mask,
        paths,
        slip21_paths,
    }))
}
