//! Tagged application parameter lists
//!
//! An application's installation parameter blob is an ordered list of tagged
//! records; the order follows the manifest field order.

use super::{asn1, path, CodecError};

/// Curve flag: secp256k1
pub const CURVE_SECP256K1: u8 = 1;
/// Curve flag: prime256r1
pub const CURVE_PRIME256R1: u8 = 2;
/// Curve flag: ed25519
pub const CURVE_ED25519: u8 = 4;
/// Not a curve; marks the presence of SLIP21 paths
pub const CURVE_SLIP21: u8 = 8;
/// Curve flag: bls12381g1
pub const CURVE_BLS12381G1: u8 = 16;

const TAG_APP_NAME: u8 = 1;
const TAG_APP_VERSION: u8 = 2;
const TAG_ICON: u8 = 3;
const TAG_DERIVE_PATH: u8 = 4;
const TAG_DEPENDENCY: u8 = 6;

/// Derivation path parameter: a curve bitmask plus BIP32 and SLIP21 paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationPath {
    /// Bitmask of CURVE_* flags
    pub curves: u8,
    /// BIP32 paths, e.g. `"44'/0'"`
    pub paths: Vec<String>,
    /// SLIP21 path labels
    pub slip21_paths: Vec<String>,
}

/// Dependency on another installed application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Application name
    pub name: String,
    /// Required version, if pinned
    pub version: Option<String>,
}

/// One tagged installation parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppParam {
    /// Application name (tag 1)
    AppName(String),
    /// Application version (tag 2)
    AppVersion(String),
    /// Icon bitmap, opaque to this layer (tag 3)
    Icon(Vec<u8>),
    /// Derivation path restrictions (tag 4)
    DerivationPath(DerivationPath),
    /// Dependency list (tag 6)
    Dependencies(Vec<Dependency>),
}

impl AppParam {
    const fn tag(&self) -> u8 {
        match self {
            Self::AppName(_) => TAG_APP_NAME,
            Self::AppVersion(_) => TAG_APP_VERSION,
            Self::Icon(_) => TAG_ICON,
            Self::DerivationPath(_) => TAG_DERIVE_PATH,
            Self::Dependencies(_) => TAG_DEPENDENCY,
        }
    }
}

fn encode_derivation_path(value: &DerivationPath) -> Result<Vec<u8>, CodecError> {
    let mut region = vec![value.curves];
    for p in &value.paths {
        region.extend_from_slice(&path::encode_bip32_path(p)?);
    }
    for p in &value.slip21_paths {
        region.extend_from_slice(&path::encode_slip21_path(p)?);
    }
    Ok(region)
}

fn decode_derivation_path(region: &[u8]) -> Result<DerivationPath, CodecError> {
    let (&curves, mut rest) = region.split_first().ok_or(CodecError::TruncatedInput)?;

    // BIP32 paths start with a count byte below 0x80, SLIP21 length prefixes
    // have the top bit set; the boundary between the two runs follows.
    let mut paths = Vec::new();
    while let Some(&first) = rest.first() {
        if first >= 0x80 {
            break;
        }
        let (p, remaining) = path::decode_bip32_path(rest)?;
        paths.push(p);
        rest = remaining;
    }

    let mut slip21_paths = Vec::new();
    while !rest.is_empty() {
        let (p, remaining) = path::decode_slip21_path(rest)?;
        slip21_paths.push(p);
        rest = remaining;
    }

    Ok(DerivationPath {
        curves,
        paths,
        slip21_paths,
    })
}

fn encode_dependencies(deps: &[Dependency]) -> Vec<u8> {
    let mut region = Vec::new();
    for dep in deps {
        let mut inner = Vec::new();
        asn1::encode_string(&mut inner, &dep.name);
        if let Some(version) = &dep.version {
            asn1::encode_string(&mut inner, version);
        }
        asn1::encode_prefixed(&mut region, &inner);
    }
    region
}

fn decode_dependencies(mut region: &[u8]) -> Result<Vec<Dependency>, CodecError> {
    let mut deps = Vec::new();
    while !region.is_empty() {
        let (inner, rest) = asn1::decode_prefixed(region)?;
        region = rest;

        let (name, inner) = asn1::decode_string(inner)?;
        let version = if inner.is_empty() {
            None
        } else {
            let (version, inner) = asn1::decode_string(inner)?;
            if !inner.is_empty() {
                return Err(CodecError::InvalidValue("trailing bytes in dependency"));
            }
            Some(version)
        };
        deps.push(Dependency { name, version });
    }
    Ok(deps)
}

/// Encode an ordered parameter list
pub fn encode_params(params: &[AppParam]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for param in params {
        out.push(param.tag());
        match param {
            AppParam::AppName(value) | AppParam::AppVersion(value) => {
                asn1::encode_string(&mut out, value);
            }
            AppParam::Icon(blob) => {
                asn1::encode_prefixed(&mut out, blob);
            }
            AppParam::DerivationPath(value) => {
                asn1::encode_prefixed(&mut out, &encode_derivation_path(value)?);
            }
            AppParam::Dependencies(deps) => {
                asn1::encode_prefixed(&mut out, &encode_dependencies(deps));
            }
        }
    }
    Ok(out)
}

/// Decode an ordered parameter list
pub fn decode_params(mut input: &[u8]) -> Result<Vec<AppParam>, CodecError> {
    let mut params = Vec::new();
    while let Some((&tag, rest)) = input.split_first() {
        let param = match tag {
            TAG_APP_NAME => {
                let (value, rest) = asn1::decode_string(rest)?;
                input = rest;
                AppParam::AppName(value)
            }
            TAG_APP_VERSION => {
                let (value, rest) = asn1::decode_string(rest)?;
                input = rest;
                AppParam::AppVersion(value)
            }
            TAG_ICON => {
                let (blob, rest) = asn1::decode_prefixed(rest)?;
                input = rest;
                AppParam::Icon(blob.to_vec())
            }
            TAG_DERIVE_PATH => {
                let (region, rest) = asn1::decode_prefixed(rest)?;
                input = rest;
                AppParam::DerivationPath(decode_derivation_path(region)?)
            }
            TAG_DEPENDENCY => {
                let (region, rest) = asn1::decode_prefixed(rest)?;
                input = rest;
                AppParam::Dependencies(decode_dependencies(region)?)
            }
            _ => return Err(CodecError::InvalidValue("unknown parameter tag")),
        };
        params.push(param);
    }
    Ok(params)
}
