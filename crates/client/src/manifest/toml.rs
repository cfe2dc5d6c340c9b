//! TOML manifest format
//!
//! Shared fields (`name`, `version`) sit at the top level; per-target
//! installation data lives in sections keyed by the hex target id:
//!
//! ```toml
//! name = "Demo"
//! version = "1.0.1"
//!
//! ["0x33000004"]
//! binary = "bin/demo.hex"
//! dataSize = 64
//! flags = "0x240"
//! derivationPath = { curves = ["secp256k1"], paths = ["44'/0'"] }
//! ```

use std::path::PathBuf;

use base64::Engine;
use toml::{Table, Value};

use super::{
    derivation_path_param, flexible_hex_u32, flexible_u32, AppManifest, FlexibleInt, ManifestError,
};
use crate::codec::params::{encode_params, AppParam};

/// Manifest parsed from a TOML document with per-target sections
#[derive(Debug)]
pub struct TomlManifest {
    fields: Table,
    dir: PathBuf,
}

fn as_flexible(value: &Value) -> Option<FlexibleInt<'_>> {
    match value {
        Value::Integer(n) => Some(FlexibleInt::Int(*n)),
        Value::String(s) => Some(FlexibleInt::Str(s)),
        _ => None,
    }
}

/// Section key for a target id
fn target_key(target_id: u32) -> String {
    format!("{target_id:#010x}")
}

impl TomlManifest {
    /// Parse manifest text; `dir` anchors relative binary paths
    pub fn parse(text: &str, dir: PathBuf) -> Result<Self, ManifestError> {
        let fields: Table =
            text.parse().map_err(|e: toml::de::Error| ManifestError::Parse(e.to_string()))?;

        let manifest = Self { fields, dir };
        if manifest.targets().is_empty() {
            return Err(ManifestError::MissingField("target sections"));
        }
        Ok(manifest)
    }

    fn section(&self, target_id: u32) -> Option<&Table> {
        self.fields.get(&target_key(target_id)).and_then(Value::as_table)
    }

    fn section_field<'a>(&'a self, target_id: u32, name: &str) -> Option<&'a Value> {
        self.section(target_id).and_then(|section| section.get(name))
    }
}

impl AppManifest for TomlManifest {
    fn app_name(&self) -> Result<&str, ManifestError> {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .ok_or(ManifestError::MissingField("name"))
    }

    fn targets(&self) -> Vec<u32> {
        self.fields
            .iter()
            .filter(|(_, value)| value.as_table().is_some_and(|t| t.contains_key("binary")))
            .filter_map(|(key, _)| flexible_hex_u32(Some(FlexibleInt::Str(key.as_str())), 0).ok())
            .collect()
    }

    fn data_size(&self, target_id: u32) -> u32 {
        flexible_u32(self.section_field(target_id, "dataSize").and_then(as_flexible))
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    fn application_flags(&self, target_id: u32) -> u32 {
        flexible_hex_u32(
            self.section_field(target_id, "flags").and_then(as_flexible),
            0,
        )
        .unwrap_or(0)
    }

    fn api_level(&self, target_id: u32) -> Option<u32> {
        flexible_u32(self.section_field(target_id, "apiLevel").and_then(as_flexible))
            .ok()
            .flatten()
    }

    fn binary_path(&self, target_id: u32) -> Result<PathBuf, ManifestError> {
        let binary = self
            .section_field(target_id, "binary")
            .and_then(Value::as_str)
            .ok_or(ManifestError::MissingField("binary"))?;
        Ok(self.dir.join(binary))
    }

    fn serialize_parameters(&self, target_id: u32) -> Result<Vec<u8>, ManifestError> {
        let mut params = Vec::new();
        for (field, value) in &self.fields {
            match field.as_str() {
                "name" => {
                    let name = value.as_str().ok_or(ManifestError::InvalidField("name"))?;
                    params.push(AppParam::AppName(name.to_string()));
                }
                "version" => {
                    let version = value
                        .as_str()
                        .ok_or(ManifestError::InvalidField("version"))?;
                    params.push(AppParam::AppVersion(version.to_string()));
                }
                key if key == target_key(target_id) => {
                    let section = value
                        .as_table()
                        .ok_or(ManifestError::InvalidField("target section"))?;
                    for (entry, value) in section {
                        match entry.as_str() {
                            "icon" => {
                                let encoded = value
                                    .as_str()
                                    .ok_or(ManifestError::InvalidField("icon"))?;
                                let blob = base64::engine::general_purpose::STANDARD
                                    .decode(encoded)
                                    .map_err(|_| ManifestError::InvalidField("icon"))?;
                                params.push(AppParam::Icon(blob));
                            }
                            "derivationPath" => {
                                let curves: Vec<&str> = value
                                    .get("curves")
                                    .and_then(Value::as_array)
                                    .map(|list| {
                                        list.iter().filter_map(Value::as_str).collect()
                                    })
                                    .unwrap_or_default();
                                let paths: Vec<String> = value
                                    .get("paths")
                                    .and_then(Value::as_array)
                                    .map(|list| {
                                        list.iter()
                                            .filter_map(Value::as_str)
                                            .map(str::to_string)
                                            .collect()
                                    })
                                    .unwrap_or_default();
                                params.push(derivation_path_param(&curves, paths)?);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(encode_params(&params)?)
    }
}
