//! JSON manifest format
//!
//! A flat object with `targetId` and `binary` required. Kept for
//! compatibility; TOML is the preferred format.

use std::path::PathBuf;

use base64::Engine;
use serde_json::{Map, Value};

use super::{
    derivation_path_param, flexible_hex_u32, flexible_u32, AppManifest, FlexibleInt, ManifestError,
};
use crate::codec::params::{encode_params, AppParam};

/// Manifest parsed from a flat JSON object
#[derive(Debug)]
pub struct JsonManifest {
    fields: Map<String, Value>,
    dir: PathBuf,
}

fn as_flexible(value: &Value) -> Option<FlexibleInt<'_>> {
    match value {
        Value::Number(n) => n.as_i64().map(FlexibleInt::Int),
        Value::String(s) => Some(FlexibleInt::Str(s)),
        _ => None,
    }
}

impl JsonManifest {
    /// Parse manifest text; `dir` anchors relative binary paths
    pub fn parse(text: &str, dir: PathBuf) -> Result<Self, ManifestError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))?;
        let fields = match value {
            Value::Object(fields) => fields,
            _ => return Err(ManifestError::Parse("not an object".to_string())),
        };

        let manifest = Self { fields, dir };
        manifest.parsed_target_id()?;
        if !manifest.fields.contains_key("binary") {
            return Err(ManifestError::MissingField("binary"));
        }
        Ok(manifest)
    }

    fn parsed_target_id(&self) -> Result<u32, ManifestError> {
        let value = self
            .fields
            .get("targetId")
            .ok_or(ManifestError::MissingField("targetId"))?;
        flexible_hex_u32(as_flexible(value), 0)
    }

    fn str_field(&self, name: &'static str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

impl AppManifest for JsonManifest {
    fn app_name(&self) -> Result<&str, ManifestError> {
        self.str_field("name").ok_or(ManifestError::MissingField("name"))
    }

    fn targets(&self) -> Vec<u32> {
        self.parsed_target_id().map(|id| vec![id]).unwrap_or_default()
    }

    fn data_size(&self, _target_id: u32) -> u32 {
        flexible_u32(self.fields.get("dataSize").and_then(as_flexible))
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    fn application_flags(&self, _target_id: u32) -> u32 {
        flexible_hex_u32(self.fields.get("flags").and_then(as_flexible), 0).unwrap_or(0)
    }

    fn api_level(&self, _target_id: u32) -> Option<u32> {
        flexible_u32(self.fields.get("apiLevel").and_then(as_flexible))
            .ok()
            .flatten()
    }

    fn binary_path(&self, _target_id: u32) -> Result<PathBuf, ManifestError> {
        let binary = self
            .str_field("binary")
            .ok_or(ManifestError::MissingField("binary"))?;
        Ok(self.dir.join(binary))
    }

    fn serialize_parameters(&self, _target_id: u32) -> Result<Vec<u8>, ManifestError> {
        let mut params = Vec::new();
        for (field, value) in &self.fields {
            match field.as_str() {
                "name" => {
                    let name = value
                        .as_str()
                        .ok_or(ManifestError::InvalidField("name"))?;
                    params.push(AppParam::AppName(name.to_string()));
                }
                "version" => {
                    let version = value
                        .as_str()
                        .ok_or(ManifestError::InvalidField("version"))?;
                    params.push(AppParam::AppVersion(version.to_string()));
                }
                "icon" => {
                    // The icon is carried as an opaque, pre-converted blob
                    let encoded = value.as_str().ok_or(ManifestError::InvalidField("icon"))?;
                    let blob = base64::engine::general_purpose::STANDARD
                        .decode(encoded)
                        .map_err(|_| ManifestError::InvalidField("icon"))?;
                    params.push(AppParam::Icon(blob));
                }
                "derivationPath" => {
                    let curves: Vec<&str> = value
                        .get("curves")
                        .and_then(Value::as_array)
                        .map(|list| list.iter().filter_map(Value::as_str).collect())
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
        Ok(encode_params(&params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::params::decode_params;

    const SAMPLE: &str = r#"{
        "name": "Demo",
        "version": "1.0.1",
        "targetId": "0x33000004",
        "binary": "bin/demo.hex",
        "dataSize": 64,
        "flags": "0x240",
        "derivationPath": {
            "curves": ["secp256k1", "ed25519"],
            "paths": ["44'/0'"]
        }
    }"#;

    fn sample() -> JsonManifest {
        JsonManifest::parse(SAMPLE, PathBuf::from("/apps")).unwrap()
    }

    #[test]
    fn test_fields() {
        let manifest = sample();
        assert_eq!(manifest.app_name().unwrap(), "Demo");
        assert_eq!(manifest.targets(), vec![0x33000004]);
        assert_eq!(manifest.data_size(0x33000004), 64);
        assert_eq!(manifest.application_flags(0x33000004), 0x240);
        assert_eq!(manifest.api_level(0x33000004), None);
        assert_eq!(
            manifest.binary_path(0x33000004).unwrap(),
            PathBuf::from("/apps/bin/demo.hex")
        );
        assert!(manifest.assert_compatible_device(0x33000004).is_ok());
        assert!(manifest.assert_compatible_device(0x31100004).is_err());
    }

    #[test]
    fn test_parameter_order_follows_manifest() {
        let params = decode_params(&sample().serialize_parameters(0x33000004).unwrap()).unwrap();
        assert!(matches!(&params[0], AppParam::AppName(name) if name == "Demo"));
        assert!(matches!(&params[1], AppParam::AppVersion(v) if v == "1.0.1"));
        assert!(matches!(&params[2], AppParam::DerivationPath(dp)
            if dp.curves == 5 && dp.paths == vec!["44'/0'".to_string()]));
    }

    #[test]
    fn test_required_fields() {
        assert!(JsonManifest::parse(r#"{"binary": "a.hex"}"#, PathBuf::new()).is_err());
        assert!(JsonManifest::parse(r#"{"targetId": "0x31100004"}"#, PathBuf::new()).is_err());
    }
}
