//! Vendor dictionaries
//!
//! Each vendor directory may contain `diameter.yaml`, `gtp.yaml`,
//! `causes.yaml`, `messages.yaml` and `features.yaml`. A missing file
//! leaves that table empty. Name lookups never fail: a miss yields a
//! generated placeholder such as `AVP_999`.

use crate::config::DictionarySettings;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Dictionary load errors (one vendor at a time)
#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Dictionary directory not found: {0}")]
    NotFound(PathBuf),
}

pub type DictionaryResult<T> = Result<T, DictionaryError>;

/// Diameter AVP definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvpDefinition {
    pub code: u32,
    #[serde(default)]
    pub vendor_id: u32,
    pub name: String,
    #[serde(default, rename = "type")]
    pub avp_type: String,
    #[serde(default)]
    pub description: String,
}

/// GTP information element definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IeDefinition {
    #[serde(rename = "type")]
    pub ie_type: u8,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Vendor name for a protocol message code (e.g. a Diameter command)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinition {
    pub protocol: String,
    pub code: u32,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
struct AvpFile {
    #[serde(default)]
    avps: Vec<AvpDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct IeFile {
    #[serde(default)]
    ies: Vec<IeDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct CauseFile {
    #[serde(default)]
    causes: HashMap<i64, String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageFile {
    #[serde(default)]
    messages: Vec<MessageDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureFile {
    #[serde(default)]
    features: HashMap<String, serde_json::Value>,
}

fn message_key(protocol: &str, code: u32) -> String {
    format!("{}:{}", protocol.to_ascii_lowercase(), code)
}

/// Name tables for one vendor; replaced wholesale on reload
#[derive(Debug, Clone, Default)]
pub struct VendorDictionary {
    pub vendor: String,
    pub diameter_avps: HashMap<u32, AvpDefinition>,
    pub gtp_ies: HashMap<u8, IeDefinition>,
    /// Keyed by `protocol:code`, protocol lowercased
    pub message_types: HashMap<String, String>,
    pub cause_codes: HashMap<i64, String>,
    pub features: HashMap<String, serde_json::Value>,
}

impl VendorDictionary {
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            ..Default::default()
        }
    }

    /// Load every definition file present in `dir`
    pub fn load(vendor: &str, dir: &Path) -> DictionaryResult<Self> {
        if !dir.is_dir() {
            return Err(DictionaryError::NotFound(dir.to_path_buf()));
        }

        let mut dict = Self::new(vendor);

        if let Some(file) = read_optional::<AvpFile>(&dir.join("diameter.yaml"))? {
            for avp in file.avps {
                dict.diameter_avps.insert(avp.code, avp);
            }
        }

        if let Some(file) = read_optional::<IeFile>(&dir.join("gtp.yaml"))? {
            for ie in file.ies {
                dict.gtp_ies.insert(ie.ie_type, ie);
            }
        }

        if let Some(file) = read_optional::<CauseFile>(&dir.join("causes.yaml"))? {
            dict.cause_codes = file.causes;
        }

        if let Some(file) = read_optional::<MessageFile>(&dir.join("messages.yaml"))? {
            for msg in file.messages {
                dict.message_types
                    .insert(message_key(&msg.protocol, msg.code), msg.name);
            }
        }

        if let Some(file) = read_optional::<FeatureFile>(&dir.join("features.yaml"))? {
            dict.features = file.features;
        }

        debug!(
            vendor,
            avps = dict.diameter_avps.len(),
            ies = dict.gtp_ies.len(),
            causes = dict.cause_codes.len(),
            messages = dict.message_types.len(),
            features = dict.features.len(),
            "Vendor dictionary parsed"
        );

        Ok(dict)
    }
}

fn read_optional<T: serde::de::DeserializeOwned + Default>(
    path: &Path,
) -> DictionaryResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|source| DictionaryError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    // An empty document deserializes to null
    if content.trim().is_empty() {
        return Ok(Some(T::default()));
    }

    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|source| DictionaryError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Placeholder for an unknown Diameter AVP
pub fn avp_placeholder(code: u32) -> String {
    format!("AVP_{}", code)
}

/// Placeholder for an unknown GTP IE
pub fn ie_placeholder(ie_type: u8) -> String {
    format!("IE_{}", ie_type)
}

/// Placeholder for an unknown cause code
pub fn cause_placeholder(code: i64) -> String {
    format!("Cause_{}", code)
}

/// Set of loaded vendor dictionaries, shared by all decoders
#[derive(Debug, Default)]
pub struct Dictionary {
    base_path: PathBuf,
    vendor_paths: BTreeMap<String, String>,
    default_vendor: String,
    dictionaries: RwLock<HashMap<String, Arc<VendorDictionary>>>,
}

impl Dictionary {
    pub fn new(settings: &DictionarySettings) -> Self {
        Self {
            base_path: settings.base_path.clone(),
            vendor_paths: settings.vendors.clone(),
            default_vendor: settings.default_vendor.clone(),
            dictionaries: RwLock::new(HashMap::new()),
        }
    }

    /// Dictionary with nothing configured; every lookup yields a placeholder
    pub fn empty() -> Self {
        Self::default()
    }

    /// Vendor used when a packet carries no vendor hint
    pub fn default_vendor(&self) -> &str {
        &self.default_vendor
    }

    /// Load every configured vendor; failures are logged and skipped
    pub fn load_all(&self) -> Vec<String> {
        let mut loaded = Vec::new();

        for (vendor, rel) in &self.vendor_paths {
            let path = self.base_path.join(rel);
            match self.load_vendor(vendor, &path) {
                Ok(()) => loaded.push(vendor.clone()),
                Err(e) => warn!("Failed to load {} dictionary: {}", vendor, e),
            }
        }

        info!("Loaded {} vendor dictionaries", loaded.len());
        loaded
    }

    /// Load (or replace) one vendor from an explicit directory
    pub fn load_vendor(&self, vendor: &str, dir: &Path) -> DictionaryResult<()> {
        let dict = VendorDictionary::load(vendor, dir)?;
        self.insert(dict);
        Ok(())
    }

    /// Reload one configured vendor from its configured path
    pub fn reload_vendor(&self, vendor: &str) -> DictionaryResult<()> {
        let rel = self
            .vendor_paths
            .get(vendor)
            .cloned()
            .unwrap_or_else(|| vendor.to_string());
        let path = self.base_path.join(rel);
        self.load_vendor(vendor, &path)?;
        info!("Reloaded {} dictionary", vendor);
        Ok(())
    }

    /// Install a dictionary, replacing any previous one for the vendor
    pub fn insert(&self, dict: VendorDictionary) {
        self.dictionaries
            .write()
            .insert(dict.vendor.clone(), Arc::new(dict));
    }

    pub fn get(&self, vendor: &str) -> Option<Arc<VendorDictionary>> {
        self.dictionaries.read().get(vendor).cloned()
    }

    /// Loaded vendor names, sorted
    pub fn vendors(&self) -> Vec<String> {
        let mut vendors: Vec<String> = self.dictionaries.read().keys().cloned().collect();
        vendors.sort();
        vendors
    }

    pub fn lookup_avp(&self, vendor: &str, code: u32) -> Option<String> {
        self.get(vendor)
            .and_then(|d| d.diameter_avps.get(&code).map(|a| a.name.clone()))
    }

    pub fn lookup_ie(&self, vendor: &str, ie_type: u8) -> Option<String> {
        self.get(vendor)
            .and_then(|d| d.gtp_ies.get(&ie_type).map(|ie| ie.name.clone()))
    }

    pub fn lookup_cause(&self, vendor: &str, code: i64) -> Option<String> {
        self.get(vendor)
            .and_then(|d| d.cause_codes.get(&code).cloned())
    }

    /// Vendor name for a message code, `protocol` as in `Protocol::as_str`
    pub fn lookup_message(&self, vendor: &str, protocol: &str, code: u32) -> Option<String> {
        self.get(vendor)
            .and_then(|d| d.message_types.get(&message_key(protocol, code)).cloned())
    }

    /// Vendor feature flag or setting, verbatim from `features.yaml`
    pub fn feature(&self, vendor: &str, name: &str) -> Option<serde_json::Value> {
        self.get(vendor).and_then(|d| d.features.get(name).cloned())
    }

    pub fn avp_name(&self, vendor: &str, code: u32) -> String {
        self.lookup_avp(vendor, code)
            .unwrap_or_else(|| avp_placeholder(code))
    }

    pub fn ie_name(&self, vendor: &str, ie_type: u8) -> String {
        self.lookup_ie(vendor, ie_type)
            .unwrap_or_else(|| ie_placeholder(ie_type))
    }

    pub fn cause_text(&self, vendor: &str, code: i64) -> String {
        self.lookup_cause(vendor, code)
            .unwrap_or_else(|| cause_placeholder(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings(base: &Path, vendors: &[(&str, &str)]) -> DictionarySettings {
        DictionarySettings {
            base_path: base.to_path_buf(),
            default_vendor: "ericsson".to_string(),
            vendors: vendors
                .iter()
                .map(|(v, p)| (v.to_string(), p.to_string()))
                .collect(),
        }
    }

    fn write_vendor(base: &Path, dir: &str) {
        let path = base.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join("diameter.yaml"),
            r#"
avps:
  - code: 1032
    vendor_id: 10415
    name: RAT-Type
    type: Enumerated
    description: Radio access technology
"#,
        )
        .unwrap();
        fs::write(
            path.join("causes.yaml"),
            "causes:\n  16: Request accepted\n  64: Context not found\n",
        )
        .unwrap();
    }

    #[test]
    fn test_unknown_vendor_yields_placeholders() {
        let dict = Dictionary::empty();
        let name = dict.avp_name("unknown_vendor", 999);
        assert!(name.contains("999"));
        assert_eq!(name, "AVP_999");
        assert_eq!(dict.ie_name("unknown_vendor", 87), "IE_87");
        assert_eq!(dict.cause_text("unknown_vendor", 5), "Cause_5");
    }

    #[test]
    fn test_load_all_skips_failing_vendor() {
        let tmp = TempDir::new().unwrap();
        write_vendor(tmp.path(), "ericsson");

        fs::create_dir_all(tmp.path().join("broken")).unwrap();
        fs::write(tmp.path().join("broken/gtp.yaml"), "ies: [ {type: nope").unwrap();

        let dict = Dictionary::new(&settings(
            tmp.path(),
            &[("ericsson", "ericsson"), ("broken", "broken"), ("missing", "missing")],
        ));
        let loaded = dict.load_all();

        assert_eq!(loaded, vec!["ericsson".to_string()]);
        assert_eq!(dict.vendors(), vec!["ericsson".to_string()]);
        assert_eq!(dict.avp_name("ericsson", 1032), "RAT-Type");
        assert_eq!(dict.avp_name("ericsson", 7), "AVP_7");
        assert_eq!(dict.cause_text("ericsson", 64), "Context not found");
        // gtp.yaml absent: table empty, vendor still loaded
        assert_eq!(dict.ie_name("ericsson", 1), "IE_1");
    }

    #[test]
    fn test_reload_replaces_whole_vendor() {
        let tmp = TempDir::new().unwrap();
        write_vendor(tmp.path(), "ericsson");

        let dict = Dictionary::new(&settings(tmp.path(), &[("ericsson", "ericsson")]));
        dict.load_all();
        let before = dict.get("ericsson").unwrap();

        fs::remove_file(tmp.path().join("ericsson/diameter.yaml")).unwrap();
        fs::write(
            tmp.path().join("ericsson/gtp.yaml"),
            "ies:\n  - type: 87\n    name: F-TEID\n",
        )
        .unwrap();
        dict.reload_vendor("ericsson").unwrap();

        // Readers holding the old Arc keep a complete old view
        assert_eq!(before.diameter_avps.len(), 1);
        assert_eq!(dict.avp_name("ericsson", 1032), "AVP_1032");
        assert_eq!(dict.ie_name("ericsson", 87), "F-TEID");
    }

    #[test]
    fn test_message_types_and_features_load() {
        let tmp = TempDir::new().unwrap();
        write_vendor(tmp.path(), "nokia");
        fs::write(
            tmp.path().join("nokia/messages.yaml"),
            r#"
messages:
  - protocol: Diameter
    code: 8388620
    name: Vendor-Specific-Notify
"#,
        )
        .unwrap();
        fs::write(
            tmp.path().join("nokia/features.yaml"),
            "features:
  mcc_mnc_from_imsi: true
  home_plmn: \"25001\"
",
        )
        .unwrap();

        let dict = Dictionary::new(&settings(tmp.path(), &[("nokia", "nokia")]));
        dict.load_all();

        assert_eq!(
            dict.lookup_message("nokia", "diameter", 8388620).as_deref(),
            Some("Vendor-Specific-Notify")
        );
        assert!(dict.lookup_message("nokia", "gtpv2c", 8388620).is_none());
        assert_eq!(
            dict.feature("nokia", "mcc_mnc_from_imsi"),
            Some(serde_json::Value::Bool(true))
        );
        assert_eq!(
            dict.feature("nokia", "home_plmn"),
            Some(serde_json::Value::from("25001"))
        );
        assert!(dict.feature("nokia", "absent").is_none());
        assert!(dict.feature("ericsson", "home_plmn").is_none());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dict = Dictionary::empty();
        let err = dict
            .load_vendor("nokia", &tmp.path().join("nokia"))
            .unwrap_err();
        assert!(matches!(err, DictionaryError::NotFound(_)));
    }
}
