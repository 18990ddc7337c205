//! Special metadata files
//!
//! Special files are ordinary [`FileEntry`](crate::catalog::FileEntry)
//! records with a reserved type code. Their payloads are YAML documents,
//! except install scripts which are raw UTF-8.

use crate::catalog::type_codes;
use crate::error::{NovusPackError, Result};
use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

/// Update manifest (type 65000)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Paths touched by this update
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Requires,
    Recommends,
    Conflicts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    pub version: VersionReq,
}

/// Package relationships (type 65002)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageRelationships {
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl PackageRelationships {
    /// Relationships of `kind` whose requirement `version` satisfies
    pub fn matching(&self, kind: RelationshipKind, name: &str, version: &Version) -> bool {
        self.relationships
            .iter()
            .any(|r| r.kind == kind && r.name == name && r.version.matches(version))
    }
}

/// Package identity (type 65003)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub vendor_id: u32,
    #[serde(default)]
    pub app_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created: DateTime<Utc>,
}

/// Typed payload of a special file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialFile {
    UpdateManifest(UpdateManifest),
    InstallScript(String),
    Relationships(PackageRelationships),
    Info(PackageInfo),
}

impl SpecialFile {
    pub fn type_code(&self) -> u16 {
        match self {
            SpecialFile::UpdateManifest(_) => type_codes::UPDATE_MANIFEST,
            SpecialFile::InstallScript(_) => type_codes::INSTALL_SCRIPT,
            SpecialFile::Relationships(_) => type_codes::PACKAGE_RELATIONSHIPS,
            SpecialFile::Info(_) => type_codes::PACKAGE_INFO,
        }
    }

    /// Conventional location inside the package
    pub fn default_path(&self) -> &'static str {
        default_path(self.type_code()).unwrap_or("/.novuspack/special")
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(match self {
            SpecialFile::UpdateManifest(m) => serde_yaml::to_string(m)?.into_bytes(),
            SpecialFile::InstallScript(s) => s.as_bytes().to_vec(),
            SpecialFile::Relationships(r) => serde_yaml::to_string(r)?.into_bytes(),
            SpecialFile::Info(i) => serde_yaml::to_string(i)?.into_bytes(),
        })
    }

    /// Parse the payload of a special file with `type_code`
    pub fn from_payload(type_code: u16, payload: &[u8]) -> Result<Self> {
        match type_code {
            type_codes::UPDATE_MANIFEST => Ok(SpecialFile::UpdateManifest(
                serde_yaml::from_slice(payload)?,
            )),
            type_codes::INSTALL_SCRIPT => {
                let script = std::str::from_utf8(payload).map_err(|e| {
                    NovusPackError::Encoding(format!(
                        "install script is not valid UTF-8 (error at byte {})",
                        e.valid_up_to()
                    ))
                })?;
                if script.contains('\0') {
                    return Err(NovusPackError::validation(
                        "install_script",
                        "install script cannot contain NUL bytes",
                    ));
                }
                Ok(SpecialFile::InstallScript(script.to_string()))
            }
            type_codes::PACKAGE_RELATIONSHIPS => Ok(SpecialFile::Relationships(
                serde_yaml::from_slice(payload)?,
            )),
            type_codes::PACKAGE_INFO => Ok(SpecialFile::Info(serde_yaml::from_slice(payload)?)),
            other => Err(NovusPackError::validation(
                "type_code",
                format!("type code {} is not a known special file", other),
            )),
        }
    }
}

/// Conventional path for a special file type
pub fn default_path(type_code: u16) -> Option<&'static str> {
    match type_code {
        type_codes::UPDATE_MANIFEST => Some("/.novuspack/update.yaml"),
        type_codes::INSTALL_SCRIPT => Some("/.novuspack/install.sh"),
        type_codes::PACKAGE_RELATIONSHIPS => Some("/.novuspack/relationships.yaml"),
        type_codes::PACKAGE_INFO => Some("/.novuspack/info.yaml"),
        type_codes::PACKAGE_SIGNATURE => Some(crate::security::PACKAGE_SIGNATURE_PATH),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_manifest_payload() {
        let manifest = SpecialFile::UpdateManifest(UpdateManifest {
            version: Version::new(1, 2, 0),
            minimum_version: Some(Version::new(1, 0, 0)),
            notes: Some("fixes".into()),
            files: vec!["/bin/game".into()],
        });
        let payload = manifest.to_payload().unwrap();
        let parsed = SpecialFile::from_payload(type_codes::UPDATE_MANIFEST, &payload).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_relationships_match_requirements() {
        let yaml = "relationships:\n  - name: engine\n    kind: requires\n    version: \">=2.1, <3\"\n";
        let parsed = SpecialFile::from_payload(type_codes::PACKAGE_RELATIONSHIPS, yaml.as_bytes()).unwrap();
        let SpecialFile::Relationships(rel) = parsed else {
            panic!("wrong variant");
        };
        assert!(rel.matching(RelationshipKind::Requires, "engine", &Version::new(2, 4, 0)));
        assert!(!rel.matching(RelationshipKind::Requires, "engine", &Version::new(3, 0, 0)));
    }

    #[test]
    fn test_install_script_must_be_utf8() {
        assert!(SpecialFile::from_payload(type_codes::INSTALL_SCRIPT, b"#!/bin/sh\necho hi\n").is_ok());
        assert!(matches!(
            SpecialFile::from_payload(type_codes::INSTALL_SCRIPT, &[0xC3, 0x28]),
            Err(NovusPackError::Encoding(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        assert!(matches!(
            SpecialFile::from_payload(type_codes::PACKAGE_INFO, b"name: [unclosed"),
            Err(NovusPackError::Yaml(_))
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(SpecialFile::from_payload(12, b"").is_err());
        assert!(SpecialFile::from_payload(65010, b"").is_err());
    }

    #[test]
    fn test_default_paths() {
        let script = SpecialFile::InstallScript("echo".into());
        assert_eq!(script.default_path(), "/.novuspack/install.sh");
        assert_eq!(script.type_code(), 65001);
    }
}
