//! Ed25519 manifest signing.
//!
//! The signed payload is the manifest's canonical JSON form: the YAML
//! document converted to JSON with the signature-bearing fields removed,
//! object keys sorted recursively, and no whitespace. Keys and signatures
//! are base64 (standard alphabet); a signer id is the first 16 hex
//! characters of SHA-256 over the raw 32-byte public key.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use rapidkit_core::{
    application::{
        ApplicationError,
        ports::{Filesystem, ManifestVerifier, ModuleSource, SignatureCheck},
        reports::{MODULES_SIGN_SCHEMA, MODULES_VERIFY_SCHEMA, SignReport, VerifyReport},
    },
    domain::manifest::SIGNATURE_FIELDS,
    error::RapidkitResult,
};

use crate::catalog::{FsModuleCatalog, MANIFEST_FILE};

pub const SIGNATURE_VERSION: &str = "v1";

fn signature_error(module: &str, reason: impl ToString) -> ApplicationError {
    ApplicationError::SignatureError {
        module: module.to_string(),
        reason: reason.to_string(),
    }
}

/// A freshly generated key pair, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
    pub signer_id: String,
}

pub fn generate_keypair() -> KeyPair {
    let mut seed = [0u8; 32];
    rand::rng().fill_bytes(&mut seed);
    let key = SigningKey::from_bytes(&seed);
    KeyPair {
        private_key: STANDARD.encode(key.to_bytes()),
        public_key: STANDARD.encode(key.verifying_key().to_bytes()),
        signer_id: signer_id(&key.verifying_key()),
    }
}

pub fn signer_id(key: &VerifyingKey) -> String {
    let digest = Sha256::digest(key.to_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Decode a base64 32-byte private key.
pub fn decode_signing_key(encoded: &str) -> Result<SigningKey, ApplicationError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| signature_error("*", format!("private key is not base64: {e}")))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| signature_error("*", "private key must be 32 bytes"))?;
    Ok(SigningKey::from_bytes(&seed))
}

fn decode_verifying_key(encoded: &str) -> Option<VerifyingKey> {
    let bytes: [u8; 32] = STANDARD.decode(encoded.trim()).ok()?.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let entries: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            Value::Object(entries.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Canonical signing payload of a `module.yaml` document.
pub fn canonical_manifest(module: &str, yaml: &str) -> Result<String, ApplicationError> {
    let mut value: Value = serde_yaml_ng::from_str(yaml)
        .map_err(|e| signature_error(module, format!("manifest is not valid YAML: {e}")))?;
    let Value::Object(map) = &mut value else {
        return Err(signature_error(module, "manifest is not a mapping"));
    };
    for field in SIGNATURE_FIELDS {
        map.remove(field);
    }
    serde_json::to_string(&sorted(value)).map_err(|e| signature_error(module, e))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSignature {
    pub signature: String,
    pub signer_id: String,
    pub signature_version: String,
}

pub fn sign_manifest(
    module: &str,
    yaml: &str,
    key: &SigningKey,
) -> Result<ManifestSignature, ApplicationError> {
    let canonical = canonical_manifest(module, yaml)?;
    let signature = key.sign(canonical.as_bytes());
    Ok(ManifestSignature {
        signature: STANDARD.encode(signature.to_bytes()),
        signer_id: signer_id(&key.verifying_key()),
        signature_version: SIGNATURE_VERSION.to_string(),
    })
}

/// Signature-bearing fields of a manifest, read without full validation.
#[derive(Debug, Default, serde::Deserialize)]
struct SignatureFields {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    signer_id: Option<String>,
    #[serde(default)]
    signers: Vec<String>,
}

/// `Ok(true)` when the manifest's signature verifies under one of its
/// listed signers. Unsigned manifests verify as `false`.
pub fn verify_manifest_multi(module: &str, yaml: &str) -> Result<bool, ApplicationError> {
    let fields: SignatureFields = serde_yaml_ng::from_str(yaml)
        .map_err(|e| signature_error(module, format!("manifest is not valid YAML: {e}")))?;
    let Some(encoded) = fields.signature else {
        return Ok(false);
    };
    let Some(signature) = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
    else {
        return Ok(false);
    };
    let canonical = canonical_manifest(module, yaml)?;

    let valid = fields
        .signers
        .iter()
        .filter_map(|s| decode_verifying_key(s))
        .filter(|key| {
            fields
                .signer_id
                .as_deref()
                .is_none_or(|id| id == signer_id(key))
        })
        .any(|key| key.verify_strict(canonical.as_bytes(), &signature).is_ok());
    Ok(valid)
}

/// Write `signature` into the manifest text, adding the public key to
/// `signers` when missing.
fn embed_signature(
    module: &str,
    yaml: &str,
    signature: &ManifestSignature,
    public_key: &str,
) -> Result<String, ApplicationError> {
    use serde_yaml_ng::Value as Yaml;

    let mut doc: Yaml = serde_yaml_ng::from_str(yaml)
        .map_err(|e| signature_error(module, format!("manifest is not valid YAML: {e}")))?;
    let Yaml::Mapping(map) = &mut doc else {
        return Err(signature_error(module, "manifest is not a mapping"));
    };

    let mut signers: Vec<Yaml> = match map.get("signers") {
        Some(Yaml::Sequence(items)) => items.clone(),
        _ => Vec::new(),
    };
    if !signers.iter().any(|s| s.as_str() == Some(public_key)) {
        signers.push(Yaml::String(public_key.to_string()));
    }
    map.insert("signers".into(), Yaml::Sequence(signers));
    map.insert("signature".into(), Yaml::String(signature.signature.clone()));
    map.insert("signer_id".into(), Yaml::String(signature.signer_id.clone()));
    map.insert(
        "signature_version".into(),
        Yaml::String(signature.signature_version.clone()),
    );
    serde_yaml_ng::to_string(&doc).map_err(|e| signature_error(module, e))
}

/// Signs and verifies every manifest of an on-disk catalog.
pub struct ManifestSigner {
    catalog: FsModuleCatalog,
    fs: Arc<dyn Filesystem>,
}

impl ManifestSigner {
    pub fn new(catalog: FsModuleCatalog, fs: Arc<dyn Filesystem>) -> Self {
        Self { catalog, fs }
    }

    fn manifest_text(&self, slug: &str) -> RapidkitResult<(std::path::PathBuf, String)> {
        let path = self.catalog.module_path(slug).join(MANIFEST_FILE);
        let raw = self.fs.read_file(&path)?.ok_or_else(|| {
            ApplicationError::ModuleNotFound {
                slug: slug.to_string(),
            }
        })?;
        Ok((path, raw))
    }

    /// Sign every module with `private_key`. With `skip_unchanged`, manifests
    /// whose current signature already verifies under this key are left
    /// untouched.
    #[instrument(skip(self, private_key))]
    pub fn sign_all(&self, private_key: &str, skip_unchanged: bool) -> RapidkitResult<SignReport> {
        let key = decode_signing_key(private_key)?;
        let public_key = STANDARD.encode(key.verifying_key().to_bytes());
        let id = signer_id(&key.verifying_key());

        let mut report = SignReport {
            schema_version: MODULES_SIGN_SCHEMA,
            signer_id: id.clone(),
            signed: Vec::new(),
            unchanged: Vec::new(),
            errors: BTreeMap::new(),
        };

        for slug in self.catalog.discover()? {
            let result = self.manifest_text(&slug).and_then(|(path, raw)| {
                if skip_unchanged && self.signed_by(&slug, &raw, &id)? {
                    return Ok(false);
                }
                let signature = sign_manifest(&slug, &raw, &key)?;
                let updated = embed_signature(&slug, &raw, &signature, &public_key)?;
                self.fs.write_file(&path, &updated)?;
                Ok(true)
            });
            match result {
                Ok(true) => report.signed.push(slug),
                Ok(false) => report.unchanged.push(slug),
                Err(e) => {
                    warn!(module = %slug, error = %e, "Could not sign manifest");
                    report.errors.insert(slug, e.to_string());
                }
            }
        }
        info!(
            signed = report.signed.len(),
            unchanged = report.unchanged.len(),
            errors = report.errors.len(),
            "Signed catalog"
        );
        Ok(report)
    }

    fn signed_by(&self, slug: &str, raw: &str, id: &str) -> RapidkitResult<bool> {
        let fields: SignatureFields = serde_yaml_ng::from_str(raw).unwrap_or_default();
        Ok(fields.signer_id.as_deref() == Some(id) && verify_manifest_multi(slug, raw)?)
    }

    #[instrument(skip(self))]
    pub fn verify_all(&self) -> RapidkitResult<VerifyReport> {
        let mut report = VerifyReport {
            schema_version: MODULES_VERIFY_SCHEMA,
            valid: Vec::new(),
            errors: BTreeMap::new(),
        };
        for slug in self.catalog.discover()? {
            let outcome = self
                .manifest_text(&slug)
                .and_then(|(_, raw)| Ok(verify_manifest_multi(&slug, &raw)?));
            match outcome {
                Ok(true) => report.valid.push(slug),
                Ok(false) => {
                    report
                        .errors
                        .insert(slug, "signature missing or invalid".to_string());
                }
                Err(e) => {
                    report.errors.insert(slug, e.to_string());
                }
            }
        }
        Ok(report)
    }
}

impl ManifestVerifier for ManifestSigner {
    fn verify(&self, slug: &str) -> RapidkitResult<SignatureCheck> {
        let (_, raw) = self.manifest_text(slug)?;
        let fields: SignatureFields = serde_yaml_ng::from_str(&raw)
            .map_err(|e| signature_error(slug, format!("manifest is not valid YAML: {e}")))?;
        if fields.signature.is_none() {
            return Ok(SignatureCheck::Unsigned);
        }
        Ok(if verify_manifest_multi(slug, &raw)? {
            SignatureCheck::Valid
        } else {
            SignatureCheck::Invalid
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::LocalFilesystem;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = "name: free/essentials/logging\nversion: 1.0.0\ntier: free\ndescription: Structured logging\n";

    fn catalog() -> (TempDir, ManifestSigner) {
        let temp = TempDir::new().unwrap();
        for slug in ["free/essentials/logging", "free/essentials/settings"] {
            let dir = temp.path().join(slug);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(MANIFEST_FILE), MANIFEST.replace("logging", slug.rsplit('/').next().unwrap())).unwrap();
        }
        let signer = ManifestSigner::new(
            FsModuleCatalog::new(temp.path()),
            Arc::new(LocalFilesystem::new()),
        );
        (temp, signer)
    }

    #[test]
    fn canonical_form_ignores_key_order_and_signature_fields() {
        let a = canonical_manifest("m", "b: 1\na: {y: 2, x: 1}\nsignature: abc\n").unwrap();
        let b = canonical_manifest("m", "a: {x: 1, y: 2}\nb: 1\nsigners: [k]\n").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, r#"{"a":{"x":1,"y":2},"b":1}"#);
    }

    #[test]
    fn signatures_are_deterministic_and_verify() {
        let keys = generate_keypair();
        let key = decode_signing_key(&keys.private_key).unwrap();
        let first = sign_manifest("m", MANIFEST, &key).unwrap();
        let second = sign_manifest("m", MANIFEST, &key).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.signer_id, keys.signer_id);
        assert_eq!(first.signer_id.len(), 16);

        let signed = embed_signature("m", MANIFEST, &first, &keys.public_key).unwrap();
        assert!(verify_manifest_multi("m", &signed).unwrap());
        assert!(!verify_manifest_multi("m", MANIFEST).unwrap());
    }

    #[test]
    fn sign_all_then_tamper_fails_one_module() {
        let (temp, signer) = catalog();
        let keys = generate_keypair();

        let report = signer.sign_all(&keys.private_key, false).unwrap();
        assert_eq!(report.signed.len(), 2);
        let verified = signer.verify_all().unwrap();
        assert_eq!(verified.message(), "All modules verified. Valid: 2, Errors: 0");

        let again = signer.sign_all(&keys.private_key, true).unwrap();
        assert_eq!(again.unchanged.len(), 2);

        let path = temp.path().join("free/essentials/logging").join(MANIFEST_FILE);
        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("Structured logging", "Structured logginG");
        fs::write(&path, tampered).unwrap();

        let verified = signer.verify_all().unwrap();
        assert_eq!(verified.valid, vec!["free/essentials/settings"]);
        assert!(verified.errors.contains_key("free/essentials/logging"));
    }

    #[test]
    fn verifier_tells_unsigned_from_forged() {
        let (temp, signer) = catalog();
        assert_eq!(
            signer.verify("free/essentials/logging").unwrap(),
            SignatureCheck::Unsigned
        );

        let keys = generate_keypair();
        signer.sign_all(&keys.private_key, false).unwrap();
        assert_eq!(
            signer.verify("free/essentials/logging").unwrap(),
            SignatureCheck::Valid
        );

        let path = temp.path().join("free/essentials/settings").join(MANIFEST_FILE);
        let forged = format!(
            "{MANIFEST}signers: [{}]\nsignature: {}\nsigner_id: {}\n",
            keys.public_key,
            STANDARD.encode([7u8; 64]),
            keys.signer_id
        )
        .replace("logging", "settings");
        fs::write(&path, forged).unwrap();
        assert_eq!(
            signer.verify("free/essentials/settings").unwrap(),
            SignatureCheck::Invalid
        );
    }

    #[test]
    fn rejects_malformed_private_keys() {
        assert!(decode_signing_key("not base64!").is_err());
        assert!(decode_signing_key(&STANDARD.encode([1u8; 8])).is_err());
    }
}
