//! Module manifest (`module.yaml`) model and validation.
//!
//! Parsing is tolerant: every optional section may be missing. Validation
//! collects *all* issues into one [`ManifestError`] instead of stopping at
//! the first, so `modules validate` can report a complete picture.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::domain::common::{ProjectPath, slug_basename, validate_slug};
use crate::domain::context::ContextValue;
use crate::domain::error::{ManifestError, ManifestIssue};

/// Default vendor root inside a project.
pub const DEFAULT_VENDOR_ROOT: &str = ".rapidkit/vendor";

/// Fields that carry signature material and never take part in the
/// canonical form.
pub const SIGNATURE_FIELDS: [&str; 4] = ["signature", "signer_id", "signers", "signature_version"];

/// Commercial tier of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// One package dependency merged into the host project's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    pub name: String,
    #[serde(default = "any_version")]
    pub version: String,
}

fn any_version() -> String {
    "*".to_string()
}

/// `generation.vendor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorSpec {
    #[serde(default = "default_vendor_root")]
    pub root: String,
    #[serde(default)]
    pub files: Vec<VendorFile>,
}

fn default_vendor_root() -> String {
    DEFAULT_VENDOR_ROOT.to_string()
}

impl Default for VendorSpec {
    fn default() -> Self {
        Self {
            root: default_vendor_root(),
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorFile {
    pub template: String,
    pub relative: String,
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
}

/// `generation.variants.<name>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    #[serde(default)]
    pub files: Vec<VariantFile>,
}

/// A variant file is either a literal `{template, output}` pair or a
/// `logical` name resolved through the framework plugin's mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetsConfig {
    pub config: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpec {
    #[serde(default)]
    pub vendor: VendorSpec,
    #[serde(default)]
    pub variants: BTreeMap<String, VariantSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippets: Option<SnippetsConfig>,
    #[serde(default)]
    pub defaults: BTreeMap<String, ContextValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_min: Option<f64>,
    #[serde(default)]
    pub coverage_ignore: Vec<String>,
}

/// Wire shape of `module.yaml`: everything optional so that validation can
/// report missing fields instead of failing the parse.
#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    tier: Option<String>,
    status: Option<String>,
    display_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    maturity: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Vec<PackageDependency>>,
    #[serde(default)]
    generation: GenerationSpec,
    #[serde(default)]
    testing: TestingSpec,
    #[serde(default)]
    signers: Vec<String>,
    signature: Option<String>,
    signer_id: Option<String>,
    signature_version: Option<String>,
}

/// A validated module manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleManifest {
    pub name: String,
    pub version: Version,
    pub tier: Tier,
    pub status: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub maturity: Option<String>,
    pub depends_on: Vec<String>,
    pub dependencies: BTreeMap<String, Vec<PackageDependency>>,
    pub generation: GenerationSpec,
    pub testing: TestingSpec,
    pub signers: Vec<String>,
    pub signature: Option<String>,
    pub signer_id: Option<String>,
    pub signature_version: Option<String>,
}

impl ModuleManifest {
    /// Parse and validate YAML text for the module located at `slug`.
    pub fn parse(slug: &str, yaml: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ManifestError::single(slug, ManifestIssue::Parse(e.to_string())))?;
        Self::from_raw(slug, raw)
    }

    fn from_raw(slug: &str, raw: RawManifest) -> Result<Self, ManifestError> {
        let mut issues = Vec::new();

        let name = match raw.name {
            Some(name) => {
                if validate_slug(&name).is_err() {
                    issues.push(ManifestIssue::InvalidName { value: name.clone() });
                } else if name != slug {
                    issues.push(ManifestIssue::NameMismatch {
                        expected: slug.to_string(),
                        found: name.clone(),
                    });
                }
                name
            }
            None => {
                issues.push(ManifestIssue::MissingField("name"));
                slug.to_string()
            }
        };

        let version = match raw.version.as_deref() {
            Some(v) => match Version::parse(v.trim()) {
                Ok(version) => Some(version),
                Err(_) => {
                    issues.push(ManifestIssue::InvalidVersion { value: v.to_string() });
                    None
                }
            },
            None => {
                issues.push(ManifestIssue::MissingField("version"));
                None
            }
        };

        let tier = match raw.tier.as_deref() {
            Some(t) => match t.parse::<Tier>() {
                Ok(tier) => Some(tier),
                Err(value) => {
                    issues.push(ManifestIssue::InvalidTier { value });
                    None
                }
            },
            None => {
                issues.push(ManifestIssue::MissingField("tier"));
                None
            }
        };

        for dep in &raw.depends_on {
            if validate_slug(dep).is_err() {
                issues.push(ManifestIssue::InvalidName { value: dep.clone() });
            }
        }

        check_generation(&raw.generation, &mut issues);

        match (version, tier) {
            (Some(version), Some(tier)) if issues.is_empty() => Ok(Self {
                name,
                version,
                tier,
                status: raw.status.unwrap_or_else(|| "active".to_string()),
                display_name: raw.display_name,
                description: raw.description,
                tags: raw.tags,
                maturity: raw.maturity,
                depends_on: raw.depends_on,
                dependencies: raw.dependencies,
                generation: raw.generation,
                testing: raw.testing,
                signers: raw.signers,
                signature: raw.signature,
                signer_id: raw.signer_id,
                signature_version: raw.signature_version,
            }),
            _ => Err(ManifestError::new(slug, issues)),
        }
    }

    /// `db_postgres` for `free/database/db_postgres`.
    pub fn basename(&self) -> &str {
        slug_basename(&self.name)
    }

    pub fn variant(&self, name: &str) -> Option<&VariantSpec> {
        self.generation.variants.get(name)
    }

    pub fn variant_names(&self) -> impl Iterator<Item = &str> {
        self.generation.variants.keys().map(String::as_str)
    }

    /// Whether the vendor payload ships health-check runtime files.
    pub fn declares_vendor_health(&self) -> bool {
        self.generation
            .vendor
            .files
            .iter()
            .any(|f| f.relative.split('/').any(|seg| seg.starts_with("health")))
    }

    /// Package dependencies declared for one ecosystem key.
    pub fn ecosystem_dependencies(&self, ecosystem: &str) -> &[PackageDependency] {
        self.dependencies
            .get(ecosystem)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

fn check_generation(generation: &GenerationSpec, issues: &mut Vec<ManifestIssue>) {
    for (index, file) in generation.vendor.files.iter().enumerate() {
        if let Err(e) = ProjectPath::try_new(&file.relative) {
            issues.push(ManifestIssue::InvalidFileEntry {
                section: "generation.vendor.files".into(),
                index,
                reason: e.to_string(),
            });
        }
    }

    for (variant, spec) in &generation.variants {
        if spec.files.is_empty() {
            issues.push(ManifestIssue::EmptyVariant {
                variant: variant.clone(),
            });
        }
        for (index, file) in spec.files.iter().enumerate() {
            let section = format!("generation.variants.{variant}.files");
            let literal = file.template.is_some() && file.output.is_some();
            if file.logical.is_none() && !literal {
                issues.push(ManifestIssue::InvalidFileEntry {
                    section,
                    index,
                    reason: "needs either 'logical' or both 'template' and 'output'".into(),
                });
            }
        }
    }
}
