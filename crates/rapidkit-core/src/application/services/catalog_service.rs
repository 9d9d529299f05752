//! Catalog-wide operations: lock, outdated, validate and summary.

use std::collections::BTreeMap;
use std::sync::Arc;

use semver::Version;
use tracing::{info, instrument, warn};

use crate::application::ApplicationError;
use crate::application::layout::ProjectLayout;
use crate::application::ports::{ModuleValidator, Ports};
use crate::application::reports::{
    MODULES_OUTDATED_SCHEMA, MODULES_SUMMARY_SCHEMA, MODULES_VALIDATE_SCHEMA, ModuleValidation,
    OutdatedEntry, OutdatedReport, SummaryReport, ValidateReport,
};
use crate::domain::{InstalledLedger, LockEntry, LockFile};
use crate::domain::ecosystem::lenient_version;
use crate::error::RapidkitResult;

pub struct CatalogService {
    ports: Ports,
    validator: Arc<dyn ModuleValidator>,
}

fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw).ok().or_else(|| lenient_version(raw))
}

impl CatalogService {
    pub fn new(ports: Ports, validator: Arc<dyn ModuleValidator>) -> Self {
        Self { ports, validator }
    }

    /// Pin every loadable module's version into `.rapidkit/modules.lock.yaml`.
    #[instrument(skip(self, layout), fields(root = %layout.root().display()))]
    pub fn lock(&self, layout: &ProjectLayout) -> RapidkitResult<LockFile> {
        let fs = self.ports.fs.as_ref();
        layout.require_initialized(fs)?;
        let catalog = self.ports.modules.load_all_specs()?;
        for (slug, error) in &catalog.errors {
            warn!(module = %slug, %error, "Module left out of lock file");
        }

        let mut lock = LockFile::new(self.ports.clock.now());
        for (slug, manifest) in catalog.specs {
            lock.modules.insert(
                slug,
                LockEntry {
                    version: manifest.version.to_string(),
                    tier: manifest.tier,
                    signed: manifest.is_signed(),
                },
            );
        }

        let yaml = serde_yaml_ng::to_string(&lock)
            .map_err(|e| ApplicationError::serialization("modules.lock.yaml", e))?;
        fs.write_file(&layout.lock_file(), &yaml)?;
        info!(modules = lock.modules.len(), "Wrote lock file");
        Ok(lock)
    }

    fn read_lock(&self, layout: &ProjectLayout) -> RapidkitResult<Option<LockFile>> {
        let Some(raw) = self.ports.fs.read_file(&layout.lock_file())? else {
            return Ok(None);
        };
        serde_yaml_ng::from_str(&raw)
            .map(Some)
            .map_err(|e| ApplicationError::serialization("modules.lock.yaml", e).into())
    }

    /// Compare the lock file (or, without one, the installed ledger) with
    /// the catalog.
    pub fn outdated(
        &self,
        layout: &ProjectLayout,
        ledger: &InstalledLedger,
    ) -> RapidkitResult<OutdatedReport> {
        let (baseline, pinned): (&'static str, BTreeMap<String, String>) =
            match self.read_lock(layout)? {
                Some(lock) => (
                    "lock",
                    lock.modules
                        .into_iter()
                        .map(|(slug, entry)| (slug, entry.version))
                        .collect(),
                ),
                None => (
                    "ledger",
                    ledger
                        .installed_modules
                        .iter()
                        .map(|m| (m.slug.clone(), m.version.clone()))
                        .collect(),
                ),
            };

        let catalog = self.ports.modules.load_all_specs()?;
        let mut outdated = Vec::new();
        let mut missing = Vec::new();
        let mut up_to_date = 0;
        for (slug, locked) in pinned {
            let Some(manifest) = catalog.specs.get(&slug) else {
                missing.push(slug);
                continue;
            };
            let newer = match parse_version(&locked) {
                Some(current) => manifest.version > current,
                None => manifest.version.to_string() != locked,
            };
            if newer {
                outdated.push(OutdatedEntry {
                    module: slug,
                    locked,
                    available: manifest.version.to_string(),
                });
            } else {
                up_to_date += 1;
            }
        }

        Ok(OutdatedReport {
            schema_version: MODULES_OUTDATED_SCHEMA,
            baseline,
            outdated,
            missing,
            up_to_date,
        })
    }

    /// Load every manifest and check every module directory.
    #[instrument(skip(self))]
    pub fn validate(&self) -> RapidkitResult<ValidateReport> {
        let mut modules = Vec::new();
        for slug in self.ports.modules.discover()? {
            let (manifest, manifest_errors) = match self.ports.modules.load_manifest(&slug) {
                Ok(m) => (Some(m), Vec::new()),
                Err(e) => (None, vec![e.to_string()]),
            };
            let structure = match self.validator.validate(&slug, manifest.as_ref()) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(module = %slug, error = %e, "Structure check failed to run");
                    None
                }
            };
            modules.push(ModuleValidation {
                module: slug,
                manifest_errors,
                structure,
            });
        }
        let valid = modules.iter().filter(|m| m.is_valid()).count();
        let invalid = modules.len() - valid;
        info!(valid, invalid, "Validated catalog");
        Ok(ValidateReport {
            schema_version: MODULES_VALIDATE_SCHEMA,
            valid,
            invalid,
            modules,
        })
    }

    pub fn summary(&self) -> RapidkitResult<SummaryReport> {
        let catalog = self.ports.modules.load_all_specs()?;
        let mut by_tier = BTreeMap::new();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut signed = 0;
        for manifest in catalog.specs.values() {
            *by_tier.entry(manifest.tier).or_default() += 1;
            *by_status.entry(manifest.status.clone()).or_default() += 1;
            if manifest.is_signed() {
                signed += 1;
            }
        }
        Ok(SummaryReport {
            schema_version: MODULES_SUMMARY_SCHEMA,
            total: catalog.specs.len() + catalog.errors.len(),
            by_tier,
            by_status,
            signed,
            errors: catalog
                .errors
                .into_iter()
                .map(|(slug, e)| (slug, e.to_string()))
                .collect(),
        })
    }
}
