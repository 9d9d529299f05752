//! `rapidkit modules ...`: catalog-wide maintenance.

use rapidkit_adapters::signing::generate_keypair;
use rapidkit_core::domain::InstalledLedger;

use crate::cli::ModulesCommands;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputManager;

pub fn execute(cmd: ModulesCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    match cmd {
        ModulesCommands::Lock(flag) => {
            let lock = ctx.catalog()?.lock(&ctx.layout())?;
            if output.wants_json(flag.json) {
                return output.json(&lock);
            }
            output.success(&format!(
                "Locked {} modules in {}",
                lock.modules.len(),
                ctx.layout().lock_file().display()
            ))?;
        }
        ModulesCommands::Outdated(flag) => {
            // Without a project the lock file is absent and the ledger empty.
            let ledger = match ctx.open_project() {
                Ok(state) => state.ledger,
                Err(_) => InstalledLedger::default(),
            };
            let report = ctx.catalog()?.outdated(&ctx.layout(), &ledger)?;
            if output.wants_json(flag.json) {
                return output.json(&report);
            }
            for entry in &report.outdated {
                output.kv(&entry.module, &format!("{} -> {}", entry.locked, entry.available))?;
            }
            for slug in &report.missing {
                output.warning(&format!("{slug} is no longer in the catalog"))?;
            }
            output.info(&format!(
                "{} outdated, {} up to date (baseline: {})",
                report.outdated.len(),
                report.up_to_date,
                report.baseline
            ))?;
        }
        ModulesCommands::Validate(flag) => {
            let report = ctx.catalog()?.validate()?;
            if output.wants_json(flag.json) {
                output.json(&report)?;
            } else {
                for module in report.modules.iter().filter(|m| !m.is_valid()) {
                    output.error(&module.module)?;
                    for problem in &module.manifest_errors {
                        output.kv("manifest", problem)?;
                    }
                    if let Some(error) = module.structure.clone().and_then(|r| r.into_error()) {
                        for message in &error.messages {
                            output.kv("structure", message)?;
                        }
                    }
                }
                output.info(&format!("Valid: {}, Invalid: {}", report.valid, report.invalid))?;
            }
            if report.invalid > 0 {
                return Err(CliError::ValidationFailed {
                    message: format!("{} modules failed validation", report.invalid),
                });
            }
        }
        ModulesCommands::Summary(flag) => {
            let report = ctx.catalog()?.summary()?;
            if output.wants_json(flag.json) {
                return output.json(&report);
            }
            output.header(&format!("{} modules", report.total))?;
            for (tier, count) in &report.by_tier {
                output.kv(&tier.to_string(), &count.to_string())?;
            }
            for (status, count) in &report.by_status {
                output.kv(status, &count.to_string())?;
            }
            output.kv("signed", &report.signed.to_string())?;
            for (slug, error) in &report.errors {
                output.warning(&format!("{slug}: {error}"))?;
            }
        }
        ModulesCommands::Keygen(flag) => {
            let pair = generate_keypair();
            if output.wants_json(flag.json) {
                return output.json(&pair);
            }
            output.kv("private_key", &pair.private_key)?;
            output.kv("public_key", &pair.public_key)?;
            output.kv("signer_id", &pair.signer_id)?;
            output.warning("Store the private key securely; it is not saved anywhere")?;
        }
        ModulesCommands::SignAll {
            key,
            skip_unchanged,
            json,
        } => {
            let report = ctx.signer().sign_all(&key, skip_unchanged)?;
            if output.wants_json(json) {
                output.json(&report)?;
            } else {
                output.success(&format!(
                    "Signed {} modules as {} ({} unchanged)",
                    report.signed.len(),
                    report.signer_id,
                    report.unchanged.len()
                ))?;
                for (slug, error) in &report.errors {
                    output.error(&format!("{slug}: {error}"))?;
                }
            }
            if !report.errors.is_empty() {
                return Err(CliError::ValidationFailed {
                    message: format!("{} modules could not be signed", report.errors.len()),
                });
            }
        }
        ModulesCommands::VerifyAll(flag) => {
            let report = ctx.signer().verify_all()?;
            if output.wants_json(flag.json) {
                output.json(&report)?;
            } else {
                for (slug, error) in &report.errors {
                    output.error(&format!("{slug}: {error}"))?;
                }
                if report.errors.is_empty() {
                    output.success(&report.message())?;
                }
            }
            if !report.errors.is_empty() {
                return Err(CliError::ValidationFailed {
                    message: report.message(),
                });
            }
        }
    }
    Ok(())
}
