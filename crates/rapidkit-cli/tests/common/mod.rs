//! Shared fixtures for the CLI tests: a small on-disk catalog and a
//! command builder pointed at it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const PROJECT: &str = "my-api";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Two essentials, two modules feeding the same settings anchor, one kit.
pub fn write_catalog(root: &Path) {
    write(
        root,
        "modules/free/essentials/core/module.yaml",
        "name: free/essentials/core\nversion: 1.0.0\ntier: free\ngeneration:\n  variants:\n    fastapi:\n      files:\n        - template: core.py.j2\n          output: src/core.py\n",
    );
    write(
        root,
        "modules/free/essentials/core/templates/core.py.j2",
        "# core for {{ project_name }}\n",
    );

    write(
        root,
        "modules/free/essentials/settings/module.yaml",
        r#"name: free/essentials/settings
version: 1.1.0
tier: free
generation:
  variants:
    fastapi:
      files:
        - template: settings.py.j2
          output: src/settings.py
"#,
    );
    write(
        root,
        "modules/free/essentials/settings/templates/settings.py.j2",
        "class Settings:\n    project = \"{{ project_name }}\"\n    # <<<inject:settings_fields>>>\n",
    );

    write(
        root,
        "modules/free/database/db_postgres/module.yaml",
        r#"name: free/database/db_postgres
version: 0.3.0
tier: free
depends_on: [free/essentials/core]
generation:
  defaults:
    database_url: postgresql://localhost/app
  variants:
    fastapi:
      files:
        - template: db.py.j2
          output: src/db.py
  snippets:
    config: snippets.yaml
"#,
    );
    write(
        root,
        "modules/free/database/db_postgres/templates/db.py.j2",
        "DSN = \"{{ database_url }}\"\n",
    );
    write(
        root,
        "modules/free/database/db_postgres/templates/snippets/settings_fields.py.j2",
        "DATABASE_URL = \"{{ database_url }}\"\n",
    );
    write(
        root,
        "modules/free/database/db_postgres/snippets.yaml",
        r#"snippets:
  - id: db_postgres_settings_fields
    target: src/settings.py
    anchor: settings_fields
    template: snippets/settings_fields.py.j2
    owner: free/essentials/settings
"#,
    );

    write(
        root,
        "modules/free/cache/redis/module.yaml",
        r#"name: free/cache/redis
version: 0.2.0
tier: free
generation:
  defaults:
    redis_url: redis://localhost:6379/0
  variants:
    fastapi:
      files:
        - template: cache.py.j2
          output: src/cache.py
  snippets:
    config: snippets.yaml
"#,
    );
    write(
        root,
        "modules/free/cache/redis/templates/cache.py.j2",
        "URL = \"{{ redis_url }}\"\n",
    );
    write(
        root,
        "modules/free/cache/redis/templates/snippets/settings_fields.py.j2",
        "REDIS_URL = \"{{ redis_url }}\"\n",
    );
    write(
        root,
        "modules/free/cache/redis/snippets.yaml",
        r#"snippets:
  - id: redis_settings_fields
    target: src/settings.py
    anchor: settings_fields
    template: snippets/settings_fields.py.j2
    owner: free/essentials/settings
    priority: 10
"#,
    );

    write(
        root,
        "kits/fastapi.standard/kit.yaml",
        r#"name: fastapi.standard
version: 1.0.0
variant: fastapi
engine: python
essential_modules:
  - slug: free/essentials/core
  - slug: free/essentials/settings
    toggle: install_settings
"#,
    );
    write(
        root,
        "kits/fastapi.standard/files/README.md.j2",
        "# {{ project_name }}\n",
    );
}

/// A temporary workspace holding the catalog and, once created, a project.
pub struct Workspace {
    pub temp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        write_catalog(temp.path());
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn project_dir(&self) -> PathBuf {
        self.temp.path().join(PROJECT)
    }

    /// `rapidkit` with the catalog roots set and requirement probes off.
    /// `-p` points at the workspace itself.
    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("rapidkit");
        cmd.current_dir(self.root())
            .env("RAPIDKIT_GENERATION__CHECK_REQUIREMENTS", "false")
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .arg("--modules-root")
            .arg(self.root().join("modules"))
            .arg("--kits-root")
            .arg(self.root().join("kits"));
        cmd
    }

    /// Like [`Self::cmd`] with `-p` set to the created project.
    pub fn in_project(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("-p").arg(self.project_dir());
        cmd
    }

    /// `rapidkit create my-api` with any extra `--var` pairs.
    pub fn create(&self, vars: &[&str]) {
        let mut cmd = self.cmd();
        cmd.arg("-p").arg(self.root()).args(["create", PROJECT]);
        for var in vars {
            cmd.args(["--var", var]);
        }
        cmd.assert().success();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.project_dir().join(rel)).unwrap()
    }

    pub fn edit(&self, rel: &str, content: &str) {
        fs::write(self.project_dir().join(rel), content).unwrap();
    }

    /// Run and parse stdout as JSON.
    pub fn json(mut cmd: Command) -> serde_json::Value {
        let out = cmd.output().unwrap();
        assert!(
            out.status.success(),
            "command failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        serde_json::from_slice(&out.stdout).unwrap()
    }
}
