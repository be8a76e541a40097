//! Structured-file actions.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use super::Action;
use crate::context::{ExecutionContext, Outcome};

/// Recursively merge `patch` into `base`. Objects merge key by key; any
/// other value in `patch` replaces what is in `base`.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                let nested = value.is_object() && base_map.get(key).is_some_and(Value::is_object);
                match base_map.get_mut(key) {
                    Some(existing) if nested => deep_merge(existing, value),
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Deep-merge a JSON object into a file inside the checkout.
pub struct JsonPatch {
    path: String,
    patch: Value,
    create_if_missing: bool,
}

impl JsonPatch {
    pub fn new(path: impl Into<String>, patch: Value) -> Self {
        Self {
            path: path.into(),
            patch,
            create_if_missing: true,
        }
    }

    /// Skip, rather than create, when the file is absent.
    pub fn existing_only(mut self) -> Self {
        self.create_if_missing = false;
        self
    }

    fn apply(&self, full_path: &Path) -> Result<bool> {
        let (mut data, created) = if full_path.exists() {
            let raw = std::fs::read_to_string(full_path)
                .with_context(|| format!("Failed to read {}", full_path.display()))?;
            let parsed: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid JSON in {}", full_path.display()))?;
            (parsed, false)
        } else {
            (Value::Object(Default::default()), true)
        };

        deep_merge(&mut data, &self.patch);

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut rendered = serde_json::to_string_pretty(&data)?;
        rendered.push('\n');
        std::fs::write(full_path, rendered)
            .with_context(|| format!("Failed to write {}", full_path.display()))?;
        Ok(created)
    }
}

impl Action for JsonPatch {
    fn name(&self) -> &str {
        "json-patch"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx).with_meta("path", self.path.clone());
        }
        let full_path = ctx.path().join(&self.path);
        if !full_path.exists() && !self.create_if_missing {
            return Outcome::skipped(format!("File {} doesn't exist", self.path))
                .with_action(self.name())
                .with_meta("path", self.path.clone());
        }

        match self.apply(&full_path) {
            Ok(created) => {
                let verb = if created { "Created and patched" } else { "Patched" };
                Outcome::success(format!("{} {}", verb, self.path))
                    .with_action(self.name())
                    .with_meta("path", self.path.clone())
                    .with_meta("created", created)
            }
            Err(e) => {
                warn!(repo = %ctx.target.full_name, path = %self.path, error = %e, "json patch failed");
                Outcome::failed(format!("Failed to patch {}: {:#}", self.path, e))
                    .with_action(self.name())
                    .with_meta("path", self.path.clone())
            }
        }
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        format!("Would patch {}", self.path)
    }
}

/// Parse a JSON file from the checkout into a context variable.
pub struct JsonRead {
    path: String,
    variable: String,
}

impl JsonRead {
    pub fn new(path: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            variable: variable.into(),
        }
    }
}

impl Action for JsonRead {
    fn name(&self) -> &str {
        "json-read"
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> Outcome {
        if ctx.preview_only() {
            return self.preview(ctx);
        }
        let full_path = ctx.path().join(&self.path);
        if !full_path.exists() {
            return Outcome::skipped(format!("File {} doesn't exist", self.path))
                .with_action(self.name())
                .with_meta("path", self.path.clone());
        }

        let parsed = std::fs::read_to_string(&full_path)
            .context("read failed")
            .and_then(|raw| serde_json::from_str::<Value>(&raw).context("invalid JSON"));
        match parsed {
            Ok(data) => {
                ctx.set_var(self.variable.clone(), data);
                Outcome::success(format!("Read {}", self.path))
                    .with_action(self.name())
                    .with_meta("path", self.path.clone())
                    .with_meta("variable", self.variable.clone())
            }
            Err(e) => Outcome::failed(format!("Failed to read {}: {:#}", self.path, e))
                .with_action(self.name())
                .with_meta("path", self.path.clone()),
        }
    }

    fn preview_message(&self, _ctx: &ExecutionContext) -> String {
        format!("Would read {}", self.path)
    }
}
