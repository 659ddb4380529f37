// src/prompt/mod.rs
// Named prompt templates loaded from an external directory, with
// `{{placeholder}}` substitution and explicit (not silent) reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use regex::Regex;

use crate::config::prompt::PromptConfig;
use crate::error::CoreError;

/// Read-only-after-load registry of named templates. Unknown prompt names
/// fail fast at startup; missing prompts at runtime produce a
/// `Configuration` error. The inner map is behind a `RwLock` rather than
/// frozen because the admin-triggered `reload-prompts` CLI verb needs to
/// replace it without restarting the process.
pub struct PromptRegistry {
    dir: PathBuf,
    templates: RwLock<HashMap<String, String>>,
}

fn placeholder_re() -> Regex {
    Regex::new(r"\{\{(\w+)\}\}").unwrap()
}

impl PromptRegistry {
    /// Loads every `<name>.md` file in `config.templates_dir`. `expected`
    /// is the set of names the rest of the core requires (expert system
    /// prompts, the router classification prompt, the handoff banner, the
    /// iteration-cap summary) -- missing any of them fails fast at startup.
    pub fn load(config: &PromptConfig, expected: &[&str]) -> Result<Self, CoreError> {
        let dir = PathBuf::from(&config.templates_dir);
        let mut templates = HashMap::new();

        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)
                .map_err(|e| CoreError::configuration(format!("cannot read prompts dir: {e}")))?
            {
                let entry = entry
                    .map_err(|e| CoreError::configuration(format!("cannot read prompts dir entry: {e}")))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let body = std::fs::read_to_string(&path)
                    .map_err(|e| CoreError::configuration(format!("cannot read prompt {stem}: {e}")))?;
                templates.insert(stem.to_string(), body);
            }
        }

        let missing: Vec<&str> = expected
            .iter()
            .filter(|name| !templates.contains_key(**name))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::configuration(format!(
                "missing required prompt templates: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            dir,
            templates: RwLock::new(templates),
        })
    }

    /// Renders `name` with `{{placeholder}}` substitution. An unknown
    /// placeholder at render time is `Internal` (it signals a
    /// template/code drift rather than bad input); a missing template
    /// name is `Configuration`.
    pub fn render(&self, name: &str, vars: &HashMap<&str, String>) -> Result<String, CoreError> {
        let templates = self.templates.read().unwrap();
        let template = templates
            .get(name)
            .ok_or_else(|| CoreError::configuration(format!("unknown prompt: {name}")))?;

        let re = placeholder_re();
        let mut missing_placeholder: Option<String> = None;
        let rendered = re.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match vars.get(key) {
                Some(value) => value.clone(),
                None => {
                    missing_placeholder = Some(key.to_string());
                    String::new()
                }
            }
        });

        if let Some(key) = missing_placeholder {
            return Err(CoreError::Internal(format!(
                "prompt {name} references unknown placeholder {{{{{key}}}}}"
            )));
        }

        Ok(rendered.into_owned())
    }

    /// Explicit reload from disk -- never triggered automatically, there
    /// is no silent hot-reload. Unlike `load`, a reload that's missing a
    /// template that was previously present keeps
    /// serving the old copy for that name rather than bricking the
    /// process -- an admin fixing a typo mid-flight should not take the
    /// core down while they fix it.
    pub fn reload(&self) -> Result<(), CoreError> {
        if !self.dir.is_dir() {
            return Err(CoreError::configuration(format!(
                "prompts dir does not exist: {}",
                self.dir.display()
            )));
        }

        let mut fresh = HashMap::new();
        for entry in std::fs::read_dir(&self.dir)
            .map_err(|e| CoreError::configuration(format!("cannot read prompts dir: {e}")))?
        {
            let entry = entry.map_err(|e| CoreError::configuration(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let body = std::fs::read_to_string(&path).map_err(|e| CoreError::configuration(e.to_string()))?;
            fresh.insert(stem.to_string(), body);
        }

        let mut templates = self.templates.write().unwrap();
        templates.extend(fresh);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.templates.read().unwrap().contains_key(name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn write_template(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(format!("{name}.md")), body).unwrap();
    }

    #[test]
    fn renders_placeholder_substitution() {
        let tmp = tempfile::tempdir().unwrap();
        write_template(tmp.path(), "greeting", "Hello {{name}}, you are the {{expert}} expert.");

        let config = PromptConfig {
            templates_dir: tmp.path().to_string_lossy().to_string(),
        };
        let registry = PromptRegistry::load(&config, &["greeting"]).unwrap();

        let mut vars = StdHashMap::new();
        vars.insert("name", "Sam".to_string());
        vars.insert("expert", "food".to_string());
        let rendered = registry.render("greeting", &vars).unwrap();
        assert_eq!(rendered, "Hello Sam, you are the food expert.");
    }

    #[test]
    fn missing_required_template_fails_at_load() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PromptConfig {
            templates_dir: tmp.path().to_string_lossy().to_string(),
        };
        let err = PromptRegistry::load(&config, &["expert_food"]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn unknown_placeholder_at_render_is_internal() {
        let tmp = tempfile::tempdir().unwrap();
        write_template(tmp.path(), "t", "Hi {{unknown}}");
        let config = PromptConfig {
            templates_dir: tmp.path().to_string_lossy().to_string(),
        };
        let registry = PromptRegistry::load(&config, &["t"]).unwrap();
        let err = registry.render("t", &StdHashMap::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
