//! YAML loader resolving `!include`, `!secret` and `!env_var`

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const SECRETS_FILE: &str = "secrets.yaml";

/// Loader bound to a configuration directory
pub struct YamlLoader {
    config_dir: PathBuf,
    /// `secrets.yaml`, read on first `!secret`
    secrets: Option<Mapping>,
    /// Files currently being loaded, innermost last
    include_stack: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets: None,
            include_stack: Vec::new(),
        }
    }

    /// Load a file, relative paths resolve against the config directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.include_stack.push(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.pop();
        result
    }

    /// Parse YAML text; `source` names it in errors and anchors `!include`
    pub fn load_string(&mut self, content: &str, source: &Path) -> ConfigResult<Value> {
        let value: Value =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
                path: source.to_path_buf(),
                source: e,
            })?;
        self.resolve(value, source)
    }

    fn resolve(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(k, self.resolve(v, source)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.resolve(v, source))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Resolving tag {}", tag);

        match tag.as_str() {
            "!include" => {
                let target = tag_argument(&tag, &tagged.value)?;
                let base = source.parent().unwrap_or(&self.config_dir).to_path_buf();
                self.load_file(base.join(target))
            }
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?.to_string();
                self.secret(&key)
            }
            "!env_var" => {
                let arg = tag_argument(&tag, &tagged.value)?;
                let (var, default) = match arg.split_once(char::is_whitespace) {
                    Some((var, default)) => (var, Some(default.trim())),
                    None => (arg, None),
                };
                match (std::env::var(var), default) {
                    (Ok(value), _) => Ok(Value::String(value)),
                    (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
                    (Err(_), None) => Err(ConfigError::EnvVarNotFound {
                        var: var.to_string(),
                    }),
                }
            }
            _ => {
                let value = self.resolve(tagged.value, source)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    fn secret(&mut self, key: &str) -> ConfigResult<Value> {
        if self.secrets.is_none() {
            self.secrets = Some(self.read_secrets()?);
        }
        self.secrets
            .as_ref()
            .and_then(|s| s.get(key))
            .cloned()
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    fn read_secrets(&self) -> ConfigResult<Mapping> {
        let path = self.config_dir.join(SECRETS_FILE);
        if !path.exists() {
            debug!("No {} in {:?}", SECRETS_FILE, self.config_dir);
            return Ok(Mapping::new());
        }
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::ParseYaml { path, source })
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| ConfigError::InvalidTagArgument {
        tag: tag.to_string(),
    })
}

/// Load `file` from `config_dir` with all tags resolved
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir).load_file(file)
}

/// Load YAML text as if it were a file inside `config_dir`
pub fn load_yaml_string(config_dir: impl Into<PathBuf>, content: &str) -> ConfigResult<Value> {
    let config_dir = config_dir.into();
    let source = config_dir.join("<string>");
    let mut loader = YamlLoader::new(config_dir);
    loader.load_string(content, &source)
}
