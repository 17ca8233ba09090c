use crate::settings::error::SettingsError;
use std::{collections::HashMap, fs, path::Path, str::FromStr};
use tracing::debug;

/// Environment variables from the process, optionally overlaid with a
/// `.env` file.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Loads variables from a `.env` file. File values win over process
    /// values.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SettingsError::EnvFile(format!("failed to read {}: {e}", path.display()))
        })?;

        self.parse_env_content(&content)?;
        debug!(path = %path.display(), "Loaded environment file");
        Ok(())
    }

    /// Loads `.env` from the working directory when present.
    pub fn load_default_file(&mut self) -> Result<bool, SettingsError> {
        let path = Path::new(".env");
        if !path.is_file() {
            return Ok(false);
        }
        self.load_from_file(path)?;
        Ok(true)
    }

    /// Non-empty value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parses `key`, falling back to `default` when unset.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, SettingsError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| {
                SettingsError::InvalidConfig(format!("{key}={raw}: {e}"))
            }),
        }
    }

    pub fn flag(&self, key: &str) -> Result<bool, SettingsError> {
        match self.get(key).map(str::to_lowercase).as_deref() {
            None => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(SettingsError::InvalidConfig(format!(
                "{key}={other}: expected a boolean"
            ))),
        }
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), SettingsError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(SettingsError::EnvFile(format!(
                    "malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(SettingsError::EnvFile(format!(
                    "empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }

        // Unquoted values may carry a trailing comment.
        match value.find(" #") {
            Some(pos) => value[..pos].trim_end().to_string(),
            None => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_basic_and_quoted_values() {
        let mut env = EnvManager::default();
        let content = r#"
# Comment
CHUNK_SIZE=5000
export OUTPUT_FORMAT=jsonl
QUOTED="value with spaces"
SINGLE='single # quoted'
TRAILING=snappy # codec
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.get("CHUNK_SIZE"), Some("5000"));
        assert_eq!(env.get("OUTPUT_FORMAT"), Some("jsonl"));
        assert_eq!(env.get("QUOTED"), Some("value with spaces"));
        assert_eq!(env.get("SINGLE"), Some("single # quoted"));
        assert_eq!(env.get("TRAILING"), Some("snappy"));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let mut env = EnvManager::default();
        assert!(env.parse_env_content("INVALID LINE WITHOUT EQUALS").is_err());
        assert!(env.parse_env_content("=value").is_err());
    }

    #[test]
    fn file_values_override_existing_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MAX_WORKERS=8").unwrap();

        let mut env = EnvManager::from_vars([("MAX_WORKERS", "2"), ("CHUNK_SIZE", "10")]);
        env.load_from_file(file.path()).unwrap();
        assert_eq!(env.parse_or("MAX_WORKERS", 4usize).unwrap(), 8);
        assert_eq!(env.parse_or("CHUNK_SIZE", 1i64).unwrap(), 10);
    }

    #[test]
    fn typed_access() {
        let env = EnvManager::from_vars([("N", "abc"), ("EMPTY", "  "), ("ON", "Yes")]);
        assert!(matches!(
            env.parse_or("N", 1u32),
            Err(SettingsError::InvalidConfig(_))
        ));
        assert_eq!(env.parse_or("EMPTY", 7u32).unwrap(), 7);
        assert!(env.flag("ON").unwrap());
        assert!(!env.flag("MISSING").unwrap());
        assert_eq!(env.get_or("MISSING", "dflt"), "dflt");
    }
}
