//! Build state and string templating.
//!
//! A [`BuildState`] maps names to strings, string lists or nested maps. Phase
//! handlers receive the whole state and hand back a partial update which the
//! pipeline merges over it; keys are never removed.
//!
//! Configuration strings reference state keys with `{name}` placeholders and
//! are rendered with [`render`] right before a command is spawned. `{{` and
//! `}}` produce literal braces. A placeholder naming a missing key fails with
//! [`BuildError::Template`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Prefix under which a toolchain's parent state is visible.
pub const PARENT_PREFIX: &str = "parent_";

/// One state value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Str(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl StateValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Str(s) => write!(f, "{s}"),
            StateValue::List(items) => write!(f, "{}", items.join(" ")),
            StateValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Str(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Str(value.to_string())
    }
}

impl From<&Path> for StateValue {
    fn from(value: &Path) -> Self {
        StateValue::Str(value.display().to_string())
    }
}

impl From<PathBuf> for StateValue {
    fn from(value: PathBuf) -> Self {
        StateValue::Str(value.display().to_string())
    }
}

impl From<Vec<String>> for StateValue {
    fn from(value: Vec<String>) -> Self {
        StateValue::List(value)
    }
}

impl From<BTreeMap<String, String>> for StateValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        StateValue::Map(value)
    }
}

/// Partial update returned by a phase handler.
pub type StateUpdate = BTreeMap<String, StateValue>;

/// Build an update from `(key, value)` pairs.
pub fn update<I, K, V>(pairs: I) -> StateUpdate
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<StateValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// The evolving key/value build state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildState {
    values: BTreeMap<String, StateValue>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateValue)> {
        self.values.iter()
    }

    /// String value of `key`, or a configuration error naming the key.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.values.get(key) {
            Some(StateValue::Str(s)) => Ok(s),
            Some(_) => Err(BuildError::Configuration(format!(
                "state key '{key}' is not a string"
            ))
            .into()),
            None => Err(BuildError::Configuration(format!("state key '{key}' is not set")).into()),
        }
    }

    /// Path value of `key`.
    pub fn require_path(&self, key: &str) -> Result<PathBuf> {
        self.require_str(key).map(PathBuf::from)
    }

    /// Merge an update over this state; keys from the update win.
    pub fn merge(&mut self, update: StateUpdate) {
        self.values.extend(update);
    }

    /// Copy every key of `other` in under `prefix` (`prefix_dir` becomes
    /// `parent_prefix_dir`).
    pub fn nest(&mut self, prefix: &str, other: &BuildState) {
        for (key, value) in &other.values {
            self.values.insert(format!("{prefix}{key}"), value.clone());
        }
    }

    /// Render `template` against this state.
    pub fn render(&self, template: &str) -> Result<String> {
        render(template, self)
    }
}

impl FromIterator<(String, StateValue)> for BuildState {
    fn from_iter<T: IntoIterator<Item = (String, StateValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Substitute `{name}` placeholders in `template` with values from `state`.
///
/// Lists render space-separated. Maps cannot be substituted.
pub fn render(template: &str, state: &BuildState) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = &template[idx + 1..];
                let Some(end) = rest.find('}') else {
                    return Err(BuildError::Configuration(format!(
                        "unterminated placeholder in template '{template}'"
                    ))
                    .into());
                };
                let key = &rest[..end];
                let value = state.get(key).ok_or_else(|| BuildError::Template {
                    key: key.to_string(),
                    template: template.to_string(),
                })?;
                if let StateValue::Map(_) = value {
                    return Err(BuildError::Configuration(format!(
                        "state key '{key}' is a map and cannot be rendered into '{template}'"
                    ))
                    .into());
                }
                out.push_str(&value.to_string());
                let close = idx + 1 + end;
                while chars.next_if(|(i, _)| *i <= close).is_some() {}
            }
            '}' => {
                return Err(BuildError::Configuration(format!(
                    "unmatched '}}' in template '{template}'"
                ))
                .into());
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Render every value of an environment map.
pub fn render_env(
    env: &BTreeMap<String, String>,
    state: &BuildState,
) -> Result<BTreeMap<String, String>> {
    env.iter()
        .map(|(k, v)| Ok((k.clone(), render(v, state)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildState {
        let mut state = BuildState::new();
        state.set("prefix_dir", "/opt/tc/x86_64");
        state.set("target_triple", "x86_64-linux-musl");
        state.set("c_flags", vec!["-O2".to_string(), "-fPIC".to_string()]);
        state
    }

    #[test]
    fn renders_strings_and_lists() {
        let state = sample();
        assert_eq!(
            render("--prefix={prefix_dir}", &state).unwrap(),
            "--prefix=/opt/tc/x86_64"
        );
        assert_eq!(render("CFLAGS={c_flags}", &state).unwrap(), "CFLAGS=-O2 -fPIC");
        assert_eq!(
            render("{target_triple}-gcc", &state).unwrap(),
            "x86_64-linux-musl-gcc"
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        let state = sample();
        assert_eq!(
            render("awk '{{print $1}}' {prefix_dir}", &state).unwrap(),
            "awk '{print $1}' /opt/tc/x86_64"
        );
    }

    #[test]
    fn missing_key_is_template_error() {
        let err = render("{parent_prefix_dir}/bin", &sample()).unwrap_err();
        assert!(matches!(
            BuildError::find(&err),
            Some(BuildError::Template { key, .. }) if key == "parent_prefix_dir"
        ));
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        assert!(render("{prefix_dir", &sample()).is_err());
        assert!(render("prefix}", &sample()).is_err());
    }

    #[test]
    fn merge_overwrites_and_keeps() {
        let mut state = sample();
        state.merge(update([("prefix_dir", "/new"), ("source", "/src/zlib")]));

        assert_eq!(state.require_str("prefix_dir").unwrap(), "/new");
        assert_eq!(state.require_str("source").unwrap(), "/src/zlib");
        assert!(state.contains("target_triple"));
    }

    #[test]
    fn nest_prefixes_every_key() {
        let parent = sample();
        let mut child = BuildState::new();
        child.set("prefix_dir", "/opt/tc/child");
        child.nest(PARENT_PREFIX, &parent);

        assert_eq!(
            child.require_str("parent_prefix_dir").unwrap(),
            "/opt/tc/x86_64"
        );
        assert_eq!(child.require_str("prefix_dir").unwrap(), "/opt/tc/child");
        assert_eq!(
            render("{parent_c_flags}", &child).unwrap(),
            "-O2 -fPIC"
        );
    }
}
