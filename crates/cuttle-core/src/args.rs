//! Connection arguments forwarded verbatim to a driver's `connect`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Keyword arguments for a driver connector (`host`, `user`, `database`, ...)
///
/// Keys are kept sorted so that the arguments a pool connects with are
/// deterministic when logged or compared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionArgs(BTreeMap<String, serde_json::Value>);

impl ConnectionArgs {
    /// Create an empty argument set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set an argument, returning the previous value if any
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Get an argument
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Get an argument as a string, if it is one
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    /// Check whether an argument is set
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overlay `overrides` on top of these arguments; override keys win
    pub fn merge(&mut self, overrides: &ConnectionArgs) {
        for (key, value) in &overrides.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Return a copy of these arguments with `overrides` applied
    pub fn merged(&self, overrides: &ConnectionArgs) -> Self {
        let mut merged = self.clone();
        merged.merge(overrides);
        merged
    }

    /// Iterate over the arguments in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Argument names in key order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ConnectionArgs
where
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_override_keys_win() {
        let mut args = ConnectionArgs::new()
            .with("database", "rons_house")
            .with("user", "ron");
        let overrides = ConnectionArgs::new().with("database", "steakhouse");

        args.merge(&overrides);

        assert_eq!(args.get_str("database"), Some("steakhouse"));
        assert_eq!(args.get_str("user"), Some("ron"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_merged_leaves_original_untouched() {
        let args = ConnectionArgs::new().with("host", "a");
        let merged = args.merged(&ConnectionArgs::new().with("host", "b").with("port", 5432));

        assert_eq!(args.get_str("host"), Some("a"));
        assert_eq!(merged.get_str("host"), Some("b"));
        assert_eq!(merged.get("port"), Some(&serde_json::json!(5432)));
    }

    #[test]
    fn test_args_serialize_as_plain_map() {
        let args: ConnectionArgs = [("user", "paul"), ("host", "england")].into_iter().collect();
        let json = serde_json::to_string(&args).expect("serialize");
        assert_eq!(json, r#"{"host":"england","user":"paul"}"#);

        let back: ConnectionArgs = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, args);
    }
}
