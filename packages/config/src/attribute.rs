//! Explicit attribute-name resolution.
//!
//! Upstream datasets spell the same column many ways (`SIGLA_UF`,
//! `sigla`, `UF`...). Instead of scanning columns ad hoc at each use, every
//! attribute the pipeline reads is described by an [`AttributeSelector`]
//! and resolved once per dataset load.

use serde::{Deserialize, Serialize};

/// A configured attribute name with an ordered fallback list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSelector {
    /// Preferred attribute name.
    pub name: String,
    /// Names tried, in order, when `name` is absent.
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Constant value used for every feature when no candidate matches.
    #[serde(default)]
    pub default: Option<String>,
}

/// Outcome of resolving an [`AttributeSelector`] against a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAttribute {
    /// Read values from this property key (exact spelling in the data).
    Column(String),
    /// No column matched; use this constant for every feature.
    Constant(String),
}

/// No candidate matched and no default was configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{dataset}: none of the attributes [{}] is present (available: [{}])", .candidates.join(", "), .available.join(", "))]
pub struct AttributeError {
    /// Dataset label used in the message.
    pub dataset: String,
    /// Names that were searched.
    pub candidates: Vec<String>,
    /// Names the dataset actually has.
    pub available: Vec<String>,
}

impl AttributeSelector {
    /// A selector for `name` with no fallbacks and no default.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fallbacks: Vec::new(),
            default: None,
        }
    }

    /// A selector for `name` followed by `fallbacks`.
    #[must_use]
    pub fn with_fallbacks(name: &str, fallbacks: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fallbacks: fallbacks.iter().map(|s| (*s).to_string()).collect(),
            default: None,
        }
    }

    /// Names searched, preferred first.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }

    /// Returns the first available key matching a candidate,
    /// case-insensitively, with the dataset's own spelling.
    #[must_use]
    pub fn find<'a, I>(&self, available: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available: Vec<&str> = available.into_iter().collect();
        self.candidates().find_map(|candidate| {
            available
                .iter()
                .find(|key| key.trim().eq_ignore_ascii_case(candidate.trim()))
                .map(|key| (*key).to_string())
        })
    }

    /// Resolves the selector for a required attribute.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError`] if no candidate matches and no default
    /// is configured.
    pub fn resolve<'a, I>(&self, dataset: &str, available: I) -> Result<ResolvedAttribute, AttributeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available: Vec<&str> = available.into_iter().collect();
        if let Some(key) = self.find(available.iter().copied()) {
            return Ok(ResolvedAttribute::Column(key));
        }
        if let Some(default) = &self.default {
            log::warn!(
                "{dataset}: attribute '{}' not found, using default value '{default}'",
                self.name
            );
            return Ok(ResolvedAttribute::Constant(default.clone()));
        }
        Err(AttributeError {
            dataset: dataset.to_string(),
            candidates: self.candidates().map(str::to_string).collect(),
            available: available.iter().map(|s| (*s).to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_preferred_name_case_insensitively() {
        let sel = AttributeSelector::with_fallbacks("year", &["ano"]);
        assert_eq!(sel.find(["YEAR", "ano"]), Some("YEAR".to_string()));
    }

    #[test]
    fn falls_back_in_order() {
        let sel = AttributeSelector::with_fallbacks("SIGLA_UF", &["SIGLA", "UF"]);
        assert_eq!(sel.find(["uf", "sigla"]), Some("sigla".to_string()));
    }

    #[test]
    fn resolve_uses_default_constant() {
        let mut sel = AttributeSelector::named("year");
        sel.default = Some("2020".to_string());
        assert_eq!(
            sel.resolve("prodes", ["main_class"]).unwrap(),
            ResolvedAttribute::Constant("2020".to_string())
        );
    }

    #[test]
    fn resolve_fails_without_default() {
        let sel = AttributeSelector::with_fallbacks("year", &["ano"]);
        let err = sel.resolve("prodes", ["main_class", "uuid"]).unwrap_err();
        assert_eq!(err.candidates, vec!["year", "ano"]);
        let msg = err.to_string();
        assert!(msg.contains("prodes"));
        assert!(msg.contains("main_class"));
    }

    #[test]
    fn deserializes_with_optional_fields() {
        let sel: AttributeSelector = toml::from_str("name = \"fclass\"").unwrap();
        assert_eq!(sel, AttributeSelector::named("fclass"));
    }
}
