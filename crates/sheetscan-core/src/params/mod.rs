//! Named, stringly stored algorithm configuration with typed accessors.
//!
//! A [`ParameterSet`] is loaded from one named block of a configuration
//! document. Values stay as raw strings; typed access goes through the lenient
//! [`legacy_is_numeric`] check so existing files keep their meaning.

mod document;
mod error;
mod kind;
mod numeric;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::DiagnosticSink;

#[cfg(feature = "tracing")]
use tracing::instrument;

pub use error::ParamError;
pub use kind::AlgorithmKind;
pub use numeric::{legacy_is_numeric, NumericClass};

use numeric::{parse_float_prefix, parse_int_prefix};

/// Named collection of raw configuration entries plus the declared kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    name: String,
    kind: AlgorithmKind,
    entries: BTreeMap<String, String>,
}

impl ParameterSet {
    /// Empty set with kind `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty set with a name and kind, for programmatic construction.
    pub fn with_kind(name: impl Into<String>, kind: AlgorithmKind) -> Self {
        Self {
            name: name.into(),
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Load the block called `name` from the document at `path`.
    pub fn from_file(
        path: impl AsRef<Path>,
        name: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self, ParamError> {
        let mut params = Self::new();
        params.load_file(path, name, sink)?;
        Ok(params)
    }

    /// Load the block called `name` from document text.
    pub fn from_document(
        source: &str,
        name: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self, ParamError> {
        let mut params = Self::new();
        params.load(source, name, sink)?;
        Ok(params)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }

    /// Every entry, ordered by key.
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Lenient float check; see [`legacy_is_numeric`].
    pub fn is_float(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|raw| legacy_is_numeric(raw, NumericClass::Float))
    }

    /// Lenient int check; see [`legacy_is_numeric`].
    pub fn is_int(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|raw| legacy_is_numeric(raw, NumericClass::Int))
    }

    /// Value as a float, or `0.0` with a warning when it is missing or does
    /// not pass [`is_float`](Self::is_float).
    ///
    /// A real zero and a failure look the same here; check `is_float` first
    /// when that matters.
    pub fn get_as_float(&self, key: &str, sink: &dyn DiagnosticSink) -> f32 {
        let value = self
            .is_float(key)
            .then(|| parse_float_prefix(self.get_as_str(key, sink)))
            .flatten();
        value.unwrap_or_else(|| {
            sink.warning(format!(
                "failed to retrieve parameter \"{key}\" on \"{}\" as a float",
                self.name
            ));
            0.0
        })
    }

    /// Value as an int, or `0` with a warning.
    pub fn get_as_int(&self, key: &str, sink: &dyn DiagnosticSink) -> i32 {
        let value = self
            .is_int(key)
            .then(|| parse_int_prefix(self.get_as_str(key, sink)))
            .flatten();
        value.unwrap_or_else(|| {
            sink.warning(format!(
                "failed to retrieve parameter \"{key}\" on \"{}\" as an int",
                self.name
            ));
            0
        })
    }

    /// Raw value, or `""` with a warning when the key is absent.
    pub fn get_as_str(&self, key: &str, sink: &dyn DiagnosticSink) -> &str {
        match self.entries.get(key) {
            Some(raw) => raw,
            None => {
                sink.warning(format!(
                    "attempted to retrieve nonexistent parameter \"{key}\" on \"{}\"",
                    self.name
                ));
                ""
            }
        }
    }

    /// Insert or overwrite an entry. Overwrites are reported, not refused.
    pub fn set(&mut self, key: impl Into<String>, value: impl fmt::Display, sink: &dyn DiagnosticSink) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.insert(key.clone(), value.clone()) {
            Some(previous) => sink.warning(format!(
                "overwriting parameter \"{key}\" on \"{}\": \"{previous}\" -> \"{value}\"",
                self.name
            )),
            None => sink.debug(format!("set parameter \"{key}\" to \"{value}\"")),
        }
    }

    /// Parse `source`, locate the block called `name` and merge its kind and
    /// entries into `self`.
    ///
    /// On any error `self` is left untouched. [`ParamError::NotFound`] is the
    /// non-fatal outcome (see [`ParamError::is_fatal`]).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, source, sink), fields(bytes = source.len()))
    )]
    pub fn load(
        &mut self,
        source: &str,
        name: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<(), ParamError> {
        let block = document::find_block(source, name, sink).inspect_err(|e| {
            if e.is_fatal() {
                sink.critical(e.to_string());
            } else {
                sink.warning(e.to_string());
            }
        })?;

        let Some(raw_kind) = block.kind else {
            let err = ParamError::MissingKind { name: block.name };
            sink.critical(err.to_string());
            return Err(err);
        };
        let kind = raw_kind.parse::<AlgorithmKind>().unwrap_or_else(|e| {
            sink.warning(format!("{e}; treating \"{name}\" as {}", AlgorithmKind::Unknown));
            AlgorithmKind::Unknown
        });

        self.name = block.name;
        self.kind = kind;
        for (key, value) in block.entries {
            if self.entries.insert(key.clone(), value).is_some() {
                sink.warning(format!("overwriting existing parameter \"{key}\" on \"{name}\""));
            }
        }
        sink.info(format!(
            "loaded configuration \"{name}\" ({kind}, {} parameters)",
            self.entries.len()
        ));
        Ok(())
    }

    /// [`load`](Self::load) from a file on disk.
    pub fn load_file(
        &mut self,
        path: impl AsRef<Path>,
        name: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<(), ParamError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).inspect_err(|e| {
            sink.critical(format!("failed to read \"{}\": {e}", path.display()));
        })?;
        self.load(&source, name, sink)
    }

    /// Remove every entry and forget the name and kind.
    pub fn reset(&mut self) {
        self.name.clear();
        self.kind = AlgorithmKind::Unknown;
        self.entries.clear();
    }

    /// Names of every block in a configuration document.
    pub fn filter_names(source: &str, sink: &dyn DiagnosticSink) -> Result<Vec<String>, ParamError> {
        document::block_names(source, sink).inspect_err(|e| sink.critical(e.to_string()))
    }

    /// [`filter_names`](Self::filter_names) for a file on disk.
    pub fn filter_names_in_file(
        path: impl AsRef<Path>,
        sink: &dyn DiagnosticSink,
    ) -> Result<Vec<String>, ParamError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).inspect_err(|e| {
            sink.critical(format!("failed to read \"{}\": {e}", path.display()));
        })?;
        Self::filter_names(&source, sink)
    }

    // Validated access. Each helper reports the failure it detects as a
    // critical diagnostic before returning it.

    /// Required float: missing key, failed lenient check or unparsable
    /// prefix are errors.
    pub fn require_float(&self, key: &str, sink: &dyn DiagnosticSink) -> Result<f32, ParamError> {
        match self.optional_float(key, sink)? {
            Some(value) => Ok(value),
            None => Err(self.report(
                sink,
                ParamError::MissingParameter {
                    config: self.name.clone(),
                    key: key.to_string(),
                },
            )),
        }
    }

    /// Optional float: `Ok(None)` when the key is absent.
    pub fn optional_float(
        &self,
        key: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<Option<f32>, ParamError> {
        let Some(raw) = self.entries.get(key) else {
            return Ok(None);
        };
        let parsed = legacy_is_numeric(raw, NumericClass::Float)
            .then(|| parse_float_prefix(raw))
            .flatten();
        match parsed {
            Some(value) => {
                sink.debug(format!("{key} set to {value}"));
                Ok(Some(value))
            }
            None => Err(self.report(
                sink,
                ParamError::InvalidType {
                    config: self.name.clone(),
                    key: key.to_string(),
                    value: raw.clone(),
                    expected: "a number",
                },
            )),
        }
    }

    /// Required float that must be `>= 0`.
    pub fn require_non_negative(
        &self,
        key: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<f32, ParamError> {
        let value = self.require_float(key, sink)?;
        self.check_non_negative(key, value, sink)
    }

    /// Optional float that must be `>= 0` when present.
    pub fn optional_non_negative(
        &self,
        key: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<Option<f32>, ParamError> {
        self.optional_float(key, sink)?
            .map(|value| self.check_non_negative(key, value, sink))
            .transpose()
    }

    /// Optional int: `Ok(None)` when the key is absent.
    pub fn optional_int(
        &self,
        key: &str,
        sink: &dyn DiagnosticSink,
    ) -> Result<Option<i32>, ParamError> {
        let Some(raw) = self.entries.get(key) else {
            return Ok(None);
        };
        let parsed = legacy_is_numeric(raw, NumericClass::Int)
            .then(|| parse_int_prefix(raw))
            .flatten();
        match parsed {
            Some(value) => {
                sink.debug(format!("{key} set to {value}"));
                Ok(Some(value))
            }
            None => Err(self.report(
                sink,
                ParamError::InvalidType {
                    config: self.name.clone(),
                    key: key.to_string(),
                    value: raw.clone(),
                    expected: "an integer",
                },
            )),
        }
    }

    fn check_non_negative(
        &self,
        key: &str,
        value: f32,
        sink: &dyn DiagnosticSink,
    ) -> Result<f32, ParamError> {
        if value < 0.0 {
            return Err(self.report(
                sink,
                ParamError::InvalidRange {
                    config: self.name.clone(),
                    key: key.to_string(),
                    value: value as f64,
                    expected: "a non-negative number",
                },
            ));
        }
        Ok(value)
    }

    #[track_caller]
    fn report(&self, sink: &dyn DiagnosticSink, err: ParamError) -> ParamError {
        sink.critical(err.to_string());
        err
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Detection Algorithm Configuration \"{}\" ({})",
            self.name, self.kind
        )?;
        for (key, value) in &self.entries {
            writeln!(f, "    {key}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectingSink, Severity};

    const DOC: &str = r#"<?xml version="1.0"?>
        <filter-params>
          <filter name="Basic Threshold-Fraction Filter" type="THRESH_FRAC">
            <channel>1</channel>
            <preblur>5</preblur>
            <threshold>50</threshold>
            <fraction>0.5</fraction>
            <odd>1.2.3</odd>
          </filter>
          <filter name="untyped"><threshold>3</threshold></filter>
          <filter name="mystery" type="THRESH_SOMETHING"/>
        </filter-params>"#;

    fn basic() -> ParameterSet {
        ParameterSet::from_document(DOC, "Basic Threshold-Fraction Filter", &CollectingSink::new())
            .unwrap()
    }

    #[test]
    fn load_reads_kind_and_entries() {
        let params = basic();
        assert_eq!(params.name(), "Basic Threshold-Fraction Filter");
        assert_eq!(params.kind(), AlgorithmKind::ThresholdFraction);
        assert_eq!(params.entries().len(), 5);
        assert!(params.has("preblur"));
        assert!(!params.has("invert"));
    }

    #[test]
    fn missing_block_is_non_fatal_not_found() {
        let sink = CollectingSink::new();
        let mut params = ParameterSet::new();
        let err = params.load(DOC, "nope", &sink).unwrap_err();
        assert!(matches!(err, ParamError::NotFound { .. }));
        assert!(!err.is_fatal());
        assert_eq!(params, ParameterSet::new());
    }

    #[test]
    fn block_without_kind_fails() {
        let err = ParameterSet::from_document(DOC, "untyped", &CollectingSink::new()).unwrap_err();
        assert!(matches!(err, ParamError::MissingKind { ref name } if name == "untyped"));
        assert!(err.is_fatal());
    }

    #[test]
    fn unrecognized_kind_loads_as_unknown() {
        let sink = CollectingSink::new();
        let params = ParameterSet::from_document(DOC, "mystery", &sink).unwrap();
        assert_eq!(params.kind(), AlgorithmKind::Unknown);
        assert_eq!(sink.count_at_least(Severity::Warning), 1);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err =
            ParameterSet::from_document("<filter-params>", "x", &CollectingSink::new()).unwrap_err();
        assert!(matches!(err, ParamError::Parse { .. }));
    }

    #[test]
    fn typed_getters_use_lenient_checks() {
        let sink = CollectingSink::new();
        let params = basic();
        assert!(params.is_int("channel"));
        assert_eq!(params.get_as_int("channel", &sink), 1);
        assert!(params.is_float("fraction"));
        assert!(!params.is_int("fraction"));
        assert_eq!(params.get_as_float("fraction", &sink), 0.5);
        assert!(params.is_float("odd"));
        assert_eq!(params.get_as_float("odd", &sink), 1.2);
        assert_eq!(sink.count_at_least(Severity::Warning), 0);
    }

    #[test]
    fn missing_key_reads_as_zero_with_warning() {
        let sink = CollectingSink::new();
        let params = basic();
        assert_eq!(params.get_as_float("absent", &sink), 0.0);
        assert_eq!(params.get_as_int("absent", &sink), 0);
        assert_eq!(params.get_as_str("absent", &sink), "");
        assert!(sink.count_at_least(Severity::Warning) >= 3);
        assert_eq!(sink.count_at_least(Severity::Critical), 0);
    }

    #[test]
    fn set_upserts_and_reports_overwrites() {
        let sink = CollectingSink::new();
        let mut params = basic();
        params.set("fraction", 0.75_f32, &sink);
        params.set("invert", "", &sink);
        assert_eq!(params.get_as_float("fraction", &sink), 0.75);
        assert!(params.has("invert"));
        assert_eq!(sink.count_at_least(Severity::Warning), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut params = basic();
        params.reset();
        assert_eq!(params, ParameterSet::new());
    }

    #[test]
    fn validated_access_distinguishes_failures() {
        let sink = CollectingSink::new();
        let mut params = ParameterSet::with_kind("v", AlgorithmKind::ContourAlignment);
        params.set("neg", "-1", &sink);
        params.set("word", "abc", &sink);
        params.set("ok", "2.5", &sink);

        assert_eq!(params.require_non_negative("ok", &sink).unwrap(), 2.5);
        assert!(matches!(
            params.require_float("gone", &sink),
            Err(ParamError::MissingParameter { .. })
        ));
        assert!(matches!(
            params.require_float("word", &sink),
            Err(ParamError::InvalidType { .. })
        ));
        assert!(matches!(
            params.require_non_negative("neg", &sink),
            Err(ParamError::InvalidRange { .. })
        ));
        assert_eq!(params.optional_non_negative("gone", &sink).unwrap(), None);
        assert_eq!(sink.count_at_least(Severity::Critical), 3);
    }

    #[test]
    fn display_matches_legacy_dump() {
        let sink = CollectingSink::new();
        let mut params = ParameterSet::with_kind("dump", AlgorithmKind::HoughCircles);
        params.set("b", 2, &sink);
        params.set("a", "x", &sink);
        assert_eq!(
            params.to_string(),
            "Detection Algorithm Configuration \"dump\" (THRESH_HCIRCLES)\n    a: x\n    b: 2\n"
        );
    }

    #[test]
    fn lists_filter_names() {
        let names = ParameterSet::filter_names(DOC, &CollectingSink::new()).unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], "Basic Threshold-Fraction Filter");
    }
}
