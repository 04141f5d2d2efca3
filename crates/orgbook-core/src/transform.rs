//! Value transform pipeline.
//!
//! Processor configuration names transform functions by dotted path
//! (`"string_helpers.uppercase"`). Names are resolved against a
//! [`TransformRegistry`] populated at startup; nothing is loaded dynamically.

use std::{collections::HashMap, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{credential::DecodedCredential, Error, Result};

/// The null marker the upstream wallet library writes for missing values.
///
/// Stored data already depends on this being read back as a real null, so
/// the pipeline normalises it after every field resolution.
pub const NULL_SENTINEL: &str = "None";

/// A transform step: current value in, next value out.
pub type TransformFn = fn(Option<String>) -> Option<String>;

// ─── Field specification ─────────────────────────────────────────────────────

/// Where a field's base value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
  /// `input` is used literally.
  Value,
  /// `input` names a claim on the credential.
  Claim,
}

/// How one record field is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
  pub input:     String,
  pub from:      FieldSource,
  /// Transform names applied left to right.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub processor: Option<Vec<String>>,
}

impl FieldSpec {
  pub fn claim(name: impl Into<String>) -> Self {
    Self { input: name.into(), from: FieldSource::Claim, processor: None }
  }

  pub fn value(literal: impl Into<String>) -> Self {
    Self { input: literal.into(), from: FieldSource::Value, processor: None }
  }

  pub fn with_processor<I, T>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    self.processor = Some(names.into_iter().map(Into::into).collect());
    self
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TransformRegistry {
  functions: HashMap<String, TransformFn>,
}

impl fmt::Debug for TransformRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<_> = self.functions.keys().collect();
    names.sort();
    f.debug_struct("TransformRegistry").field("functions", &names).finish()
  }
}

impl Default for TransformRegistry {
  fn default() -> Self { Self::builtin() }
}

impl TransformRegistry {
  /// A registry with no functions.
  pub fn empty() -> Self { Self { functions: HashMap::new() } }

  /// A registry with the built-in helpers.
  pub fn builtin() -> Self {
    let mut registry = Self::empty();
    registry
      .register("string_helpers.uppercase", uppercase)
      .register("string_helpers.lowercase", lowercase)
      .register("string_helpers.trim", trim)
      .register("string_helpers.title_case", title_case)
      .register("string_helpers.collapse_whitespace", collapse_whitespace)
      .register("string_helpers.null_if_empty", null_if_empty)
      .register("address_helpers.postal_code", postal_code)
      .register("date_helpers.iso_date", iso_date);
    registry
  }

  /// Add (or replace) a function under `name`.
  pub fn register(&mut self, name: impl Into<String>, function: TransformFn) -> &mut Self {
    self.functions.insert(name.into(), function);
    self
  }

  pub fn contains(&self, name: &str) -> bool { self.functions.contains_key(name) }

  pub fn get(&self, name: &str) -> Result<TransformFn> {
    self
      .functions
      .get(name)
      .copied()
      .ok_or_else(|| Error::UnknownProcessorFunction(name.to_owned()))
  }

  /// Resolve every name up front, then run `value` through them in order.
  pub fn apply(&self, names: &[String], value: Option<String>) -> Result<Option<String>> {
    let pipeline = names
      .iter()
      .map(|name| self.get(name))
      .collect::<Result<Vec<_>>>()?;
    Ok(pipeline.into_iter().fold(value, |acc, function| function(acc)))
  }

  /// Resolve one field: base value, then processor pipeline, then null-marker
  /// normalisation.
  pub fn resolve(&self, spec: &FieldSpec, credential: &DecodedCredential) -> Result<Option<String>> {
    let base = match spec.from {
      FieldSource::Value => spec.input.clone(),
      FieldSource::Claim => credential
        .get(&spec.input)
        .map_err(|_| Error::MissingSourceClaim {
          claim:     spec.input.clone(),
          available: credential.claim_attributes(),
        })?
        .to_owned(),
    };

    let value = match &spec.processor {
      Some(names) => self.apply(names, Some(base))?,
      None => Some(base),
    };

    Ok(value.filter(|v| v != NULL_SENTINEL))
  }
}

// ─── Built-in functions ──────────────────────────────────────────────────────

fn uppercase(value: Option<String>) -> Option<String> { value.map(|v| v.to_uppercase()) }

fn lowercase(value: Option<String>) -> Option<String> { value.map(|v| v.to_lowercase()) }

fn trim(value: Option<String>) -> Option<String> { value.map(|v| v.trim().to_owned()) }

fn collapse_whitespace(value: Option<String>) -> Option<String> {
  value.map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn title_case(value: Option<String>) -> Option<String> {
  value.map(|v| {
    v.split_whitespace()
      .map(|word| {
        let mut chars = word.chars();
        match chars.next() {
          Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
          None => String::new(),
        }
      })
      .collect::<Vec<String>>()
      .join(" ")
  })
}

fn null_if_empty(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

/// Canadian-style postal codes: `n2l6p3` → `N2L 6P3`. Anything that is not
/// six alphanumerics after stripping spaces is only upper-cased.
fn postal_code(value: Option<String>) -> Option<String> {
  value.map(|v| {
    let compact: String = v.split_whitespace().collect::<String>().to_uppercase();
    if compact.len() == 6 && compact.chars().all(|c| c.is_ascii_alphanumeric()) {
      format!("{} {}", &compact[..3], &compact[3..])
    } else {
      compact
    }
  })
}

/// Normalise common date spellings to `YYYY-MM-DD`; unparseable input passes
/// through untouched.
fn iso_date(value: Option<String>) -> Option<String> {
  const FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d-%b-%Y", "%B %d, %Y"];

  value.map(|v| {
    let trimmed = v.trim();
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    FORMATS
      .iter()
      .find_map(|fmt| {
        NaiveDate::parse_from_str(trimmed, fmt)
          .or_else(|_| NaiveDate::parse_from_str(date_part, fmt))
          .ok()
      })
      .map(|d| d.format("%Y-%m-%d").to_string())
      .unwrap_or(v)
  })
}
