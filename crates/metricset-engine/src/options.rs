//! Typed decoding of declaration options
//!
//! Metrics and addons receive three option shapes (scalar, list and nested
//! map). Components set their defaults first and then pull the keys they
//! understand through an [`OptionBag`]. Unknown keys are ignored. A known key
//! supplied in the wrong shape, or a scalar that does not parse as the
//! requested type, is an error.

use std::collections::BTreeMap;

use metricset_common::crd::{ListOptions, MapOptions, Options};
use metricset_common::{AddonDeclaration, IntOrString, MetricDeclaration};

use crate::error::{EngineError, Result};

/// Render an option value as text; integers use their decimal form
pub fn value_text(value: &IntOrString) -> String {
    match value {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}

/// Declared options captured for metadata export
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeclaredOptions {
    pub options: Options,
    pub list_options: ListOptions,
}

/// Read-only view over one declaration's options
#[derive(Clone, Copy, Debug)]
pub struct OptionBag<'a> {
    component: &'a str,
    options: &'a Options,
    list_options: &'a ListOptions,
    map_options: &'a MapOptions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Scalar,
    List,
    Map,
}

impl Shape {
    fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

impl<'a> OptionBag<'a> {
    pub fn new(
        component: &'a str,
        options: &'a Options,
        list_options: &'a ListOptions,
        map_options: &'a MapOptions,
    ) -> Self {
        Self {
            component,
            options,
            list_options,
            map_options,
        }
    }

    pub fn for_metric(decl: &'a MetricDeclaration) -> Self {
        Self::new(
            &decl.name,
            &decl.options,
            &decl.list_options,
            &decl.map_options,
        )
    }

    pub fn for_addon(decl: &'a AddonDeclaration) -> Self {
        Self::new(
            &decl.name,
            &decl.options,
            &decl.list_options,
            &decl.map_options,
        )
    }

    /// Name of the component these options belong to
    pub fn component(&self) -> &str {
        self.component
    }

    /// Snapshot of the scalar and list options for metadata
    pub fn declared(&self) -> DeclaredOptions {
        DeclaredOptions {
            options: self.options.clone(),
            list_options: self.list_options.clone(),
        }
    }

    fn mismatch(&self, key: &str, wanted: Shape) -> Result<()> {
        let found = [
            (Shape::Scalar, self.options.contains_key(key)),
            (Shape::List, self.list_options.contains_key(key)),
            (Shape::Map, self.map_options.contains_key(key)),
        ]
        .into_iter()
        .find(|(shape, present)| *present && *shape != wanted);

        match found {
            Some((shape, _)) => Err(EngineError::option_type(
                self.component,
                key,
                format!("expected {}, found {}", wanted.as_str(), shape.as_str()),
            )),
            None => Ok(()),
        }
    }

    fn scalar(&self, key: &str) -> Result<Option<&'a IntOrString>> {
        match self.options.get(key) {
            Some(value) => Ok(Some(value)),
            None => self.mismatch(key, Shape::Scalar).map(|_| None),
        }
    }

    /// A scalar as text
    pub fn string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.scalar(key)?.map(value_text))
    }

    /// A scalar integer; decimal strings are accepted
    pub fn int(&self, key: &str) -> Result<Option<i32>> {
        match self.scalar(key)? {
            None => Ok(None),
            Some(IntOrString::Int(i)) => Ok(Some(*i)),
            Some(IntOrString::String(s)) => s.trim().parse::<i32>().map(Some).map_err(|_| {
                EngineError::option_type(self.component, key, format!("'{s}' is not an integer"))
            }),
        }
    }

    /// A boolean scalar: `true`/`yes` or `false`/`no`, case-insensitive
    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        let Some(value) = self.scalar(key)? else {
            return Ok(None);
        };
        match value_text(value).to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(Some(true)),
            "false" | "no" => Ok(Some(false)),
            other => Err(EngineError::option_type(
                self.component,
                key,
                format!("'{other}' is not a boolean (expected true, yes, false or no)"),
            )),
        }
    }

    /// A list option as text values
    pub fn list(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.list_options.get(key) {
            Some(values) => Ok(Some(values.iter().map(value_text).collect())),
            None => self.mismatch(key, Shape::List).map(|_| None),
        }
    }

    /// A nested map option as text values
    pub fn map(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        match self.map_options.get(key) {
            Some(values) => Ok(Some(
                values
                    .iter()
                    .map(|(k, v)| (k.clone(), value_text(v)))
                    .collect(),
            )),
            None => self.mismatch(key, Shape::Map).map(|_| None),
        }
    }

    /// Overwrite `target` when `key` is set
    pub fn assign_string(&self, key: &str, target: &mut String) -> Result<()> {
        if let Some(value) = self.string(key)? {
            *target = value;
        }
        Ok(())
    }

    /// Overwrite `target` when `key` is set
    pub fn assign_flag(&self, key: &str, target: &mut bool) -> Result<()> {
        if let Some(value) = self.flag(key)? {
            *target = value;
        }
        Ok(())
    }
}
