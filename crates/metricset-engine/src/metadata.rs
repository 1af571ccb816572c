//! Metadata lines and sentinels embedded in entrypoint scripts
//!
//! Log processors locate run phases and metadata by plain string search, so
//! these strings are a versioned output format:
//!
//! ```text
//! METADATA START {"pods":2,"completions":2,"metricName":"app-lammps",...}
//! METADATA END
//! ```
//!
//! Addon metadata uses the `ADDON METADATA START` / `ADDON METADATA END`
//! pair with the same JSON document.

use std::collections::BTreeMap;

use serde::Serialize;

use metricset_common::crd::{ListOptions, Options};

use crate::error::{EngineError, Result};

/// Marks a timepoint between repeated measurements
pub const SEPARATOR: &str = "METRICS OPERATOR TIMEPOINT";

/// Marks the end of setup, right before the measured command
pub const COLLECTION_START: &str = "METRICS OPERATOR COLLECTION START";

/// Marks the end of the measured command, before any cleanup
pub const COLLECTION_END: &str = "METRICS OPERATOR COLLECTION END";

/// Blocking directive that keeps a container alive
pub const HOLD_OPEN: &str = "sleep infinity";

const METRIC_START: &str = "METADATA START";
const METRIC_END: &str = "METADATA END";
const ADDON_START: &str = "ADDON METADATA START";
const ADDON_END: &str = "ADDON METADATA END";

/// Flattened metadata document written at the top of each entrypoint
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricExport {
    pub pods: i32,
    pub completions: i32,

    /// Directory a storage metric measures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_volume_path: Option<String>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub metric_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub metric_description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub metric_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metric_options: Options,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metric_list_options: ListOptions,
}

/// Escape text for the inside of a double-quoted shell string
///
/// Only `\`, `"`, `$` and `` ` `` are special there; everything else,
/// single quotes included, is printed as is.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn bracket(export: &MetricExport, start: &str, end: &str) -> Result<String> {
    let json = serde_json::to_string(export).map_err(|source| EngineError::Metadata {
        component: export.metric_name.clone(),
        source,
    })?;
    Ok(format!("{start} {}\n{end}", escape(&json)))
}

/// Metadata block for a metric
pub fn metric_metadata(export: &MetricExport) -> Result<String> {
    bracket(export, METRIC_START, METRIC_END)
}

/// Metadata block for an addon
pub fn addon_metadata(export: &MetricExport) -> Result<String> {
    bracket(export, ADDON_START, ADDON_END)
}

/// The hold-open directive when interactive, otherwise empty
pub fn interactive(enabled: bool) -> &'static str {
    if enabled {
        HOLD_OPEN
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricset_common::IntOrString;
    use rstest::rstest;

    /// What bash prints for the inside of `echo "..."`
    fn echoed(quoted: &str) -> std::result::Result<String, String> {
        let mut out = String::new();
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(next @ ('\\' | '"' | '$' | '`')) => out.push(next),
                    Some('\n') => {}
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '"' | '$' | '`' => return Err(format!("unescaped {c} in {quoted}")),
                other => out.push(other),
            }
        }
        Ok(out)
    }

    #[test]
    fn escapes_double_quote_specials_only() {
        assert_eq!(escape(r#"{"a":"it's"}"#), r#"{\"a\":\"it's\"}"#);
        assert_eq!(escape(r"$(x) `y` \z"), r"\$(x) \`y\` \\z");
    }

    #[rstest]
    #[case::substitution("prefix", "$(echo INJECTED)")]
    #[case::backticks("prefix", "`id`")]
    #[case::embedded_quotes("preBlock", r#"echo "hello world""#)]
    #[case::apostrophe("preBlock", "the metric's run")]
    #[case::backslash("preBlock", r"C:\path\to")]
    #[case::newline("preBlock", "echo one\necho two")]
    #[case::variable("preBlock", "echo $HOME ${PATH}")]
    fn echoed_metadata_parses_back(#[case] key: &str, #[case] value: &str) {
        let export = MetricExport {
            metric_name: "commands".to_string(),
            metric_description: "customize a metric's entrypoint".to_string(),
            metric_options: Options::from([(
                key.to_string(),
                IntOrString::String(value.to_string()),
            )]),
            ..Default::default()
        };
        let block = addon_metadata(&export).unwrap();
        let printed = echoed(&block).unwrap();
        let (first, rest) = printed.split_once('\n').unwrap();
        assert_eq!(rest, ADDON_END);

        let json = first.strip_prefix("ADDON METADATA START ").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["metricOptions"][key], value);
        assert_eq!(parsed["metricDescription"], "customize a metric's entrypoint");
    }

    #[test]
    fn metric_block_is_bracketed_and_escaped() {
        let export = MetricExport {
            pods: 2,
            completions: 2,
            metric_name: "app-lammps".to_string(),
            metric_options: Options::from([(
                "command".to_string(),
                IntOrString::String("lmp".to_string()),
            )]),
            ..Default::default()
        };
        let block = metric_metadata(&export).unwrap();
        assert_eq!(
            block,
            "METADATA START {\\\"pods\\\":2,\\\"completions\\\":2,\\\"metricName\\\":\\\"app-lammps\\\",\\\"metricOptions\\\":{\\\"command\\\":\\\"lmp\\\"}}\nMETADATA END"
        );
    }

    #[test]
    fn addon_block_keeps_pods_and_completions() {
        let export = MetricExport {
            metric_name: "commands".to_string(),
            ..Default::default()
        };
        let block = addon_metadata(&export).unwrap();
        assert!(block.starts_with("ADDON METADATA START {\\\"pods\\\":0,\\\"completions\\\":0"));
        assert!(block.ends_with("\nADDON METADATA END"));
    }

    #[test]
    fn interactive_directive() {
        assert_eq!(interactive(true), "sleep infinity");
        assert_eq!(interactive(false), "");
    }
}
