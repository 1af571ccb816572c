//! CLI commands

use clap::ValueEnum;
use serde::Serialize;

use crate::Result;

pub mod compose;
pub mod crd;
pub mod list;

/// Output format for structured documents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML (default)
    #[default]
    Yaml,
    /// JSON
    Json,
}

impl OutputFormat {
    /// Serialize `value` in this format
    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        Ok(match self {
            Self::Yaml => serde_yaml::to_string(value)?,
            Self::Json => serde_json::to_string_pretty(value)? + "\n",
        })
    }
}

/// Print rows as a column-aligned table with headers.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", format_table(headers, rows));
}

fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        padded.join("  ").trim_end().to_string() + "\n"
    };

    let mut out = line(headers.to_vec());
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn table_columns_align() {
        let rows = vec![
            vec!["app-lammps".to_string(), "simulation".to_string()],
            vec!["io-fio".to_string(), "storage".to_string()],
        ];
        let table = format_table(&["NAME", "FAMILY"], &rows);
        assert_eq!(
            table,
            "NAME        FAMILY\napp-lammps  simulation\nio-fio      storage\n"
        );
    }

    #[test]
    fn json_output_ends_with_newline() {
        let value = BTreeMap::from([("pods", 2)]);
        assert_eq!(
            OutputFormat::Json.render(&value).unwrap(),
            "{\n  \"pods\": 2\n}\n"
        );
        assert_eq!(OutputFormat::Yaml.render(&value).unwrap(), "pods: 2\n");
    }
}
