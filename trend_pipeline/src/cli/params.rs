use std::{fs, io::Read};

use anyhow::{Context, Result, anyhow, bail};

use super::commands::ListSource;

/// Splits a comma-separated argument, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads the matrix instrument list from wherever `source` points.
pub fn read_instruments(
    source: ListSource,
    instruments: Option<&str>,
    input: Option<&str>,
) -> Result<Vec<String>> {
    let list = match source {
        ListSource::Args => {
            let raw = instruments.ok_or_else(|| anyhow!("--instruments required for source=args"))?;
            parse_list(raw)
        }
        ListSource::File => {
            let path = input.ok_or_else(|| anyhow!("--input path required for source=file"))?;
            let content =
                fs::read_to_string(path).with_context(|| format!("reading instrument list {path}"))?;
            parse_json_list(&content)?
        }
        ListSource::Stdin => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            parse_json_list(&buffer)?
        }
        ListSource::Json => {
            let raw = input.ok_or_else(|| anyhow!("--input JSON required for source=json"))?;
            parse_json_list(raw)?
        }
    };
    if list.is_empty() {
        bail!("instrument list is empty");
    }
    Ok(list)
}

fn parse_json_list(raw: &str) -> Result<Vec<String>> {
    let items: Vec<String> =
        serde_json::from_str(raw).context("instrument list must be a JSON array of strings")?;
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
