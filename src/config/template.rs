//! Run stamps and `{var}` placeholder substitution for config paths

use crate::error::{PipelineError, Result};
use std::collections::BTreeMap;

/// Format used for run stamps, e.g. `20251007_141230`
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Template variables keyed by placeholder name
pub type Vars = BTreeMap<String, String>;

/// Current local time as a run stamp
pub fn stamp() -> String {
    chrono::Local::now().format(STAMP_FORMAT).to_string()
}

/// Replace every `{key}` in `template` with its value.
///
/// Placeholders without a matching variable are left as-is so a later
/// pass (or the user) can spot them.
pub fn fill_vars(template: &str, vars: &Vars) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Parse `key=value` overrides as given on the command line
pub fn parse_vars<S: AsRef<str>>(items: &[S]) -> Result<Vars> {
    items
        .iter()
        .map(|item| {
            let item = item.as_ref();
            item.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    PipelineError::config(format!("Invalid var '{}', expected key=value", item))
                })
        })
        .collect()
}

/// Build the variable set for one stage: the run stamp plus overrides.
/// Explicit overrides win over the stamp.
pub fn stage_vars(timestamp: &str, overrides: &Vars) -> Vars {
    let mut vars = Vars::new();
    vars.insert("timestamp".to_string(), timestamp.to_string());
    vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    vars
}

/// Collapse runs of backslashes into a single forward slash
pub fn sanitize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_run = false;
    for c in path.chars() {
        if c == '\\' {
            if !in_run {
                out.push('/');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_vars() {
        let mut vars = Vars::new();
        vars.insert("timestamp".into(), "20251007_120654".into());
        vars.insert("download_timestamp".into(), "20251007_120000_download".into());

        assert_eq!(
            fill_vars("data/raw/{download_timestamp}/shards", &vars),
            "data/raw/20251007_120000_download/shards"
        );
        assert_eq!(
            fill_vars("logs/{timestamp}_unzip", &vars),
            "logs/20251007_120654_unzip"
        );
        assert_eq!(fill_vars("out/{missing}", &vars), "out/{missing}");
    }

    #[test]
    fn test_parse_vars() {
        let vars = parse_vars(&["download_timestamp=20251007_120654_download", "a=b=c"]).unwrap();
        assert_eq!(vars["download_timestamp"], "20251007_120654_download");
        assert_eq!(vars["a"], "b=c");

        assert!(parse_vars(&["novalue"]).is_err());
        assert!(parse_vars(&["=x"]).is_err());
        assert!(parse_vars::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_stage_vars_override_wins() {
        let overrides = parse_vars(&["timestamp=fixed"]).unwrap();
        let vars = stage_vars("20250101_000000", &overrides);
        assert_eq!(vars["timestamp"], "fixed");
    }

    #[test]
    fn test_stamp_format() {
        let s = stamp();
        assert_eq!(s.len(), 15);
        assert_eq!(&s[8..9], "_");
        assert!(s.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path(r"C:\\data\raw"), "C:/data/raw");
        assert_eq!(sanitize_path("already/clean"), "already/clean");
    }
}
