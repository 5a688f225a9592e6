//! Conversions between RAPID value strings and typed values
//!
//! The controller stores and transmits every persistent variable as a
//! string. These helpers are the only place those strings become numbers.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::JointTarget;
use crate::{Result, RwsError};

/// Canonical RAPID form of a `num`.
pub fn format_num(value: f64) -> String {
    value.to_string()
}

pub fn parse_num(value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| RwsError::malformed(format!("'{}' is not a RAPID num", value)))
}

pub fn format_num_array(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| format_num(*v)).collect();
    format!("[{}]", items.join(","))
}

pub fn parse_num_array(value: &str) -> Result<Vec<f64>> {
    let inner = strip_brackets(value.trim())
        .ok_or_else(|| RwsError::malformed(format!("'{}' is not a RAPID array", value)))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner.split(',').map(parse_num).collect()
}

pub fn format_jointtarget(target: &JointTarget) -> String {
    let robax: Vec<String> = target.robax.iter().map(|v| format!("{:.4}", v)).collect();
    let extax: Vec<String> = target.extax.iter().map(|v| format!("{:.4}", v)).collect();
    format!("[[{}],[{}]]", robax.join(","), extax.join(","))
}

pub fn parse_jointtarget(value: &str) -> Result<JointTarget> {
    let caps = jointtarget_pattern()
        .captures(value.trim())
        .filter(|caps| caps[0].len() == value.trim().len())
        .ok_or_else(|| RwsError::malformed(format!("'{}' is not a RAPID jointtarget", value)))?;
    Ok(JointTarget {
        robax: six(&caps[1], "robax")?,
        extax: six(&caps[2], "extax")?,
    })
}

pub fn format_jointtarget_array(targets: &[JointTarget]) -> String {
    let items: Vec<String> = targets.iter().map(format_jointtarget).collect();
    format!("[{}]", items.join(","))
}

pub fn parse_jointtarget_array(value: &str) -> Result<Vec<JointTarget>> {
    let inner = strip_brackets(value.trim())
        .ok_or_else(|| RwsError::malformed(format!("'{}' is not a RAPID array", value)))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_elements(inner)
        .ok_or_else(|| RwsError::malformed(format!("unbalanced brackets in '{}'", value)))?
        .into_iter()
        .map(parse_jointtarget)
        .collect()
}

/// Split at commas outside any brackets. `None` if brackets do not balance.
fn split_elements(inner: &str) -> Option<Vec<&str>> {
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                elements.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    elements.push(&inner[start..]);
    Some(elements)
}

fn jointtarget_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[\s*\[([^\[\]]+)\]\s*,\s*\[([^\[\]]+)\]\s*\]").expect("jointtarget pattern is valid")
    })
}

fn strip_brackets(value: &str) -> Option<&str> {
    value.strip_prefix('[')?.strip_suffix(']')
}

fn six(list: &str, group: &str) -> Result<[f64; 6]> {
    let values: Vec<f64> = list.split(',').map(parse_num).collect::<Result<_>>()?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| RwsError::malformed(format!("{} has {} values, expected 6", group, v.len())))
}
