use super::types::StateInfo;
use crate::Result;
use std::path::Path;

/// Reads a newline-delimited list of state codes
///
/// Blank lines and lines starting with `#` are ignored.
pub fn load_priority_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Orders states for the crawl
///
/// States named in `priority` come first, in that order; the rest keep their
/// catalog order. A non-empty `only` restricts the result to those codes.
pub fn order_states(states: Vec<StateInfo>, priority: &[String], only: &[String]) -> Vec<StateInfo> {
    let mut remaining: Vec<StateInfo> = states
        .into_iter()
        .filter(|s| only.is_empty() || only.contains(&s.state_code))
        .collect();

    let mut ordered = Vec::with_capacity(remaining.len());
    for code in priority {
        if let Some(index) = remaining.iter().position(|s| &s.state_code == code) {
            ordered.push(remaining.remove(index));
        }
    }
    ordered.extend(remaining);
    ordered
}
