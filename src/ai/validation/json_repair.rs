//! JSON Extraction
//!
//! Text completions from chat backends often wrap the structured answer in
//! markdown fences or prose, or leave it slightly malformed. Repairs are
//! tried from least to most invasive:
//!
//! 1. strip code fences and BOM, parse as-is
//! 2. drop trailing commas, close unclosed brackets
//! 3. extract the first balanced object/array from mixed prose
//!
//! Text that ends inside a string literal was cut off mid-value and is
//! never repaired.

use serde_json::Value;
use tracing::debug;

use crate::types::{PetPalError, Result};

/// Parse the structured value out of a completion
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    parse_with_repair(content).map(|(value, _)| value)
}

/// Parse, reporting whether any repair was applied
pub fn parse_with_repair(content: &str) -> Result<(Value, bool)> {
    let cleaned = strip_fences(content.trim().trim_start_matches('\u{feff}'));

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok((value, false));
    }

    if let Some(repaired) = close_open_structures(&remove_trailing_commas(cleaned))
        && let Ok(value) = serde_json::from_str::<Value>(&repaired)
    {
        debug!("Completion JSON repaired");
        return Ok((value, true));
    }

    if let Some(candidate) = first_balanced(cleaned)
        && let Ok(value) = serde_json::from_str::<Value>(&remove_trailing_commas(candidate))
    {
        debug!("Completion JSON extracted from surrounding text");
        return Ok((value, true));
    }

    Err(PetPalError::LlmApi(format!(
        "Completion is not valid JSON: {}...",
        cleaned.chars().take(120).collect::<String>()
    )))
}

fn strip_fences(s: &str) -> &str {
    let mut out = s;
    if out.starts_with("```")
        && let Some(newline) = out.find('\n')
    {
        out = &out[newline + 1..];
    }
    out.strip_suffix("```").unwrap_or(out).trim()
}

/// Tracks whether a scan position is inside a string literal
#[derive(Default)]
struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    /// Feed one char; returns true when it is structural (outside strings)
    fn structural(&mut self, ch: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match ch {
            '\\' if self.in_string => {
                self.escaped = true;
                false
            }
            '"' => {
                self.in_string = !self.in_string;
                false
            }
            _ => !self.in_string,
        }
    }
}

fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut state = StringState::default();
    let mut out = String::with_capacity(s.len());

    for (i, &ch) in chars.iter().enumerate() {
        if state.structural(ch) && ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Close unclosed brackets in nesting order
///
/// `None` when the text ends inside a string literal.
fn close_open_structures(s: &str) -> Option<String> {
    let mut state = StringState::default();
    let mut stack = Vec::new();

    for ch in s.chars() {
        if !state.structural(ch) {
            continue;
        }
        match ch {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    if state.in_string {
        return None;
    }

    let mut out = s.to_string();
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    Some(out)
}

fn first_balanced(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let mut state = StringState::default();
    let mut depth = 0usize;

    for (i, ch) in s[start..].char_indices() {
        if !state.structural(ch) {
            continue;
        }
        match ch {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_not_repaired() {
        let (value, repaired) = parse_with_repair(r#"{"answer": "yes"}"#).unwrap();
        assert!(!repaired);
        assert_eq!(value["answer"], "yes");
    }

    #[test]
    fn test_code_fence() {
        let value = extract_json_from_response("```json\n{\"names\": [\"Luna\"]}\n```").unwrap();
        assert_eq!(value["names"][0], "Luna");
    }

    #[test]
    fn test_trailing_comma_and_missing_closers() {
        let (value, repaired) = parse_with_repair(r#"{"names": ["Luna", "Milo",]"#).unwrap();
        assert!(repaired);
        assert_eq!(value["names"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_comma_inside_string_kept() {
        let value = extract_json_from_response(r#"{"answer": "rest, then water,]"}"#).unwrap();
        assert_eq!(value["answer"], "rest, then water,]");
    }

    #[test]
    fn test_extract_from_prose() {
        let input = "Sure! Here is the result:\n{\"isPetDetected\": true}\nLet me know.";
        let (value, repaired) = parse_with_repair(input).unwrap();
        assert!(repaired);
        assert_eq!(value["isPetDetected"], true);
    }

    #[test]
    fn test_unterminated_string_rejected() {
        let cut = r#"{"potentialCauses": "Possible toxin ingestion", "recommendations": "Call your v"#;
        assert!(extract_json_from_response(cut).is_err());
        assert!(extract_json_from_response(&format!("```json\n{}", cut)).is_err());
    }

    #[test]
    fn test_unparseable() {
        assert!(extract_json_from_response("I cannot help with that.").is_err());
    }
}
