//! Output validation against operator + pattern pairs

use crate::core::error::{EngineError, Result};
use crate::core::step::Operator;
use crate::core::variables::substitute_dynamic;
use regex::Regex;
use std::collections::HashMap;

/// Result of matching one output against a validation rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: bool,

    /// First capture group (or whole match) of a positive `contains`/`equal` match
    pub capture: Option<String>,
}

impl MatchOutcome {
    fn hit(capture: Option<String>) -> Self {
        Self {
            matched: true,
            capture,
        }
    }

    fn verdict(matched: bool) -> Self {
        Self {
            matched,
            capture: None,
        }
    }
}

/// A validation pattern ready for matching
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    /// No regex metacharacters, matched as plain text
    Literal(String),
    /// Regular expression, multi-line and dot-matches-newline like the device logs expect
    Regex { search: Regex, full: Regex },
}

impl CompiledPattern {
    /// Compile a pattern, rejecting malformed expressions
    pub fn compile(pattern: &str) -> Result<Self> {
        if regex::escape(pattern) == pattern {
            return Ok(CompiledPattern::Literal(pattern.to_string()));
        }

        let to_error = |e: regex::Error| EngineError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        };
        let search = Regex::new(&format!("(?ms){}", pattern)).map_err(to_error)?;
        let full = Regex::new(&format!(r"(?ms)\A(?:{})\z", pattern)).map_err(to_error)?;

        Ok(CompiledPattern::Regex { search, full })
    }

    /// Search anywhere in the text, returning the capture on success
    pub fn search(&self, text: &str) -> Option<String> {
        match self {
            CompiledPattern::Literal(literal) => {
                text.contains(literal.as_str()).then(|| literal.clone())
            }
            CompiledPattern::Regex { search, .. } => search.captures(text).map(first_group),
        }
    }

    /// Match the entire text, returning the capture on success
    pub fn full_match(&self, text: &str) -> Option<String> {
        match self {
            CompiledPattern::Literal(literal) => (text == literal).then(|| literal.clone()),
            CompiledPattern::Regex { full, .. } => full.captures(text).map(first_group),
        }
    }

    /// Whether the text contains a match
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            CompiledPattern::Literal(literal) => text.contains(literal.as_str()),
            CompiledPattern::Regex { search, .. } => search.is_match(text),
        }
    }
}

fn first_group(caps: regex::Captures<'_>) -> String {
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Evaluate `output` against an operator and optional pattern.
///
/// Dynamic patterns have their `{{param}}` tokens resolved from
/// `dynamic_params` before compilation.
pub fn matches(
    output: &str,
    operator: Operator,
    pattern: Option<&str>,
    is_dynamic: bool,
    dynamic_params: &HashMap<String, String>,
) -> Result<MatchOutcome> {
    let pattern = match pattern {
        Some(p) if !p.is_empty() => p,
        _ => return Ok(match_without_pattern(output, operator)),
    };

    let resolved;
    let pattern = if is_dynamic {
        resolved = substitute_dynamic(pattern, dynamic_params)?;
        resolved.as_str()
    } else {
        pattern
    };

    let compiled = CompiledPattern::compile(pattern)?;
    Ok(match_compiled(output, operator, &compiled))
}

/// Evaluate `output` against an already compiled pattern
pub fn match_compiled(output: &str, operator: Operator, pattern: &CompiledPattern) -> MatchOutcome {
    match operator {
        Operator::Contains => match pattern.search(output) {
            Some(capture) => MatchOutcome::hit(Some(capture)),
            None => MatchOutcome::verdict(false),
        },
        Operator::NotContains => MatchOutcome::verdict(!pattern.is_match(output)),
        Operator::Equal => match pattern.full_match(output.trim()) {
            Some(capture) => MatchOutcome::hit(Some(capture)),
            None => MatchOutcome::verdict(false),
        },
        Operator::NotEqual => MatchOutcome::verdict(pattern.full_match(output.trim()).is_none()),
    }
}

fn match_without_pattern(output: &str, operator: Operator) -> MatchOutcome {
    let matched = match operator {
        Operator::Contains => !output.is_empty(),
        Operator::NotContains => output.is_empty(),
        Operator::Equal => output.trim().is_empty(),
        Operator::NotEqual => !output.trim().is_empty(),
    };
    MatchOutcome::verdict(matched)
}
