//! URL template matching.
//!
//! Templates are plain strings with `{name}` placeholders. A placeholder
//! binds one or more characters other than `/`. Matching is syntactic only;
//! bound values are never type checked here.

use indexmap::IndexMap;
use regex::Regex;

/// Variable bindings produced by a template match, in placeholder order.
pub type Bindings = IndexMap<String, String>;

/// Outcome of matching one template against a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateResult {
    /// The template that matched (e.g. `/pets/{id}`).
    pub template: String,
    /// The concrete text the template matched (e.g. `/pets/42`).
    pub resolved: String,
    /// Placeholder name to bound value.
    pub variables: Bindings,
}

impl TemplateResult {
    /// Result for a template matched literally, with no bindings.
    pub fn literal(template: &str) -> Self {
        Self {
            template: template.to_string(),
            resolved: template.to_string(),
            variables: Bindings::new(),
        }
    }
}

/// A successful `search` or `parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    /// Text of the input covered by the template.
    pub matched: String,
    /// Placeholder name to bound value.
    pub variables: Bindings,
}

/// Returns true if the template contains at least one `{name}` placeholder.
pub fn has_variables(pattern: &str) -> bool {
    split_template(pattern)
        .iter()
        .any(|part| matches!(part, Part::Variable(_)))
}

/// True if `url` ends with `pattern` taken literally.
pub fn matches_suffix(pattern: &str, url: &str) -> bool {
    url.ends_with(pattern)
}

/// Find `pattern` at the end of `url`.
///
/// The match may start anywhere in `url` but must run to its end.
pub fn search(pattern: &str, url: &str) -> Option<TemplateMatch> {
    let (regex, names) = compile(pattern, false, true)?;
    capture(&regex, &names, url)
}

/// Match `pattern` at the start of `text`.
///
/// Text after the match is ignored, so a server template matches any URL
/// prefix it covers.
pub fn parse(pattern: &str, text: &str) -> Option<TemplateMatch> {
    let (regex, names) = compile(pattern, true, false)?;
    capture(&regex, &names, text)
}

#[derive(Debug, PartialEq, Eq)]
enum Part<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

fn split_template(pattern: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        let name = &rest[open + 1..close];
        // Empty or nested braces are not placeholders
        if name.is_empty() || name.contains('{') {
            parts.push(Part::Literal(&rest[..=open]));
            rest = &rest[open + 1..];
            continue;
        }
        if open > 0 {
            parts.push(Part::Literal(&rest[..open]));
        }
        parts.push(Part::Variable(name));
        rest = &rest[close + 1..];
    }

    if !rest.is_empty() {
        parts.push(Part::Literal(rest));
    }
    parts
}

fn compile(pattern: &str, anchor_start: bool, anchor_end: bool) -> Option<(Regex, Vec<String>)> {
    let mut expression = String::new();
    let mut names = Vec::new();

    if anchor_start {
        expression.push('^');
    }
    for part in split_template(pattern) {
        match part {
            Part::Literal(text) => expression.push_str(&regex::escape(text)),
            Part::Variable(name) => {
                // Positional groups: placeholder names need not be valid group names
                expression.push_str("([^/]+)");
                names.push(name.to_string());
            }
        }
    }
    if anchor_end {
        expression.push('$');
    }

    Regex::new(&expression).ok().map(|regex| (regex, names))
}

fn capture(regex: &Regex, names: &[String], text: &str) -> Option<TemplateMatch> {
    let captures = regex.captures(text)?;
    let matched = captures.get(0)?.as_str().to_string();

    let mut variables = Bindings::new();
    for (i, name) in names.iter().enumerate() {
        if let Some(value) = captures.get(i + 1) {
            variables.insert(name.clone(), value.as_str().to_string());
        }
    }

    Some(TemplateMatch { matched, variables })
}
