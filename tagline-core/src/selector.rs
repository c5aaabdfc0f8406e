//! Minimal CSS selector support.
//!
//! Supported: type selectors, `*`, `#id`, `.class`, `[attr]`, `[attr=value]`,
//! compound steps, descendant and child combinators, and comma-separated
//! groups. Selectors are parsed once and matched against any [`ElementTree`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::dom::{ElementId, ElementTree};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unsupported selector: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCondition {
    Exists(String),
    Equals(String, String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Step {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    step: Step,
    // Relation to the part on the left.
    combinator: Option<Combinator>,
}

/// Parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Vec<Part>>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut groups = Vec::new();
        for group in trimmed.split(',') {
            groups.push(parse_chain(group.trim(), trimmed)?);
        }

        Ok(Self {
            source: trimmed.to_string(),
            groups,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `element` matches any group of this selector.
    pub fn matches<T: ElementTree + ?Sized>(&self, tree: &T, element: ElementId) -> bool {
        tree.tag_name(element).is_some()
            && self
                .groups
                .iter()
                .any(|parts| matches_chain(tree, element, parts))
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_chain(group: &str, whole: &str) -> Result<Vec<Part>, SelectorError> {
    if group.is_empty() {
        return Err(SelectorError::Unsupported(whole.to_string()));
    }

    let mut parts: Vec<Part> = Vec::new();
    let mut pending: Option<Combinator> = None;
    for token in tokenize(group, whole)? {
        if token == ">" {
            if pending.is_some() || parts.is_empty() {
                return Err(SelectorError::Unsupported(whole.to_string()));
            }
            pending = Some(Combinator::Child);
            continue;
        }

        let step = parse_step(&token, whole)?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(Part { step, combinator });
    }

    if parts.is_empty() || pending.is_some() {
        return Err(SelectorError::Unsupported(whole.to_string()));
    }
    Ok(parts)
}

fn tokenize(group: &str, whole: &str) -> Result<Vec<String>, SelectorError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;

    for ch in group.chars() {
        match ch {
            '[' if !in_brackets => {
                in_brackets = true;
                current.push(ch);
            }
            ']' if in_brackets => {
                in_brackets = false;
                current.push(ch);
            }
            '[' | ']' => return Err(SelectorError::Unsupported(whole.to_string())),
            '>' if !in_brackets => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(">".to_string());
            }
            '+' | '~' | ':' if !in_brackets => {
                return Err(SelectorError::Unsupported(whole.to_string()))
            }
            ch if ch.is_ascii_whitespace() && !in_brackets => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if in_brackets {
        return Err(SelectorError::Unsupported(whole.to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_step(token: &str, whole: &str) -> Result<Step, SelectorError> {
    let unsupported = || SelectorError::Unsupported(whole.to_string());
    let mut step = Step::default();
    let mut universal = false;
    let mut rest = token;

    while let Some(first) = rest.chars().next() {
        match first {
            '*' => {
                if universal || step.tag.is_some() {
                    return Err(unsupported());
                }
                universal = true;
                rest = &rest[1..];
            }
            '#' => {
                let (ident, next) = take_ident(&rest[1..]).ok_or_else(unsupported)?;
                if step.id.replace(ident.to_string()).is_some() {
                    return Err(unsupported());
                }
                rest = next;
            }
            '.' => {
                let (ident, next) = take_ident(&rest[1..]).ok_or_else(unsupported)?;
                step.classes.push(ident.to_string());
                rest = next;
            }
            '[' => {
                let end = rest.find(']').ok_or_else(unsupported)?;
                step.attrs.push(parse_attr(&rest[1..end]).ok_or_else(unsupported)?);
                rest = &rest[end + 1..];
            }
            _ => {
                if universal || step.tag.is_some() || step.id.is_some() || !step.classes.is_empty()
                {
                    return Err(unsupported());
                }
                let (ident, next) = take_ident(rest).ok_or_else(unsupported)?;
                step.tag = Some(ident.to_ascii_lowercase());
                rest = next;
            }
        }
    }

    Ok(step)
}

fn take_ident(input: &str) -> Option<(&str, &str)> {
    let end = input
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_'))
        .map(|(index, _)| index)
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    Some((&input[..end], &input[end..]))
}

fn parse_attr(body: &str) -> Option<AttrCondition> {
    match body.split_once('=') {
        None => {
            let (name, rest) = take_ident(body.trim())?;
            rest.is_empty()
                .then(|| AttrCondition::Exists(name.to_string()))
        }
        Some((name, value)) => {
            let (name, rest) = take_ident(name.trim())?;
            if !rest.is_empty() {
                return None;
            }
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .or_else(|| {
                    value
                        .strip_prefix('\'')
                        .and_then(|inner| inner.strip_suffix('\''))
                })
                .unwrap_or(value);
            Some(AttrCondition::Equals(name.to_string(), unquoted.to_string()))
        }
    }
}

fn matches_step<T: ElementTree + ?Sized>(tree: &T, element: ElementId, step: &Step) -> bool {
    if let Some(tag) = &step.tag {
        if tree.tag_name(element) != Some(tag.as_str()) {
            return false;
        }
    }
    if let Some(id) = &step.id {
        if tree.attribute(element, "id") != Some(id.as_str()) {
            return false;
        }
    }
    if !step.classes.is_empty() {
        let class_attr = tree.attribute(element, "class").unwrap_or("");
        let present: Vec<&str> = class_attr.split_ascii_whitespace().collect();
        if !step.classes.iter().all(|class| present.contains(&class.as_str())) {
            return false;
        }
    }
    step.attrs.iter().all(|condition| match condition {
        AttrCondition::Exists(name) => tree.attribute(element, name).is_some(),
        AttrCondition::Equals(name, value) => {
            tree.attribute(element, name) == Some(value.as_str())
        }
    })
}

fn matches_chain<T: ElementTree + ?Sized>(tree: &T, element: ElementId, parts: &[Part]) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !matches_step(tree, element, &last.step) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }

    match last.combinator.unwrap_or(Combinator::Descendant) {
        Combinator::Child => tree
            .parent(element)
            .is_some_and(|parent| matches_chain(tree, parent, rest)),
        Combinator::Descendant => {
            let mut cursor = tree.parent(element);
            while let Some(ancestor) = cursor {
                if matches_chain(tree, ancestor, rest) {
                    return true;
                }
                cursor = tree.parent(ancestor);
            }
            false
        }
    }
}
