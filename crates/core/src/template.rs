//! Prompt templates with `{name}` placeholders.
//!
//! A template is parsed once into literal and variable segments. Binding a
//! template checks that every placeholder it references is in the set of
//! variables the caller will supply, so a misnamed placeholder is rejected
//! when the pipeline is built rather than when a request is served.
//!
//! Substitution is purely textual: no conditionals, no loops, and no escaping
//! of substituted values. `{{` and `}}` produce literal braces.

use std::collections::BTreeMap;

use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template without checking its variables against anything.
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let segments = parse_segments(&source)?;
        Ok(Self {
            name: name.into(),
            source,
            segments,
        })
    }

    /// Parse a template and verify that every placeholder is one of `supplied`.
    pub fn bind(
        name: impl Into<String>,
        source: impl Into<String>,
        supplied: &[&str],
    ) -> Result<Self, TemplateError> {
        let template = Self::parse(name, source)?;
        template.check_supplied(supplied)?;
        Ok(template)
    }

    /// Fail with the first placeholder not covered by `supplied`.
    pub fn check_supplied(&self, supplied: &[&str]) -> Result<(), TemplateError> {
        match self.variables().find(|v| !supplied.contains(v)) {
            Some(missing) => Err(TemplateError::MissingVariable {
                template: self.name.clone(),
                name: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Placeholder names in order of first appearance, without duplicates.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        let mut seen: Vec<&str> = Vec::new();
        self.segments.iter().filter_map(move |s| match s {
            Segment::Variable(name) if !seen.contains(&name.as_str()) => {
                seen.push(name.as_str());
                Some(name.as_str())
            }
            _ => None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute every placeholder with its value from `vars`.
    pub fn render(&self, vars: &PromptVariables) -> Result<RenderedPrompt, TemplateError> {
        let mut out = String::with_capacity(self.source.len() + vars.total_len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = vars.get(name).ok_or_else(|| TemplateError::MissingVariable {
                        template: self.name.clone(),
                        name: name.clone(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(RenderedPrompt(out))
    }
}

fn parse_segments(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::Unterminated { offset }),
                        Some((_, ch)) => name.push(ch),
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder { offset });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name.to_string()));
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Variable name → rendered text value, bound for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptVariables(BTreeMap<String, String>);

impl PromptVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    fn total_len(&self) -> usize {
        self.0.values().map(String::len).sum()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PromptVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The final text handed to the backend. Owned by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt(String);

impl RenderedPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for RenderedPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
