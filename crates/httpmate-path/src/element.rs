//! Classification of template segments.

use std::fmt;

use regex::Regex;

use crate::error::{PathTemplateError, PathTemplateResult};

/// One compiled template segment.
#[derive(Debug, Clone)]
pub enum ElementSpec {
    /// Matches exactly this text.
    Literal(String),
    /// `<name>` or `<>`: any one segment, captured under `name` if given.
    Wildcard(Option<String>),
    /// `|regex|`: a segment the anchored regex matches in full. Named groups
    /// become captures.
    Pattern(SegmentPattern),
    /// `*`: any number of trailing segments, including none.
    RecursiveWildcard,
}

/// A regex segment with its original source text.
#[derive(Clone)]
pub struct SegmentPattern {
    source: String,
    regex: Regex,
}

impl SegmentPattern {
    fn compile(source: &str, segment: &str) -> PathTemplateResult<Self> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|source| {
            PathTemplateError::InvalidRegex {
                segment: segment.to_string(),
                source,
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The regex as written between the bars.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the capture groups.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.regex.capture_names().flatten()
    }

    fn capture(&self, segment: &str, captures: &mut Vec<(String, String)>) -> bool {
        let Some(found) = self.regex.captures(segment) else {
            return false;
        };
        for name in self.regex.capture_names().flatten() {
            if let Some(value) = found.name(name) {
                captures.push((name.to_string(), value.as_str().to_string()));
            }
        }
        true
    }
}

impl fmt::Debug for SegmentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SegmentPattern").field(&self.source).finish()
    }
}

impl ElementSpec {
    /// Classifies a single non-empty template segment.
    pub fn parse(segment: &str) -> PathTemplateResult<Self> {
        if segment == "*" {
            return Ok(Self::RecursiveWildcard);
        }

        if let Some(rest) = segment.strip_prefix('|') {
            let inner = rest
                .strip_suffix('|')
                .ok_or_else(|| PathTemplateError::UnterminatedRegex(segment.to_string()))?;
            return SegmentPattern::compile(inner, segment).map(Self::Pattern);
        }

        if let Some(name) = segment
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
        {
            if name.is_empty() {
                return Ok(Self::Wildcard(None));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(PathTemplateError::InvalidCaptureName(segment.to_string()));
            }
            return Ok(Self::Wildcard(Some(name.to_string())));
        }

        Ok(Self::Literal(segment.to_string()))
    }

    /// Tests `segment` and appends any captures on success.
    ///
    /// `captures` is left untouched when the segment does not match.
    pub fn capture(&self, segment: &str, captures: &mut Vec<(String, String)>) -> bool {
        match self {
            Self::Literal(text) => text == segment,
            Self::Wildcard(name) => {
                if let Some(name) = name {
                    captures.push((name.clone(), segment.to_string()));
                }
                true
            }
            Self::Pattern(pattern) => pattern.capture(segment, captures),
            Self::RecursiveWildcard => true,
        }
    }
}

impl fmt::Display for ElementSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.write_str(text),
            Self::Wildcard(name) => write!(f, "<{}>", name.as_deref().unwrap_or_default()),
            Self::Pattern(pattern) => write!(f, "|{}|", pattern.source),
            Self::RecursiveWildcard => f.write_str("*"),
        }
    }
}
