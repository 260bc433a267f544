//! Compiled route templates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{trace, warn};

use crate::automaton::Automaton;
use crate::element::ElementSpec;
use crate::error::{PathTemplateError, PathTemplateResult};

/// Splits a path into its non-empty `/`-separated segments.
///
/// Leading, trailing and repeated slashes are insignificant.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Whether a recursive wildcard appears anywhere but at the end.
fn has_inner_recursive_wildcard(elements: &[ElementSpec]) -> bool {
    elements.split_last().is_some_and(|(_, init)| {
        init.iter()
            .any(|element| matches!(element, ElementSpec::RecursiveWildcard))
    })
}

/// A compiled route template such as `/users/<id>/files/*`.
///
/// Immutable once compiled and safe to match from many threads at once.
///
/// ```rust,ignore
/// let template: PathTemplate = "/wild/<parameter>/card".parse()?;
/// assert!(template.matches("/wild/foo/card"));
/// assert_eq!(template.extract_path_parameters("/wild/foo/card")["parameter"], "foo");
/// ```
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    elements: Vec<ElementSpec>,
    automaton: Automaton,
}

impl PathTemplate {
    /// Compiles `template`.
    pub fn compile(template: &str) -> PathTemplateResult<Self> {
        let elements = segments(template)
            .into_iter()
            .map(ElementSpec::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if has_inner_recursive_wildcard(&elements) {
            warn!(
                template,
                "`*` before the last segment matches any number of segments in place"
            );
        }
        let automaton = Automaton::compile(&elements);
        trace!(
            template,
            elements = elements.len(),
            states = automaton.state_count(),
            "Compiled path template"
        );
        Ok(Self {
            source: template.to_string(),
            elements,
            automaton,
        })
    }

    /// Returns `true` if `path` fits the template.
    pub fn matches(&self, path: &str) -> bool {
        self.automaton.run(&segments(path)).is_some()
    }

    /// Returns the captured parameters if `path` fits the template.
    ///
    /// When several captures share a name, the one closest to the end of the
    /// path wins.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        self.automaton
            .run(&segments(path))
            .map(|captures| captures.into_iter().collect())
    }

    /// Returns the captured parameters, or an empty map if `path` does not
    /// fit the template.
    pub fn extract_path_parameters(&self, path: &str) -> HashMap<String, String> {
        self.match_path(path).unwrap_or_default()
    }

    /// The compiled elements, in template order.
    pub fn elements(&self) -> &[ElementSpec] {
        &self.elements
    }

    /// The underlying automaton.
    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    /// The template text as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for PathTemplate {
    type Err = PathTemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl TryFrom<&str> for PathTemplate {
    type Error = PathTemplateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::compile(value)
    }
}
