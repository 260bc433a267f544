//! First-match routing over an ordered list of templates.

use std::collections::HashMap;

use crate::error::PathTemplateResult;
use crate::template::PathTemplate;

/// A successful route lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    pub template: &'a PathTemplate,
    pub value: &'a T,
    pub parameters: HashMap<String, String>,
}

/// Ordered `(template, value)` pairs; the first template that matches wins.
#[derive(Debug, Clone)]
pub struct PathRouter<T> {
    routes: Vec<(PathTemplate, T)>,
}

impl<T> Default for PathRouter<T> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<T> PathRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a compiled route.
    pub fn add(&mut self, template: PathTemplate, value: T) -> &mut Self {
        self.routes.push((template, value));
        self
    }

    /// Compiles `template` and appends the route.
    pub fn route(&mut self, template: &str, value: T) -> PathTemplateResult<&mut Self> {
        let template = PathTemplate::compile(template)?;
        Ok(self.add(template, value))
    }

    /// Finds the first route matching `path`.
    pub fn find(&self, path: &str) -> Option<RouteMatch<'_, T>> {
        self.find_where(path, |_| true)
    }

    /// Finds the first route matching `path` whose value satisfies `accept`.
    pub fn find_where<F>(&self, path: &str, mut accept: F) -> Option<RouteMatch<'_, T>>
    where
        F: FnMut(&T) -> bool,
    {
        self.routes
            .iter()
            .filter(|(_, value)| accept(value))
            .find_map(|(template, value)| {
                template.match_path(path).map(|parameters| RouteMatch {
                    template,
                    value,
                    parameters,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterates routes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathTemplate, &T)> {
        self.routes.iter().map(|(template, value)| (template, value))
    }
}
