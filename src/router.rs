//! Route table.
//!
//! One radix tree per HTTP method plus one for routes registered without a
//! method. O(path-length) lookup via [`matchit`]; this module only decides
//! which tree to ask.

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::BoxedHandler;

/// Outcome of matching one request against the table.
pub(crate) enum Lookup<T> {
    Found(BoxedHandler<T>, HashMap<String, String>),
    /// The path exists, but only under the listed methods.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

pub(crate) struct Routes<T> {
    by_method: HashMap<Method, MatchitRouter<BoxedHandler<T>>>,
    any_method: MatchitRouter<BoxedHandler<T>>,
}

impl<T> Routes<T> {
    pub(crate) fn new() -> Self {
        Self { by_method: HashMap::new(), any_method: MatchitRouter::new() }
    }

    /// Registers `handler` under `pattern`.
    ///
    /// `pattern` is either a bare path (`/users/{id}`), which matches every
    /// method, or a method and a path separated by whitespace
    /// (`GET /users/{id}`). A method-specific route takes precedence over a
    /// bare one for the same path. Registering the same or an overlapping
    /// path twice in one tree is rejected.
    pub(crate) fn insert(&mut self, pattern: &str, handler: BoxedHandler<T>) -> Result<(), Error> {
        let route_err = |reason: String| Error::Route { pattern: pattern.to_owned(), reason };

        let (method, path) = parse_pattern(pattern).map_err(route_err)?;
        let tree = match method {
            Some(method) => self.by_method.entry(method).or_insert_with(MatchitRouter::new),
            None => &mut self.any_method,
        };
        tree.insert(path, handler).map_err(|e| route_err(e.to_string()))
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup<T> {
        let found = Self::match_in(self.by_method.get(method), path)
            .or_else(|| {
                // HEAD is answered by GET routes; hyper drops the body.
                (*method == Method::HEAD)
                    .then(|| Self::match_in(self.by_method.get(&Method::GET), path))
                    .flatten()
            })
            .or_else(|| Self::match_in(Some(&self.any_method), path));

        if let Some((handler, params)) = found {
            return Lookup::Found(handler, params);
        }

        let mut allowed: Vec<Method> = self
            .by_method
            .iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.clone())
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }

    fn match_in(
        tree: Option<&MatchitRouter<BoxedHandler<T>>>,
        path: &str,
    ) -> Option<(BoxedHandler<T>, HashMap<String, String>)> {
        let matched = tree?.at(path).ok()?;
        let handler = matched.value.clone();
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

fn parse_pattern(pattern: &str) -> Result<(Option<Method>, &str), String> {
    let pattern = pattern.trim();
    let (method, path) = match pattern.split_once(char::is_whitespace) {
        Some((method, path)) => {
            let method = Method::from_bytes(method.as_bytes())
                .map_err(|_| format!("unknown method `{method}`"))?;
            (Some(method), path.trim_start())
        }
        None => (None, pattern),
    };

    if !path.starts_with('/') {
        return Err("path must start with `/`".to_owned());
    }
    Ok((method, path))
}
