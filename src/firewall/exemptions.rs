//! Requests that bypass the firewall entirely.

use http::Method;
use std::collections::HashSet;

/// Exact paths that are never firewalled.
const EXEMPT_PATHS: &[&str] = &["/", "/status"];

/// Path prefixes (documentation, static asset roots) that are never
/// firewalled.
const EXEMPT_PREFIXES: &[&str] = &["/docs", "/redoc", "/openapi", "/static"];

/// Filter deciding which requests skip the pipeline.
///
/// Exempt requests are forwarded unconditionally and mutate no firewall
/// state.
#[derive(Debug, Clone)]
pub struct Exemptions {
    exact_paths: HashSet<String>,
    prefixes: Vec<String>,
}

impl Default for Exemptions {
    fn default() -> Self {
        Self::new(
            EXEMPT_PATHS.iter().map(|p| (*p).to_owned()),
            EXEMPT_PREFIXES.iter().map(|p| (*p).to_owned()),
        )
    }
}

impl Exemptions {
    pub fn new(
        exact_paths: impl IntoIterator<Item = String>,
        prefixes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            exact_paths: exact_paths.into_iter().collect(),
            prefixes: prefixes.into_iter().collect(),
        }
    }

    pub fn is_exempt(&self, path: &str, method: &Method) -> bool {
        if method == Method::OPTIONS {
            return true;
        }
        if self.exact_paths.contains(path) {
            return true;
        }
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}
