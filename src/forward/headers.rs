//! Header rewrite policy.

use http::header::{InvalidHeaderName, InvalidHeaderValue, HOST, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, thiserror::Error)]
pub enum HeaderRuleError {
    #[error(transparent)]
    Name(#[from] InvalidHeaderName),
    #[error(transparent)]
    Value(#[from] InvalidHeaderValue),
}

/// Sets a header, or deletes it when the value is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRule {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderRule {
    pub fn new(name: &str, value: &str) -> Result<Self, HeaderRuleError> {
        Ok(Self {
            name: HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes())?,
            value: HeaderValue::from_str(value)?,
        })
    }

    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    pub fn is_delete(&self) -> bool {
        self.value.is_empty()
    }
}

/// Ordered list of header rules applied to every forwarded request.
#[derive(Debug, Clone, Default)]
pub struct HeaderRewrite {
    rules: Vec<HeaderRule>,
}

impl HeaderRewrite {
    pub fn new(rules: Vec<HeaderRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[HeaderRule] {
        &self.rules
    }

    /// Applies every rule in order. Headers no rule names are left alone.
    ///
    /// `host` is the request's declared host; a `host` rule replaces it too.
    pub fn apply(&self, headers: &mut HeaderMap, host: &mut Option<String>) {
        for rule in &self.rules {
            if rule.is_delete() {
                headers.remove(&rule.name);
                if rule.name == USER_AGENT {
                    // Present but blank, so no client default gets filled in.
                    headers.insert(USER_AGENT, HeaderValue::from_static(""));
                }
            } else {
                headers.insert(rule.name.clone(), rule.value.clone());
                if rule.name == HOST {
                    *host = rule.value.to_str().ok().map(str::to_string);
                }
            }
        }
    }
}
