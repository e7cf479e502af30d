//! Routing qualifiers of the form `namespace/action`.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Parsed `namespace/action` qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Qualifier {
    namespace: String,
    action: String,
}

impl Qualifier {
    /// Reserved qualifier signalling a graceful end of stream.
    pub const ON_COMPLETED: &'static str = "sessionmux/onCompleted";
    /// Reserved qualifier signalling that the peer failed the stream.
    pub const ON_ERROR: &'static str = "sessionmux/onError";

    pub fn new(namespace: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            action: action.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Whether `qualifier` is one of the reserved stream signals.
    pub fn is_signal(qualifier: &str) -> bool {
        qualifier == Self::ON_COMPLETED || qualifier == Self::ON_ERROR
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.action)
    }
}

impl FromStr for Qualifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, action)) if !namespace.is_empty() && !action.is_empty() => {
                Ok(Self::new(namespace, action))
            }
            _ => Err(Error::InvalidQualifier(s.to_string())),
        }
    }
}
