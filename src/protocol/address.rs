use std::fmt::{Display, Formatter};

/// A `user@host` network address. Whatever comes after the first `@` is the
/// host; without an `@` the whole string is the user and delivery is local.
/// Fields are `None` rather than empty strings so that "no host" stays
/// distinguishable from an empty host component.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Address {
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Address {
    pub fn parse(addr_str: &str) -> Address {
        match addr_str.split_once('@') {
            Some((user, host)) => Address {
                user: non_empty(user),
                host: non_empty(host),
            },
            None => Address {
                user: non_empty(addr_str),
                host: None,
            },
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.user, &self.host) {
            (Some(user), Some(host)) => write!(f, "{}@{}", user, host),
            (Some(user), None) => write!(f, "{}", user),
            (None, Some(host)) => write!(f, "@{}", host),
            (None, None) => write!(f, "<empty>"),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
