//! Tenancy: the account and domain that own a resource.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owning account and its domain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Owner {
    pub account: String,
    pub domain: String,
}

impl Owner {
    pub fn new(account: &str, domain: &str) -> Self {
        Owner {
            account: account.to_string(),
            domain: domain.to_string(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.account)
    }
}
