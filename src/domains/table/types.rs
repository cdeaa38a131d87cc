use serde::{Deserialize, Serialize};

/// Options forwarded to [`TableSource::insert`](super::TableSource::insert)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertOptions {
    /// Skip rows that collide with an existing unique key
    pub skip_duplicates: bool,
    /// Drop record fields that are not columns of the table
    pub ignore_extra_fields: bool,
    /// Replace rows that collide with an existing unique key.
    /// Takes precedence over `skip_duplicates`.
    pub replace: bool,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_duplicates(mut self, yes: bool) -> Self {
        self.skip_duplicates = yes;
        self
    }

    pub fn ignore_extra_fields(mut self, yes: bool) -> Self {
        self.ignore_extra_fields = yes;
        self
    }

    pub fn replace(mut self, yes: bool) -> Self {
        self.replace = yes;
        self
    }

    /// SQL verb implementing the conflict policy
    pub fn insert_verb(&self) -> &'static str {
        if self.replace {
            "INSERT OR REPLACE"
        } else if self.skip_duplicates {
            "INSERT OR IGNORE"
        } else {
            "INSERT"
        }
    }
}
