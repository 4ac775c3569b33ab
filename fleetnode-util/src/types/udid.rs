use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::Deref;

/// Unique device identifier assigned by the remote management service
///
/// A device that never completed a check-in has an empty identifier.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Udid(String);

impl Deref for Udid {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Udid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Udid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Udid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<Udid> for String {
    fn from(value: Udid) -> Self {
        value.0
    }
}
