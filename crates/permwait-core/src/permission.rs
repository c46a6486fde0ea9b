//! Permission request data model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlation code attached to every outgoing prompt.
pub const PERMISSION_REQUEST_CODE: i32 = 115;

/// Platform result code for a granted permission.
pub const PERMISSION_GRANTED: i32 = 0;

/// Platform result code for a denied permission.
pub const PERMISSION_DENIED: i32 = -1;

/// First SDK level that enforces runtime permissions.
///
/// Below this level every permission is granted at install time.
pub const RUNTIME_PERMISSIONS_SDK_LEVEL: u32 = 23;

/// Ordered set of permission identifiers for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(Vec<String>);

impl PermissionSet {
    pub fn new(permissions: Vec<String>) -> Self {
        Self(permissions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for PermissionSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Aggregate result of one permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Granted,
    Denied,
}

impl Outcome {
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl From<bool> for Outcome {
    fn from(granted: bool) -> Self {
        if granted { Self::Granted } else { Self::Denied }
    }
}

/// Per-permission result reported by the platform callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantResult {
    Granted,
    Denied,
}

impl GrantResult {
    /// Map a raw platform result code.
    pub const fn from_code(code: i32) -> Self {
        if code == PERMISSION_GRANTED {
            Self::Granted
        } else {
            Self::Denied
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            Self::Granted => PERMISSION_GRANTED,
            Self::Denied => PERMISSION_DENIED,
        }
    }
}

impl From<bool> for GrantResult {
    fn from(granted: bool) -> Self {
        if granted { Self::Granted } else { Self::Denied }
    }
}
