use std::fmt;

use serde::{Deserialize, Serialize};

/// Permissions is a bitmask of the rights a user holds on a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u64);

impl Permissions {
    /// Unrestricted control over a branch, including modification of the
    /// branch control tables themselves.
    pub const ADMIN: Permissions = Permissions(1 << 0); // 1
    pub const WRITE: Permissions = Permissions(1 << 1); // 2
    pub const READ: Permissions = Permissions(1 << 2); // 4

    /// Set-string names in flag order.
    pub const NAMES: [&'static str; 3] = ["admin", "write", "read"];

    const ALL_BITS: u64 = 0b111;

    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this permission bitmask contains the required permission.
    #[must_use]
    pub const fn has(self, required: Permissions) -> bool {
        self.0 & required.0 == required.0
    }

    /// Combines two permission bitmasks.
    #[must_use]
    pub const fn union(self, other: Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }

    /// Removes permissions from this bitmask.
    #[must_use]
    pub const fn difference(self, other: Permissions) -> Permissions {
        Permissions(self.0 & !other.0)
    }

    /// Converts a single permission name to its bitmask value.
    pub fn parse(s: &str) -> Option<Permissions> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::ADMIN),
            "write" => Some(Self::WRITE),
            "read" => Some(Self::READ),
            _ => None,
        }
    }

    /// Parses a comma-separated set string such as `"admin,write"`.
    /// The empty string is the empty set.
    pub fn parse_set(s: &str) -> Option<Permissions> {
        let mut result = Permissions::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            result = result.union(Self::parse(part)?);
        }
        Some(result)
    }

    /// Validates raw bits coming from outside the crate.
    pub fn from_bits(bits: u64) -> Option<Permissions> {
        (bits & !Self::ALL_BITS == 0).then_some(Permissions(bits))
    }

    /// Returns the names of the set flags, in flag order.
    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        [Self::ADMIN, Self::WRITE, Self::READ]
            .into_iter()
            .zip(Self::NAMES)
            .filter(|(flag, _)| self.has(*flag))
            .map(|(_, name)| name)
            .collect()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(","))
    }
}

impl From<Permissions> for u64 {
    fn from(p: Permissions) -> Self {
        p.0
    }
}
