//! User roles and legacy label normalization.
//!
//! The backend has issued several spellings of the same role over time
//! (`JR`, `Junior Resident`, `Psychiatric Welfare Officer`, ...). Every label
//! is folded into one canonical role before it is stored, so navigation
//! gating elsewhere only ever sees canonical values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical user role.
///
/// Labels outside the known set are kept verbatim in `Other` rather than
/// rejected: the coordinator treats roles opaquely and must not fail a login
/// over an unfamiliar label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// System administrator.
    Admin,
    /// Teaching faculty / consultant.
    Faculty,
    /// Junior or senior resident.
    Resident,
    /// Psychiatric welfare officer.
    WelfareOfficer,
    /// Unrecognized label, stored as received (trimmed).
    Other(String),
}

/// Legacy label (folded form) → canonical role.
const LEGACY_LABELS: &[(&str, Role)] = &[
    ("admin", Role::Admin),
    ("administrator", Role::Admin),
    ("system administrator", Role::Admin),
    ("system admin", Role::Admin),
    ("super admin", Role::Admin),
    ("superadmin", Role::Admin),
    ("faculty", Role::Faculty),
    ("faculty member", Role::Faculty),
    ("consultant", Role::Faculty),
    ("resident", Role::Resident),
    ("resident doctor", Role::Resident),
    ("jr", Role::Resident),
    ("sr", Role::Resident),
    ("junior resident", Role::Resident),
    ("senior resident", Role::Resident),
    ("welfare officer", Role::WelfareOfficer),
    ("psychiatric welfare officer", Role::WelfareOfficer),
    ("pwo", Role::WelfareOfficer),
];

impl Role {
    /// Map any label to its canonical role.
    ///
    /// Matching ignores case, surrounding whitespace, and treats `-`/`_` as
    /// spaces. Idempotent: `normalize(r.as_str()) == r` for every `r`
    /// produced by this function.
    pub fn normalize(label: &str) -> Self {
        let folded = fold(label);

        LEGACY_LABELS
            .iter()
            .find(|(legacy, _)| *legacy == folded)
            .map(|(_, role)| role.clone())
            .unwrap_or_else(|| Self::Other(label.trim().to_string()))
    }

    /// Re-run normalization on this role.
    pub fn normalized(&self) -> Self {
        Self::normalize(self.as_str())
    }

    /// Canonical label.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "Admin",
            Self::Faculty => "Faculty",
            Self::Resident => "Resident",
            Self::WelfareOfficer => "Welfare Officer",
            Self::Other(label) => label,
        }
    }
}

fn fold(label: &str) -> String {
    label
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl From<String> for Role {
    fn from(label: String) -> Self {
        Self::normalize(&label)
    }
}

impl From<&str> for Role {
    fn from(label: &str) -> Self {
        Self::normalize(label)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
