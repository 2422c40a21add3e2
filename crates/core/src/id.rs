//! Strongly-typed identifiers used across the domain.
//!
//! Catalog identifiers (roles, permissions) follow the uppercase-with-underscore
//! convention (`SYSTEM_CONFIG`, `ROLE_ADMIN`). Principal identifiers are
//! directory usernames (`john.doe`). Request identifiers are assigned by the
//! workflow (`REQ-001`).

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Identifier of a principal (human user or service account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Cow<'static, str>);

/// Identifier of a role in the role store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(Cow<'static, str>);

/// Identifier of a permission in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(Cow<'static, str>);

/// Identifier of an access request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Cow<'static, str>);

macro_rules! impl_string_id {
    ($t:ty, $name:literal, $check:path) => {
        impl $t {
            /// Wrap an identifier without validating it.
            ///
            /// Use [`Self::parse`] for untrusted input.
            pub fn new(value: impl Into<Cow<'static, str>>) -> Self {
                Self(value.into())
            }

            /// Identifier usable in `const`/`static` items.
            pub const fn from_static(value: &'static str) -> Self {
                Self(Cow::Borrowed(value))
            }

            /// Parse and validate an identifier.
            pub fn parse(value: &str) -> DomainResult<Self> {
                let id = Self(Cow::Owned(value.to_string()));
                id.validate()?;
                Ok(id)
            }

            /// Check the identifier against its naming convention.
            pub fn validate(&self) -> DomainResult<()> {
                if $check(&self.0) {
                    Ok(())
                } else {
                    Err(DomainError::validation(format!(
                        "invalid {}: '{}'",
                        $name, self.0
                    )))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&'static str> for $t {
            fn from(value: &'static str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

impl_string_id!(PrincipalId, "principal id", is_principal_name);
impl_string_id!(RoleId, "role id", is_catalog_name);
impl_string_id!(PermissionId, "permission id", is_catalog_name);
impl_string_id!(RequestId, "request id", is_request_name);

impl RequestId {
    /// Build the identifier for the `sequence`-th request (`REQ-001`, `REQ-002`, ...).
    pub fn from_sequence(sequence: u64) -> Self {
        Self(Cow::Owned(format!("REQ-{sequence:03}")))
    }

    /// Sequence number encoded in the identifier.
    pub fn sequence(&self) -> Option<u64> {
        self.0.strip_prefix("REQ-")?.parse().ok()
    }
}

/// `^[A-Z][A-Z0-9_]*$`
fn is_catalog_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_principal_name(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn is_request_name(s: &str) -> bool {
    s.strip_prefix("REQ-")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
