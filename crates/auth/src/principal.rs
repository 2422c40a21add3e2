//! Principal directory records (human users and service accounts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accessgate_core::{DomainError, DomainResult, PrincipalId};

/// Principal account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalStatus {
    #[default]
    Active,
    /// Temporarily disabled; can be reactivated.
    Suspended,
    /// Offboarded. Terminal.
    Terminated,
}

impl core::fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PrincipalStatus::Active => write!(f, "Active"),
            PrincipalStatus::Suspended => write!(f, "Suspended"),
            PrincipalStatus::Terminated => write!(f, "Terminated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub display_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub status: PrincipalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrincipal {
    pub id: PrincipalId,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl NewPrincipal {
    pub fn new(id: impl Into<PrincipalId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: None,
            department: None,
        }
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

impl Principal {
    pub fn create(new: NewPrincipal, at: DateTime<Utc>) -> DomainResult<Self> {
        new.id.validate()?;

        if new.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        let email = match new.email.map(|e| e.trim().to_lowercase()) {
            Some(e) if e.is_empty() => None,
            Some(e) if !e.contains('@') => {
                return Err(DomainError::validation("invalid email format"));
            }
            other => other,
        };

        Ok(Self {
            id: new.id,
            display_name: new.display_name.trim().to_string(),
            email,
            department: new.department.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            status: PrincipalStatus::Active,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }

    pub fn is_terminated(&self) -> bool {
        self.status == PrincipalStatus::Terminated
    }

    pub fn suspend(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            PrincipalStatus::Active => {
                self.status = PrincipalStatus::Suspended;
                self.updated_at = at;
                Ok(())
            }
            other => Err(DomainError::conflict(format!(
                "principal {} cannot be suspended from status {other}",
                self.id
            ))),
        }
    }

    pub fn reactivate(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            PrincipalStatus::Suspended => {
                self.status = PrincipalStatus::Active;
                self.updated_at = at;
                Ok(())
            }
            other => Err(DomainError::conflict(format!(
                "principal {} cannot be reactivated from status {other}",
                self.id
            ))),
        }
    }

    pub fn terminate(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.is_terminated() {
            return Err(DomainError::conflict(format!(
                "principal {} is already terminated",
                self.id
            )));
        }
        self.status = PrincipalStatus::Terminated;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn john() -> Principal {
        Principal::create(
            NewPrincipal::new("john.doe", "John Doe")
                .email(" John.Doe@Company.com ")
                .department("IT"),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_normalizes_contact_fields() {
        let p = john();
        assert_eq!(p.email.as_deref(), Some("john.doe@company.com"));
        assert_eq!(p.department.as_deref(), Some("IT"));
        assert!(p.is_active());
    }

    #[test]
    fn create_rejects_bad_input() {
        let no_at = Principal::create(NewPrincipal::new("jane", "Jane").email("jane"), Utc::now());
        assert!(matches!(no_at, Err(DomainError::Validation(_))));

        let spaced = Principal::create(NewPrincipal::new("jane smith", "Jane"), Utc::now());
        assert!(matches!(spaced, Err(DomainError::Validation(_))));
    }

    #[test]
    fn status_transitions() {
        let mut p = john();
        p.suspend(Utc::now()).unwrap();
        assert!(p.suspend(Utc::now()).is_err());
        p.reactivate(Utc::now()).unwrap();
        p.terminate(Utc::now()).unwrap();

        assert!(matches!(p.reactivate(Utc::now()), Err(DomainError::Conflict(_))));
        assert!(matches!(p.terminate(Utc::now()), Err(DomainError::Conflict(_))));
    }
}
