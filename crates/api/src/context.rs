use accessgate_core::PrincipalId;
use accessgate_infra::OperationContext;

/// Caller identity for a request, established by the upstream gateway.
///
/// This is immutable and must be present for all engine routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    principal_id: PrincipalId,
    source_address: Option<String>,
}

impl CallerContext {
    pub fn new(principal_id: PrincipalId, source_address: Option<String>) -> Self {
        Self {
            principal_id,
            source_address,
        }
    }

    pub fn principal_id(&self) -> &PrincipalId {
        &self.principal_id
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }

    /// Context handed to the engine (actor + audit source).
    pub fn operation(&self) -> OperationContext {
        OperationContext {
            actor: self.principal_id.clone(),
            source_address: self.source_address.clone(),
        }
    }
}
