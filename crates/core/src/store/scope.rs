use serde::Serialize;

/// Tenant visibility of a query.
///
/// Request handlers pass `Tenant`; pipeline sweeps pass `AllTenants` on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "organization_id", rename_all = "snake_case")]
pub enum TenantScope {
    Tenant(String),
    AllTenants,
}

impl TenantScope {
    pub fn tenant(organization_id: impl Into<String>) -> Self {
        TenantScope::Tenant(organization_id.into())
    }

    /// Organization the query is restricted to, if any.
    pub fn organization_id(&self) -> Option<&str> {
        match self {
            TenantScope::Tenant(id) => Some(id.as_str()),
            TenantScope::AllTenants => None,
        }
    }
}
