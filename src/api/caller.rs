//! Caller identity as resolved by the upstream auth layer.
//!
//! Authentication happens before requests reach this service. The auth
//! proxy forwards the resolved identity in two headers:
//!
//! - `x-caller-id`: numeric id of the acting user or store.
//! - `x-caller-role`: `user`, `store`, `admin` or `service` (the auth
//!   layer itself, for login throttling).
//!
//! Handlers trust these values and perform their own ownership checks on
//! top.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::{StoreId, UserId};
use crate::error::LedgerError;

/// Header carrying the caller's id.
pub const CALLER_ID_HEADER: &str = "x-caller-id";
/// Header carrying the caller's role.
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

/// Role of the acting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// End user (EcoPoints member, Waylo guide or client).
    User,
    /// Partner store.
    Store,
    /// Operator.
    Admin,
    /// The upstream auth layer acting on its own behalf.
    Service,
}

/// Resolved caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// Raw id; its meaning depends on `role`.
    pub id: i64,
    /// Role.
    pub role: Role,
}

impl Caller {
    /// Returns the caller as a user.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] for any other role.
    pub fn user(&self) -> Result<UserId, LedgerError> {
        match self.role {
            Role::User => Ok(UserId::new(self.id)),
            _ => Err(LedgerError::Forbidden("user role required".to_string())),
        }
    }

    /// Returns the caller as a store.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] for any other role.
    pub fn store(&self) -> Result<StoreId, LedgerError> {
        match self.role {
            Role::Store => Ok(StoreId::new(self.id)),
            _ => Err(LedgerError::Forbidden("store role required".to_string())),
        }
    }

    /// Requires the admin role.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] for any other role.
    pub fn admin(&self) -> Result<(), LedgerError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(LedgerError::Forbidden("admin role required".to_string())),
        }
    }

    /// Requires the auth layer's service role (or an admin).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Forbidden`] for any other role.
    pub fn trusted_service(&self) -> Result<(), LedgerError> {
        match self.role {
            Role::Service | Role::Admin => Ok(()),
            _ => Err(LedgerError::Forbidden("service role required".to_string())),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        };
        let id = header(CALLER_ID_HEADER)
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| LedgerError::Forbidden("missing or invalid caller id".to_string()))?;
        let role = match header(CALLER_ROLE_HEADER) {
            Some("user") => Role::User,
            Some("store") => Role::Store,
            Some("admin") => Role::Admin,
            Some("service") => Role::Service,
            _ => {
                return Err(LedgerError::Forbidden(
                    "missing or invalid caller role".to_string(),
                ));
            }
        };
        Ok(Self { id, role })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(id: Option<&str>, role: Option<&str>) -> Result<Caller, LedgerError> {
        let mut builder = Request::builder().uri("/");
        if let Some(id) = id {
            builder = builder.header(CALLER_ID_HEADER, id);
        }
        if let Some(role) = role {
            builder = builder.header(CALLER_ROLE_HEADER, role);
        }
        let Ok(request) = builder.body(()) else {
            panic!("request builds");
        };
        let (mut parts, ()) = request.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn resolves_role_and_id() {
        let Ok(caller) = extract(Some("42"), Some("store")).await else {
            panic!("caller resolves");
        };
        assert_eq!(caller.store().ok(), Some(StoreId::new(42)));
        assert!(matches!(caller.user(), Err(LedgerError::Forbidden(_))));
    }

    #[tokio::test]
    async fn missing_headers_are_forbidden() {
        assert!(matches!(extract(None, Some("user")).await, Err(LedgerError::Forbidden(_))));
        assert!(matches!(extract(Some("1"), Some("root")).await, Err(LedgerError::Forbidden(_))));
        assert!(matches!(extract(Some("x"), Some("user")).await, Err(LedgerError::Forbidden(_))));
    }

    #[tokio::test]
    async fn only_service_and_admin_are_trusted() {
        let Ok(service) = extract(Some("0"), Some("service")).await else {
            panic!("caller resolves");
        };
        assert!(service.trusted_service().is_ok());
        assert!(matches!(service.user(), Err(LedgerError::Forbidden(_))));

        let Ok(user) = extract(Some("7"), Some("user")).await else {
            panic!("caller resolves");
        };
        assert!(matches!(user.trusted_service(), Err(LedgerError::Forbidden(_))));
    }
}
