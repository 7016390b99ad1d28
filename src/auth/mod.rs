//! Caller identity resolution.
//!
//! Token verification is an external collaborator: some upstream layer
//! (gateway, JWT middleware) authenticates the request and attaches a
//! [`Caller`] to the request extensions. This module resolves that opaque
//! caller to a buyer `user_role_id` through three sequential guards, each
//! with its own failure, so transports can distinguish "not logged in"
//! from "not a buyer".

use crate::entities::{role, Role, User, UserRole};
use crate::errors::ServiceError;
use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;

/// Header the placeholder transport adapter reads the caller id from.
/// The production deployment replaces [`attach_caller`] with the real
/// token-verifying middleware; services only ever see [`Caller`].
pub const CALLER_HEADER: &str = "x-caller-id";

/// Opaque caller identity attached to a request by the transport layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Caller {
    user_id: Option<i64>,
}

impl Caller {
    pub fn authenticated(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Missing extension means no caller was attached; the services
        // report AuthenticationRequired, not the transport.
        Ok(parts.extensions.get::<Caller>().copied().unwrap_or_default())
    }
}

/// Builds a caller from the raw header value, anonymous when absent or malformed.
pub fn caller_from_header(raw: Option<&str>) -> Caller {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .map(Caller::authenticated)
        .unwrap_or_default()
}

/// Placeholder middleware that attaches the caller identity from a header.
pub async fn attach_caller(mut req: Request, next: Next) -> Response {
    let raw = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let caller = caller_from_header(raw.as_deref());
    req.extensions_mut().insert(caller);
    next.run(req).await
}

/// Resolves callers to buyer role assignments.
#[derive(Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolves the caller to the id of their buyer `user_roles` row.
    ///
    /// Guards, in order: a caller must be attached
    /// (`AuthenticationRequired`), must map to a known active user
    /// (`CallerNotFound`), must have at least one role assignment
    /// (`CallerHasNoRoles`), and one of those assignments must be the
    /// buyer role (`CallerNotBuyer`).
    #[instrument(skip(self))]
    pub async fn resolve_buyer_role(&self, caller: &Caller) -> Result<i64, ServiceError> {
        let user_id = caller
            .user_id()
            .ok_or(ServiceError::AuthenticationRequired)?;

        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ServiceError::CallerNotFound(format!("user {}", user_id)))?;

        let assignments = user.find_related(UserRole).all(&*self.db).await?;
        if assignments.is_empty() {
            return Err(ServiceError::CallerHasNoRoles);
        }

        let role_ids: Vec<i64> = assignments.iter().map(|a| a.role_id).collect();
        let buyer_role = Role::find()
            .filter(role::Column::Id.is_in(role_ids))
            .filter(role::Column::Name.eq(role::BUYER))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::CallerNotBuyer)?;

        assignments
            .iter()
            .find(|a| a.role_id == buyer_role.id)
            .map(|a| a.id)
            .ok_or(ServiceError::CallerNotBuyer)
    }
}
