//! Caller identity extraction for the pull endpoint.
//!
//! The TLS-terminating layer authenticates the client certificate and
//! forwards its subject DN in a configurable header. The extractor resolves
//! that identity through the partner registry; requests from an unrecognized
//! identity are rejected before any handler code runs.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::LinkPartner;
use crate::error::AppError;
use crate::server::AppState;

/// The link partner a request is authenticated as.
#[derive(Debug, Clone)]
pub struct AuthenticatedPartner {
    pub partner: LinkPartner,
}

impl FromRequestParts<AppState> for AuthenticatedPartner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_name = state.settings.auth.client_dn_header.as_str();
        let dn = parts
            .headers
            .get(header_name)
            .and_then(|value| value.to_str().ok())
            .filter(|dn| !dn.trim().is_empty())
            .ok_or_else(|| {
                AppError::Auth("Cannot identify caller: no client identity present".to_string())
            })?;

        let partner = state.partner_registry.lookup(dn).ok_or_else(|| {
            tracing::warn!(certificate_dn = %dn, "No link partner registered for identity");
            AppError::Auth(format!("No link partner registered for identity [{dn}]"))
        })?;

        Ok(Self { partner })
    }
}
