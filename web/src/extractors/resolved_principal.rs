use crate::{AppState, Error};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::principal::Principal;
use log::*;

/// Extractor that runs the configured [`domain::PrincipalResolver`] against
/// the request headers. Rejection is a 401 with the `unauthenticated` reason
/// token; handlers receive a fully resolved [`Principal`].
pub(crate) struct ResolvedPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for ResolvedPrincipal {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let principal = state.principal_resolver.resolve(&parts.headers).await?;
        trace!(
            "Resolved principal {} for {}",
            principal.user_id,
            parts.uri.path()
        );
        Ok(ResolvedPrincipal(principal))
    }
}
