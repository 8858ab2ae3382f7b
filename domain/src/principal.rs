use crate::error::Error;
use async_trait::async_trait;
use http::HeaderMap;
use log::*;
use std::collections::HashSet;

/// Header the reference resolver reads the user id from.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header the reference resolver reads workspace memberships from
/// (comma-separated workspace ids).
pub const WORKSPACES_HEADER: &str = "x-workspaces";
/// Header the reference resolver reads coarse permissions from
/// (comma-separated).
pub const PERMISSIONS_HEADER: &str = "x-permissions";

/// The authenticated identity of a subscriber, resolved once per request and
/// immutable afterwards. Subscribe connections hold their principal for the
/// stream's lifetime; it is not refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub workspaces: HashSet<String>,
    pub permissions: HashSet<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            workspaces: HashSet::new(),
            permissions: HashSet::new(),
        }
    }

    pub fn with_workspaces<I, S>(mut self, workspaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workspaces = workspaces.into_iter().map(Into::into).collect();
        self
    }

    /// The one gate the broker applies on subscribe: workspace membership.
    pub fn can_read_workspace(&self, workspace: &str) -> bool {
        self.workspaces.contains(workspace)
    }
}

/// Resolves the identity material on an incoming HTTP request to a
/// [`Principal`]. Implementations live outside the broker core; the broker
/// only consumes this interface.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Principal, Error>;
}

/// Reference resolver for development deployments: trusts `X-User-Id`
/// outright and reads workspace memberships and permissions from
/// comma-separated companion headers. A production deployment replaces this
/// with a resolver backed by its identity service.
#[derive(Debug, Default)]
pub struct HeaderPrincipalResolver;

impl HeaderPrincipalResolver {
    pub fn new() -> Self {
        Self
    }
}

fn header_list(headers: &HeaderMap, name: &str) -> HashSet<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PrincipalResolver for HeaderPrincipalResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Principal, Error> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(Error::unauthenticated)?;

        let principal = Principal {
            user_id: user_id.to_string(),
            workspaces: header_list(headers, WORKSPACES_HEADER),
            permissions: header_list(headers, PERMISSIONS_HEADER),
        };

        trace!(
            "Resolved principal {} with {} workspace(s)",
            principal.user_id,
            principal.workspaces.len()
        );
        Ok(principal)
    }
}

/// Test fake: always resolves to the configured principal, or refuses when
/// none is configured.
#[derive(Debug, Default)]
pub struct StaticPrincipalResolver {
    principal: Option<Principal>,
}

impl StaticPrincipalResolver {
    pub fn allowing(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn refusing() -> Self {
        Self { principal: None }
    }
}

#[async_trait]
impl PrincipalResolver for StaticPrincipalResolver {
    async fn resolve(&self, _headers: &HeaderMap) -> Result<Principal, Error> {
        self.principal.clone().ok_or_else(Error::unauthenticated)
    }
}
