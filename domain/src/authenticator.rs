use crate::error::Error;
use async_trait::async_trait;
use broker::channel::Channel;
use std::collections::HashMap;

/// Header publishers carry their service credential in.
pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";

/// Decides whether a publishing service may publish to a channel. The broker
/// consults it with the raw token, the service name the request declared, and
/// the derived target channel; implementations are free to ignore the channel
/// or scope tokens down to individual workspaces.
#[async_trait]
pub trait ServiceAuthenticator: Send + Sync {
    async fn authorize(
        &self,
        token: &str,
        declared_service: &str,
        channel: &Channel,
    ) -> Result<(), Error>;
}

/// Reference authenticator backed by a static token-to-service map from
/// configuration. A token authorizes exactly the service name it is mapped
/// to, for any channel of that service.
#[derive(Debug, Default)]
pub struct TokenMapAuthenticator {
    tokens: HashMap<String, String>,
}

impl TokenMapAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl ServiceAuthenticator for TokenMapAuthenticator {
    async fn authorize(
        &self,
        token: &str,
        declared_service: &str,
        _channel: &Channel,
    ) -> Result<(), Error> {
        match self.tokens.get(token) {
            Some(service) if service == declared_service => Ok(()),
            _ => Err(Error::unauthorized_service()),
        }
    }
}

/// Test fake: accepts every publish.
#[derive(Debug, Default)]
pub struct AllowAllAuthenticator;

#[async_trait]
impl ServiceAuthenticator for AllowAllAuthenticator {
    async fn authorize(
        &self,
        _token: &str,
        _declared_service: &str,
        _channel: &Channel,
    ) -> Result<(), Error> {
        Ok(())
    }
}
