//! Authorization rules the broker applies on subscribe and publish.

use crate::authenticator::ServiceAuthenticator;
use crate::error::Error;
use crate::principal::Principal;
use broker::channel::Channel;
use log::*;
use std::collections::HashSet;

/// Filter requested channel names down to the set this principal may
/// subscribe to. Malformed names and channels outside the principal's
/// workspaces are silently dropped, and duplicates collapse to their first
/// occurrence. An empty result is not an error; the connection proceeds and
/// receives only heartbeats.
pub fn subscribable_channels<I>(principal: &Principal, requested: I) -> Vec<Channel>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut authorized = Vec::new();

    for name in requested {
        let channel = match name.parse::<Channel>() {
            Ok(channel) => channel,
            Err(e) => {
                debug!("Dropping malformed channel '{name}': {e}");
                continue;
            }
        };
        if !principal.can_read_workspace(channel.workspace()) {
            debug!(
                "Dropping channel {channel} for user {}: not a workspace member",
                principal.user_id
            );
            continue;
        }
        if seen.insert(channel.name().to_string()) {
            authorized.push(channel);
        }
    }

    authorized
}

/// Publish-side gate: the declared service must equal the channel's service
/// component, and the authenticator must accept the credential. Both
/// failures surface as `unauthorized_service`.
pub async fn authorize_publish(
    authenticator: &dyn ServiceAuthenticator,
    token: &str,
    declared_service: &str,
    channel: &Channel,
) -> Result<(), Error> {
    if declared_service != channel.service() {
        warn!(
            "Publish rejected: declared service '{declared_service}' does not match channel {channel}"
        );
        return Err(Error::unauthorized_service());
    }
    authenticator.authorize(token, declared_service, channel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::{AllowAllAuthenticator, TokenMapAuthenticator};
    use std::collections::HashMap;

    fn principal() -> Principal {
        Principal::new("user123").with_workspaces(["workspace123"])
    }

    fn requested(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keeps_authorized_channels_in_request_order() {
        let channels = subscribable_channels(
            &principal(),
            requested(&[
                "logs:etl:workspace123:workflow456",
                "logs:faas:workspace123",
            ]),
        );
        let names: Vec<&str> = channels.iter().map(Channel::name).collect();
        assert_eq!(
            names,
            vec!["logs:etl:workspace123:workflow456", "logs:faas:workspace123"]
        );
    }

    #[test]
    fn test_drops_foreign_workspaces_silently() {
        let channels = subscribable_channels(
            &principal(),
            requested(&["logs:etl:workspaceZ", "logs:etl:workspace123"]),
        );
        let names: Vec<&str> = channels.iter().map(Channel::name).collect();
        assert_eq!(names, vec!["logs:etl:workspace123"]);
    }

    #[test]
    fn test_drops_malformed_names_silently() {
        let channels = subscribable_channels(
            &principal(),
            requested(&["metrics:etl:workspace123", "logs::workspace123", ""]),
        );
        assert!(channels.is_empty());
    }

    #[test]
    fn test_deduplicates_repeated_names() {
        let channels = subscribable_channels(
            &principal(),
            requested(&["logs:etl:workspace123", "logs:etl:workspace123"]),
        );
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn test_empty_authorized_set_is_not_an_error() {
        let channels = subscribable_channels(&principal(), requested(&["logs:etl:workspaceZ"]));
        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn test_publish_requires_declared_service_to_match_channel() {
        let authenticator = AllowAllAuthenticator;
        let channel: Channel = "logs:etl:workspace123".parse().unwrap();

        let mismatch = authorize_publish(&authenticator, "any", "faas", &channel).await;
        assert!(mismatch.is_err());

        let matching = authorize_publish(&authenticator, "any", "etl", &channel).await;
        assert!(matching.is_ok());
    }

    #[tokio::test]
    async fn test_publish_consults_the_authenticator() {
        let authenticator = TokenMapAuthenticator::new(HashMap::from([(
            "l5-etl-token".to_string(),
            "etl".to_string(),
        )]));
        let channel: Channel = "logs:etl:workspace123".parse().unwrap();

        let ok = authorize_publish(&authenticator, "l5-etl-token", "etl", &channel).await;
        assert!(ok.is_ok());

        let bad_token = authorize_publish(&authenticator, "wrong", "etl", &channel).await;
        assert!(bad_token.is_err());
    }
}
