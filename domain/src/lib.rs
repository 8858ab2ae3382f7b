//! Identity and authorization seams for the log stream broker.
//!
//! The broker core never holds secrets or queries an identity store. Instead
//! it consumes two interfaces defined here:
//!
//! - [`principal::PrincipalResolver`] turns the headers of an incoming
//!   subscribe request into a [`principal::Principal`] (user id, workspace
//!   memberships, coarse permissions).
//! - [`authenticator::ServiceAuthenticator`] decides whether a publishing
//!   service, identified by its token and declared name, may publish to a
//!   channel.
//!
//! Reference implementations suitable for development deployments live next
//! to the traits; production deployments plug in workspace-aware resolvers
//! behind the same seams. [`access`] holds the authorization rules
//! themselves: workspace-gated subscribe filtering and the
//! declared-service-matches-channel publish gate.

pub mod access;
pub mod authenticator;
pub mod error;
pub mod principal;

pub use authenticator::ServiceAuthenticator;
pub use principal::{Principal, PrincipalResolver};
