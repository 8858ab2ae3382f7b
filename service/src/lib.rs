use broker::Manager;
use config::Config;
use domain::{PrincipalResolver, ServiceAuthenticator};
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state containing only infrastructure concerns.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Manager>,
    pub principal_resolver: Arc<dyn PrincipalResolver>,
    pub service_authenticator: Arc<dyn ServiceAuthenticator>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        app_config: Config,
        broker: Arc<Manager>,
        principal_resolver: Arc<dyn PrincipalResolver>,
        service_authenticator: Arc<dyn ServiceAuthenticator>,
    ) -> Self {
        Self {
            broker,
            principal_resolver,
            service_authenticator,
            config: app_config,
        }
    }

    pub fn broker_ref(&self) -> &Manager {
        self.broker.as_ref()
    }
}
