mod booking_api;
mod helpers;
mod member_api;
mod ride_api;
mod tracking_api;

#[cfg(test)]
mod tests;

use oso::Oso;
use std::time::Duration;

use crate::{api::API, auth::authorizor, db::DynStore, error::Error, relay::LocationRelay};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// The ride lifecycle service. It is the only writer of ride and booking
/// status, and it owns the live location channels of active rides.
pub struct Engine {
    store: DynStore,
    authorizor: Oso,
    relay: LocationRelay,
    store_timeout: Duration,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(store: DynStore) -> Result<Self, Error> {
        Ok(Self {
            store,
            authorizor: authorizor::new()?,
            relay: LocationRelay::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(Error::unauthorized_error())
    }
}

impl API for Engine {}
