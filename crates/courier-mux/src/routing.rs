//! Routing table: static defaults plus learned routes
//!
//! Resolution order for an outgoing envelope:
//! 1. component-addressed `to` routes directly to that component,
//! 2. explicit connection id in the envelope context,
//! 3. learned route for the `to` address,
//! 4. per-protocol default routing,
//! 5. the default connection.
//! An envelope that falls through every rung is the caller's to drop.

use courier_types::{Address, ComponentId, Envelope};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

/// Which rung of the resolution ladder produced a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    Direct,
    Context,
    Learned,
    DefaultRouting,
    DefaultConnection,
}

#[derive(Debug)]
pub struct RoutingTable {
    default_routing: HashMap<ComponentId, ComponentId>,
    default_connection: Option<ComponentId>,
    // Written by the receive loop, read by the send loop.
    learned: DashMap<Address, ComponentId>,
}

impl RoutingTable {
    pub fn new(
        default_routing: HashMap<ComponentId, ComponentId>,
        default_connection: Option<ComponentId>,
    ) -> Self {
        Self {
            default_routing,
            default_connection,
            learned: DashMap::new(),
        }
    }

    pub fn default_connection(&self) -> Option<&ComponentId> {
        self.default_connection.as_ref()
    }

    /// Record that envelopes from `address` arrived over `connection_id`.
    /// Later observations overwrite earlier ones.
    pub fn learn(&self, address: Address, connection_id: ComponentId) {
        debug!(address = %address, connection_id = %connection_id, "learned route");
        self.learned.insert(address, connection_id);
    }

    pub fn learned_route(&self, address: &Address) -> Option<ComponentId> {
        self.learned.get(address).map(|entry| entry.value().clone())
    }

    /// Resolve the connection an envelope should leave on, walking the
    /// ladder top to bottom. `protocol_id` is the concrete protocol id the
    /// envelope's specification id maps to.
    pub fn resolve(
        &self,
        envelope: &Envelope,
        protocol_id: &ComponentId,
    ) -> Option<(ComponentId, RouteSource)> {
        if let Some(component) = envelope.to().as_component_id() {
            return Some((component, RouteSource::Direct));
        }
        if let Some(connection_id) = envelope.connection_id() {
            return Some((connection_id.clone(), RouteSource::Context));
        }
        if let Some(connection_id) = self.learned_route(envelope.to()) {
            return Some((connection_id, RouteSource::Learned));
        }
        if let Some(connection_id) = self.default_routing.get(protocol_id) {
            return Some((connection_id.clone(), RouteSource::DefaultRouting));
        }
        self.default_connection
            .clone()
            .map(|connection_id| (connection_id, RouteSource::DefaultConnection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::EnvelopeContext;

    fn component(name: &str) -> ComponentId {
        ComponentId::new("courier", name, "0.1.0").unwrap()
    }

    fn protocol() -> ComponentId {
        ComponentId::new("courier", "default", "1.0.0").unwrap()
    }

    fn agent_envelope(to: &str) -> Envelope {
        Envelope::new(
            Address::new(to),
            Address::new("sender"),
            protocol(),
            vec![],
        )
    }

    fn table_with_defaults() -> RoutingTable {
        let mut default_routing = HashMap::new();
        default_routing.insert(protocol(), component("proto-conn"));
        RoutingTable::new(default_routing, Some(component("default-conn")))
    }

    #[test]
    fn component_recipient_routes_directly() {
        let table = table_with_defaults();
        let envelope = agent_envelope("courier/skill:0.1.0");
        let (id, source) = table.resolve(&envelope, &protocol()).unwrap();
        assert_eq!(id, component("skill"));
        assert_eq!(source, RouteSource::Direct);
    }

    #[test]
    fn context_beats_learned_and_defaults() {
        let table = table_with_defaults();
        table.learn(Address::new("alice"), component("learned-conn"));
        let envelope = agent_envelope("alice")
            .with_context(EnvelopeContext::with_connection_id(component("ctx-conn")))
            .unwrap();
        let (id, source) = table.resolve(&envelope, &protocol()).unwrap();
        assert_eq!(id, component("ctx-conn"));
        assert_eq!(source, RouteSource::Context);
    }

    #[test]
    fn learned_beats_default_routing() {
        let table = table_with_defaults();
        table.learn(Address::new("alice"), component("learned-conn"));
        let (id, source) = table.resolve(&agent_envelope("alice"), &protocol()).unwrap();
        assert_eq!(id, component("learned-conn"));
        assert_eq!(source, RouteSource::Learned);
    }

    #[test]
    fn default_routing_beats_default_connection() {
        let table = table_with_defaults();
        let (id, source) = table.resolve(&agent_envelope("alice"), &protocol()).unwrap();
        assert_eq!(id, component("proto-conn"));
        assert_eq!(source, RouteSource::DefaultRouting);
    }

    #[test]
    fn falls_back_to_default_connection() {
        let table = table_with_defaults();
        let other_protocol = component("other-protocol");
        let (id, source) = table
            .resolve(&agent_envelope("alice"), &other_protocol)
            .unwrap();
        assert_eq!(id, component("default-conn"));
        assert_eq!(source, RouteSource::DefaultConnection);
    }

    #[test]
    fn unresolvable_without_any_default() {
        let table = RoutingTable::new(HashMap::new(), None);
        assert!(table.resolve(&agent_envelope("alice"), &protocol()).is_none());
    }

    #[test]
    fn later_observations_overwrite_learned_routes() {
        let table = table_with_defaults();
        table.learn(Address::new("alice"), component("first"));
        table.learn(Address::new("alice"), component("second"));
        assert_eq!(
            table.learned_route(&Address::new("alice")),
            Some(component("second"))
        );
    }
}
