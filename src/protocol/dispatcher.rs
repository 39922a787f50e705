//! Command dispatcher: routes decoded MRIM packets to per-command session handlers.

use std::collections::HashMap;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::core::packet::Packet;
use crate::engine::Rejection;
use crate::protocol::commands::command_name;

/// Outcome of one command handler.
pub type HandlerResult = std::result::Result<(), Rejection>;

/// Handler entry: borrows the session for the duration of the returned future.
pub type HandlerFn<S> = for<'a> fn(&'a mut S, Packet) -> BoxFuture<'a, HandlerResult>;

struct Route<S> {
    name: &'static str,
    handler: HandlerFn<S>,
}

/// Command-code routing table.
///
/// Built once at startup and shared read-only by every connection. Codes without a route are
/// logged and dropped; a route may be registered as a no-op to silence that.
pub struct Dispatcher<S> {
    routes: HashMap<u32, Route<S>>,
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Dispatcher<S> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register `handler` for `command`, replacing any previous route.
    pub fn register(&mut self, command: u32, name: &'static str, handler: HandlerFn<S>) -> &mut Self {
        self.routes.insert(command, Route { name, handler });
        self
    }

    /// Register a command that is accepted and deliberately ignored.
    pub fn ignore(&mut self, command: u32, name: &'static str) -> &mut Self {
        fn noop<S>(_: &mut S, _: Packet) -> BoxFuture<'_, HandlerResult> {
            Box::pin(async { Ok(()) })
        }
        self.register(command, name, noop::<S>)
    }

    pub fn handles(&self, command: u32) -> bool {
        self.routes.contains_key(&command)
    }

    pub fn route_name(&self, command: u32) -> Option<&'static str> {
        self.routes.get(&command).map(|r| r.name)
    }

    pub async fn dispatch(&self, session: &mut S, packet: Packet) -> HandlerResult {
        let command = packet.command();
        match self.routes.get(&command) {
            Some(route) => {
                debug!(route = route.name, seq = packet.seq(), "dispatching");
                (route.handler)(session, packet).await
            }
            None => {
                warn!(
                    command = %format!("{command:#06x}"),
                    name = command_name(command),
                    "no handler for command, ignoring"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::packet::ProtocolVersion;
    use crate::error::ProtocolError;
    use bytes::Bytes;

    #[derive(Default)]
    struct Counter {
        hits: u32,
    }

    fn bump(counter: &mut Counter, _: Packet) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            counter.hits += 1;
            Ok(())
        })
    }

    fn refuse(_: &mut Counter, _: Packet) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async { Err(Rejection::new(ProtocolError::RateLimited)) })
    }

    fn packet(command: u32) -> Packet {
        Packet::new(command, 1, ProtocolVersion::SERVER, Bytes::new())
    }

    #[tokio::test]
    async fn test_routes_by_command() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register(0x1001, "bump", bump)
            .register(0x1029, "refuse", refuse)
            .ignore(0x1006, "ping");

        let mut counter = Counter::default();
        dispatcher.dispatch(&mut counter, packet(0x1001)).await.unwrap();
        dispatcher.dispatch(&mut counter, packet(0x1006)).await.unwrap();
        assert_eq!(counter.hits, 1);

        let err = dispatcher
            .dispatch(&mut counter, packet(0x1029))
            .await
            .unwrap_err();
        assert!(matches!(err.error, ProtocolError::RateLimited));
        assert_eq!(dispatcher.route_name(0x1006), Some("ping"));
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let dispatcher: Dispatcher<Counter> = Dispatcher::new();
        let mut counter = Counter::default();
        assert!(dispatcher.dispatch(&mut counter, packet(0x7777)).await.is_ok());
        assert!(!dispatcher.handles(0x7777));
    }
}
