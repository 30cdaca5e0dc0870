//! Routes decoded inbound envelopes to the handler registered for their
//! event code.
//!
//! The handler table is filled once through [`DispatcherBuilder`] and is
//! read-only afterwards, so dispatching needs no locking. Codes without a
//! handler fall through to a default branch that only logs.

use std::collections::HashMap;
use std::fmt;

use crate::{EventPayload, InboundEvent, ProtocolError};

/// A handler for one inbound event code.
pub type Handler = Box<
    dyn Fn(&EventPayload<InboundEvent>) -> Result<(), ProtocolError>
        + Send
        + Sync,
>;

/// What [`Dispatcher::dispatch`] did with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A registered handler ran to completion.
    Handled,
    /// No handler is registered for the code; the envelope was dropped.
    Unhandled,
}

/// Event-code keyed handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<InboundEvent, Handler>,
}

impl Dispatcher {
    /// Starts building a dispatcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Returns `true` if a handler is registered for `event`.
    pub fn has_handler(&self, event: InboundEvent) -> bool {
        self.handlers.contains_key(&event)
    }

    /// Calls the handler registered for the envelope's event code.
    ///
    /// # Errors
    /// Returns whatever the handler returned. An unregistered code is not
    /// an error.
    pub fn dispatch(
        &self,
        payload: &EventPayload<InboundEvent>,
    ) -> Result<Dispatched, ProtocolError> {
        match self.handlers.get(&payload.event) {
            Some(handler) => {
                handler(payload)?;
                Ok(Dispatched::Handled)
            }
            None => {
                tracing::debug!(
                    event = %payload.event,
                    "event has no handler"
                );
                Ok(Dispatched::Unhandled)
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<u16> =
            self.handlers.keys().map(|e| e.code()).collect();
        events.sort_unstable();
        f.debug_struct("Dispatcher").field("events", &events).finish()
    }
}

/// Collects handlers before the dispatcher is frozen.
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<InboundEvent, Handler>,
}

impl DispatcherBuilder {
    /// Registers `handler` for `event`. A later registration for the same
    /// code replaces the earlier one.
    pub fn on<F>(mut self, event: InboundEvent, handler: F) -> Self
    where
        F: Fn(&EventPayload<InboundEvent>) -> Result<(), ProtocolError>
            + Send
            + Sync
            + 'static,
    {
        if self.handlers.insert(event, Box::new(handler)).is_some() {
            tracing::warn!(%event, "replacing previously registered handler");
        }
        self
    }

    /// Freezes the handler table.
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn(&EventPayload<InboundEvent>) -> Result<(), ProtocolError>
    + Send
    + Sync
    + 'static {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_calls_registered_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::builder()
            .on(InboundEvent::Unknown(2000), counting(&calls))
            .build();

        let result = dispatcher
            .dispatch(&EventPayload::new(InboundEvent::Unknown(2000)))
            .unwrap();

        assert_eq!(result, Dispatched::Handled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_unregistered_code_is_unhandled_not_error() {
        let dispatcher = Dispatcher::default();
        let result = dispatcher
            .dispatch(&EventPayload::new(InboundEvent::Pong))
            .unwrap();
        assert_eq!(result, Dispatched::Unhandled);
    }

    #[test]
    fn test_dispatch_init_has_no_default_handler() {
        let dispatcher = Dispatcher::builder().build();
        assert!(!dispatcher.has_handler(InboundEvent::Init));
        let result = dispatcher
            .dispatch(&EventPayload::new(InboundEvent::Init))
            .unwrap();
        assert_eq!(result, Dispatched::Unhandled);
    }

    #[test]
    fn test_dispatch_propagates_handler_error() {
        let dispatcher = Dispatcher::builder()
            .on(InboundEvent::Init, |payload| {
                Err(ProtocolError::Handler {
                    event: payload.event,
                    message: "boom".into(),
                })
            })
            .build();

        let err = dispatcher
            .dispatch(&EventPayload::new(InboundEvent::Init))
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_builder_later_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::builder()
            .on(InboundEvent::Init, counting(&first))
            .on(InboundEvent::Init, counting(&second))
            .build();

        dispatcher
            .dispatch(&EventPayload::new(InboundEvent::Init))
            .unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_lists_registered_codes() {
        let dispatcher = Dispatcher::builder()
            .on(InboundEvent::Init, |_| Ok(()))
            .on(InboundEvent::Pong, |_| Ok(()))
            .build();
        assert_eq!(
            format!("{dispatcher:?}"),
            "Dispatcher { events: [1000, 1001] }"
        );
    }
}
