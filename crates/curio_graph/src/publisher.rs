// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed event hub with string-named channels.
//!
//! Registries, the property store and the state machine all publish through
//! [`Publisher`]. Subscribers are plain closures invoked synchronously in
//! subscription order; emission works on a snapshot of the subscriber list,
//! so subscribing or unsubscribing from inside a callback never affects the
//! pass that is currently running.

use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use uuid::Uuid;

/// Handle identifying a single subscription, returned by
/// [`Publisher::on`]/[`Publisher::once`] and consumed by [`Publisher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random subscription ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event that can be dispatched through a [`Publisher`].
pub trait Event {
    /// Name of the channel this event dispatches on.
    fn channel(&self) -> &str;
}

type Callback<E> = Rc<dyn Fn(&E)>;

struct Subscriber<E> {
    id: SubscriptionId,
    callback: Callback<E>,
    once: bool,
}

impl<E> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Rc::clone(&self.callback),
            once: self.once,
        }
    }
}

/// Error raised by publisher operations
#[derive(Debug, Error)]
pub enum PublisherError {
    /// Channel was never declared on a strict publisher
    #[error("Unknown event type: {0}")]
    UnknownEvent(String),
}

/// Single-threaded event hub mapping channel names to subscriber lists.
///
/// A publisher is strict by default: channels must be declared with
/// [`Publisher::add_event`] before anything may subscribe to or emit on them.
/// [`Publisher::lenient`] disables the check for hubs whose channel set is
/// open-ended (registries create one channel per type name).
pub struct Publisher<E> {
    channels: RefCell<IndexMap<String, Vec<Subscriber<E>>>>,
    known: RefCell<IndexSet<String>>,
    strict: bool,
}

impl<E: Event> Publisher<E> {
    /// Create a strict publisher: channels must be declared before use
    pub fn new() -> Self {
        Self {
            channels: RefCell::new(IndexMap::new()),
            known: RefCell::new(IndexSet::new()),
            strict: true,
        }
    }

    /// Create a lenient publisher that accepts undeclared channels
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::new()
        }
    }

    /// Declare a channel name
    pub fn add_event(&self, channel: impl Into<String>) {
        self.known.borrow_mut().insert(channel.into());
    }

    /// Declare several channel names at once
    pub fn add_events<I, S>(&self, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known = self.known.borrow_mut();
        for channel in channels {
            known.insert(channel.into());
        }
    }

    /// Check whether a channel has been declared
    pub fn has_event(&self, channel: &str) -> bool {
        self.known.borrow().contains(channel)
    }

    fn check(&self, channel: &str) -> Result<(), PublisherError> {
        if self.strict && !self.has_event(channel) {
            return Err(PublisherError::UnknownEvent(channel.to_string()));
        }
        Ok(())
    }

    /// Subscribe a callback to a channel
    pub fn on(
        &self,
        channel: &str,
        callback: impl Fn(&E) + 'static,
    ) -> Result<SubscriptionId, PublisherError> {
        self.subscribe(channel, Rc::new(callback), false)
    }

    /// Subscribe a callback that is removed after its first invocation
    pub fn once(
        &self,
        channel: &str,
        callback: impl Fn(&E) + 'static,
    ) -> Result<SubscriptionId, PublisherError> {
        self.subscribe(channel, Rc::new(callback), true)
    }

    fn subscribe(
        &self,
        channel: &str,
        callback: Callback<E>,
        once: bool,
    ) -> Result<SubscriptionId, PublisherError> {
        self.check(channel)?;
        let id = SubscriptionId::new();
        self.channels
            .borrow_mut()
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, callback, once });
        Ok(id)
    }

    /// Remove a subscription; returns whether it was found
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut channels = self.channels.borrow_mut();
        for subscribers in channels.values_mut() {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            if subscribers.len() != before {
                return true;
            }
        }
        false
    }

    /// Emit an event on the channel named by [`Event::channel`]
    pub fn emit(&self, event: &E) -> Result<(), PublisherError> {
        let channel = event.channel().to_string();
        self.emit_on(&channel, event)
    }

    /// Emit an event on an explicit channel.
    ///
    /// Used where one event value multiplexes over two channels, such as tag
    /// events dispatching on both `"tag"` and the tag name itself.
    pub fn emit_on(&self, channel: &str, event: &E) -> Result<(), PublisherError> {
        self.check(channel)?;

        // Snapshot before invoking: callbacks may subscribe/unsubscribe
        // without affecting this pass.
        let snapshot: Vec<Subscriber<E>> = self
            .channels
            .borrow()
            .get(channel)
            .cloned()
            .unwrap_or_default();

        let mut fired_once = Vec::new();
        for subscriber in &snapshot {
            (subscriber.callback)(event);
            if subscriber.once {
                fired_once.push(subscriber.id);
            }
        }

        if !fired_once.is_empty() {
            let mut channels = self.channels.borrow_mut();
            if let Some(subscribers) = channels.get_mut(channel) {
                subscribers.retain(|s| !fired_once.contains(&s.id));
            }
        }

        Ok(())
    }

    /// Number of live subscriptions on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .borrow()
            .get(channel)
            .map_or(0, Vec::len)
    }
}

impl<E: Event> Default for Publisher<E> {
    fn default() -> Self {
        Self::new()
    }
}
