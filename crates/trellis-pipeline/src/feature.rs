//! Feature trait and typed feature keys.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::errors::HandlerError;
use crate::handler::{EventHandler, FnHandler, handler_fn};
use crate::hub::Registration;
use crate::types::{EventContext, EventKind};

/// Typed capability token identifying one feature type.
///
/// The key's name must be unique within a hub; the type parameter lets
/// [`PipelineHub::lookup`](crate::PipelineHub::lookup) return the concrete
/// feature.
pub struct FeatureKey<F> {
    name: &'static str,
    _marker: PhantomData<fn() -> F>,
}

impl<F> FeatureKey<F> {
    /// Create a key. Usable in `const` position.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<F> Clone for FeatureKey<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FeatureKey<F> {}

impl<F> fmt::Debug for FeatureKey<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FeatureKey").field(&self.name).finish()
    }
}

/// An installable unit of cross-cutting behavior.
///
/// The hub builds `Config` from its `Default`, lets the installer adjust
/// it, calls [`create`](Feature::create), then
/// [`register`](Feature::register) so the feature can attach handlers.
pub trait Feature: Send + Sync + Sized + 'static {
    /// Per-feature configuration.
    type Config: Default;

    /// Unique key for install-time deduplication and later lookup.
    const KEY: FeatureKey<Self>;

    /// Build the feature from its configuration.
    fn create(config: Self::Config) -> Self;

    /// Attach handlers for any subset of event kinds.
    fn register(feature: &Arc<Self>, registrar: &mut HandlerRegistrar<'_>);

    /// Release owned resources. Called once on engine close.
    fn shutdown(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Registration handle given to [`Feature::register`].
///
/// Every handler attached through it is tagged with the owning feature key.
pub struct HandlerRegistrar<'a> {
    feature: &'static str,
    handlers: &'a mut HashMap<EventKind, Vec<Registration>>,
}

impl<'a> HandlerRegistrar<'a> {
    pub(crate) fn new(
        feature: &'static str,
        handlers: &'a mut HashMap<EventKind, Vec<Registration>>,
    ) -> Self {
        Self { feature, handlers }
    }

    /// Attach a handler for one event kind, after any existing ones.
    pub fn on(&mut self, kind: EventKind, handler: impl EventHandler + 'static) {
        debug!(feature = self.feature, event = %kind, "registering handler");
        self.handlers.entry(kind).or_default().push(Registration {
            feature: self.feature,
            handler: Arc::new(handler),
        });
    }

    /// Attach a synchronous closure for one event kind.
    pub fn on_fn<F>(&mut self, kind: EventKind, f: F)
    where
        F: Fn(&EventContext) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler: FnHandler<F> = handler_fn(f);
        self.on(kind, handler);
    }

    /// Key name of the feature doing the registering.
    #[must_use]
    pub fn feature(&self) -> &'static str {
        self.feature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    const KEY: FeatureKey<Marker> = FeatureKey::new("marker");

    #[test]
    fn key_is_const_and_copy() {
        let copy = KEY;
        assert_eq!(copy.name(), "marker");
        assert_eq!(format!("{KEY:?}"), "FeatureKey(\"marker\")");
    }

    #[test]
    fn registrar_appends_in_order() {
        let mut table = HashMap::new();
        let mut registrar = HandlerRegistrar::new("a", &mut table);
        registrar.on_fn(EventKind::BeforeNode, |_| Ok(()));
        registrar.on_fn(EventKind::BeforeNode, |_| Ok(()));
        registrar.on_fn(EventKind::AfterNode, |_| Ok(()));
        assert_eq!(registrar.feature(), "a");

        assert_eq!(table[&EventKind::BeforeNode].len(), 2);
        assert_eq!(table[&EventKind::AfterNode].len(), 1);
        assert!(table[&EventKind::BeforeNode].iter().all(|r| r.feature == "a"));
    }
}
