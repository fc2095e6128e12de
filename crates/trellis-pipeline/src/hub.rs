//! Feature registry and ordered event dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::errors::{HandlerError, PipelineError};
use crate::feature::{Feature, FeatureKey, HandlerRegistrar};
use crate::handler::EventHandler;
use crate::types::{EventContext, EventKind};

/// One handler, tagged with the feature that registered it.
pub(crate) struct Registration {
    pub(crate) feature: &'static str,
    pub(crate) handler: Arc<dyn EventHandler>,
}

type ShutdownFn = Box<dyn Fn() -> Result<(), HandlerError> + Send + Sync>;

struct Installed {
    key: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
    shutdown: ShutdownFn,
}

/// Registry of installed features and their event handlers.
///
/// Mutable only through [`install`](Self::install), which takes `&mut self`;
/// the orchestrator freezes the hub behind an `Arc` once building is done,
/// so nothing can be registered or removed while runs are in flight.
#[derive(Default)]
pub struct PipelineHub {
    handlers: HashMap<EventKind, Vec<Registration>>,
    features: Vec<Installed>,
}

impl PipelineHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a feature.
    ///
    /// Builds `F::Config` from its default, applies `configure`, creates the
    /// feature, and lets it register its handlers. Fails if a feature with
    /// the same key is already installed.
    pub fn install<F: Feature>(
        &mut self,
        configure: impl FnOnce(&mut F::Config),
    ) -> Result<Arc<F>, PipelineError> {
        let key = F::KEY.name();
        if self.features.iter().any(|f| f.key == key) {
            return Err(PipelineError::DuplicateFeature(key.to_owned()));
        }

        let mut config = F::Config::default();
        configure(&mut config);
        let feature = Arc::new(F::create(config));

        let mut registrar = HandlerRegistrar::new(key, &mut self.handlers);
        F::register(&feature, &mut registrar);

        let for_shutdown = Arc::clone(&feature);
        self.features.push(Installed {
            key,
            instance: Arc::clone(&feature) as Arc<dyn Any + Send + Sync>,
            shutdown: Box::new(move || for_shutdown.shutdown()),
        });
        debug!(feature = key, "feature installed");
        Ok(feature)
    }

    /// Retrieve the live instance of an installed feature.
    #[must_use]
    pub fn lookup<F: Feature>(&self, key: &FeatureKey<F>) -> Option<Arc<F>> {
        self.features
            .iter()
            .find(|f| f.key == key.name())
            .and_then(|f| Arc::clone(&f.instance).downcast::<F>().ok())
    }

    /// Dispatch an event to every handler registered for its kind.
    ///
    /// Handlers run one at a time in registration order. The first failure
    /// stops the dispatch and is returned.
    #[instrument(skip_all, fields(event = %context.kind(), session_id = context.session_id()))]
    pub async fn dispatch(&self, context: &EventContext) -> Result<(), PipelineError> {
        let kind = context.kind();
        let Some(registrations) = self.handlers.get(&kind) else {
            return Ok(());
        };

        for registration in registrations {
            if let Err(e) = registration.handler.handle(context).await {
                warn!(feature = registration.feature, event = %kind, error = %e, "handler failed");
                return Err(PipelineError::Handler {
                    feature: registration.feature.to_owned(),
                    event: kind,
                    message: e.message,
                });
            }
        }
        Ok(())
    }

    /// Number of handlers registered for an event kind.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Feature keys in install order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.key).collect()
    }

    /// Shut every feature down, most recently installed first.
    ///
    /// All features are attempted; the first failure is returned.
    pub fn shutdown(&self) -> Result<(), PipelineError> {
        let mut first_error = None;
        for installed in self.features.iter().rev() {
            if let Err(e) = (installed.shutdown)() {
                warn!(feature = installed.key, error = %e, "feature shutdown failed");
                if first_error.is_none() {
                    first_error = Some(PipelineError::Shutdown {
                        feature: installed.key.to_owned(),
                        message: e.message,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for PipelineHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHub")
            .field("features", &self.feature_names())
            .field("handler_count", &self.handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
