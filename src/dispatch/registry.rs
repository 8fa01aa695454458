//! Handler registry: one typed pipeline per request type, keyed by `TypeId`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::behaviors::{TracingBehavior, ValidationBehavior};
use super::pipeline::{Next, PipelineBehavior};
use super::request::{Request, RequestHandler};
use crate::error::{CourierError, CourierResult};
use crate::validation::Validator;

type ErasedPipeline = Box<dyn Any + Send + Sync>;

/// Handler plus its behavior chain, outermost first
pub(crate) struct RequestPipeline<R: Request> {
    handler: Arc<dyn RequestHandler<R>>,
    behaviors: Vec<Arc<dyn PipelineBehavior<R>>>,
}

impl<R: Request> RequestPipeline<R> {
    pub(crate) async fn execute(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> CourierResult<R::Response> {
        Next::new(&self.behaviors, self.handler.as_ref())
            .run(request, cancel)
            .await
    }
}

/// Immutable map from request type to pipeline
pub struct HandlerRegistry {
    pipelines: HashMap<TypeId, ErasedPipeline>,
    request_names: Vec<&'static str>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub(crate) fn pipeline<R: Request>(&self) -> Option<&RequestPipeline<R>> {
        self.pipelines
            .get(&TypeId::of::<R>())
            .and_then(|pipeline| pipeline.downcast_ref::<RequestPipeline<R>>())
    }

    pub fn contains<R: Request>(&self) -> bool {
        self.pipelines.contains_key(&TypeId::of::<R>())
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Registered request type names, sorted
    pub fn request_names(&self) -> &[&'static str] {
        &self.request_names
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("requests", &self.request_names)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct StageOptions {
    tracing: bool,
    validation: bool,
}

struct PendingPipeline<R: Request> {
    handler: Option<Arc<dyn RequestHandler<R>>>,
    validators: Vec<Arc<dyn Validator<R>>>,
    behaviors: Vec<Arc<dyn PipelineBehavior<R>>>,
}

impl<R: Request> Default for PendingPipeline<R> {
    fn default() -> Self {
        Self {
            handler: None,
            validators: Vec::new(),
            behaviors: Vec::new(),
        }
    }
}

struct PendingEntry {
    request_name: &'static str,
    pipeline: Box<dyn Any + Send + Sync>,
    finalize: fn(Box<dyn Any + Send + Sync>, &'static str, StageOptions) -> CourierResult<ErasedPipeline>,
}

fn finalize_pipeline<R: Request>(
    pending: Box<dyn Any + Send + Sync>,
    request_name: &'static str,
    options: StageOptions,
) -> CourierResult<ErasedPipeline> {
    let pending = pending.downcast::<PendingPipeline<R>>().map_err(|_| {
        CourierError::configuration(format!(
            "registry entry for '{request_name}' has an unexpected type"
        ))
    })?;
    let PendingPipeline {
        handler,
        validators,
        behaviors: custom,
    } = *pending;

    let handler = handler.ok_or_else(|| {
        CourierError::configuration(format!(
            "validators or behaviors registered for '{request_name}' without a handler"
        ))
    })?;

    if !options.validation && !validators.is_empty() {
        return Err(CourierError::configuration(format!(
            "validators registered for '{request_name}' but the validation stage is disabled"
        )));
    }

    let mut behaviors: Vec<Arc<dyn PipelineBehavior<R>>> = Vec::with_capacity(custom.len() + 2);
    if options.tracing {
        behaviors.push(Arc::new(TracingBehavior::new()));
    }
    if options.validation {
        behaviors.push(Arc::new(ValidationBehavior::new(validators)));
    }
    behaviors.extend(custom);

    Ok(Box::new(RequestPipeline { handler, behaviors }))
}

fn pending_mut<R: Request>(
    entries: &mut HashMap<TypeId, PendingEntry>,
) -> Option<&mut PendingPipeline<R>> {
    entries
        .entry(TypeId::of::<R>())
        .or_insert_with(|| PendingEntry {
            request_name: R::request_name(),
            pipeline: Box::new(PendingPipeline::<R>::default()),
            finalize: finalize_pipeline::<R>,
        })
        .pipeline
        .downcast_mut::<PendingPipeline<R>>()
}

/// Collects registrations; [`build`](Self::build) checks them and freezes the registry.
///
/// Registration mistakes are recorded and reported together by `build`:
/// a second handler for the same request type, or validators/behaviors for a
/// request type that never gets a handler.
pub struct HandlerRegistryBuilder {
    entries: HashMap<TypeId, PendingEntry>,
    options: StageOptions,
    errors: Vec<String>,
}

impl Default for HandlerRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            options: StageOptions {
                tracing: true,
                validation: true,
            },
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn handler<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        match pending_mut::<R>(&mut self.entries) {
            Some(pending) if pending.handler.is_some() => self.errors.push(format!(
                "duplicate handler for request type '{}'",
                R::request_name()
            )),
            Some(pending) => pending.handler = Some(Arc::new(handler)),
            None => self.record_type_mismatch::<R>(),
        }
        self
    }

    #[must_use]
    pub fn validator<R, V>(mut self, validator: V) -> Self
    where
        R: Request,
        V: Validator<R>,
    {
        match pending_mut::<R>(&mut self.entries) {
            Some(pending) => pending.validators.push(Arc::new(validator)),
            None => self.record_type_mismatch::<R>(),
        }
        self
    }

    /// Add a custom behavior; custom behaviors run in registration order,
    /// inside the tracing and validation stages.
    #[must_use]
    pub fn behavior<R, B>(mut self, behavior: B) -> Self
    where
        R: Request,
        B: PipelineBehavior<R>,
    {
        match pending_mut::<R>(&mut self.entries) {
            Some(pending) => pending.behaviors.push(Arc::new(behavior)),
            None => self.record_type_mismatch::<R>(),
        }
        self
    }

    #[must_use]
    pub fn with_tracing_stage(mut self, enabled: bool) -> Self {
        self.options.tracing = enabled;
        self
    }

    #[must_use]
    pub fn with_validation_stage(mut self, enabled: bool) -> Self {
        self.options.validation = enabled;
        self
    }

    pub fn build(mut self) -> CourierResult<HandlerRegistry> {
        let mut pipelines = HashMap::with_capacity(self.entries.len());
        let mut request_names = Vec::with_capacity(self.entries.len());

        for (type_id, entry) in self.entries {
            match (entry.finalize)(entry.pipeline, entry.request_name, self.options) {
                Ok(pipeline) => {
                    pipelines.insert(type_id, pipeline);
                    request_names.push(entry.request_name);
                }
                Err(error) => self.errors.push(error.to_string()),
            }
        }

        if !self.errors.is_empty() {
            self.errors.sort();
            return Err(CourierError::configuration(self.errors.join("; ")));
        }

        request_names.sort_unstable();
        debug!(
            handlers = pipelines.len(),
            tracing = self.options.tracing,
            validation = self.options.validation,
            "Handler registry built"
        );

        Ok(HandlerRegistry {
            pipelines,
            request_names,
        })
    }

    fn record_type_mismatch<R: Request>(&mut self) {
        self.errors.push(format!(
            "registry entry for '{}' has an unexpected type",
            R::request_name()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationFailure;
    use async_trait::async_trait;

    struct Ping;

    impl Request for Ping {
        type Response = u32;
    }

    struct Pong;

    impl Request for Pong {
        type Response = u32;
    }

    struct Fixed(u32);

    #[async_trait]
    impl RequestHandler<Ping> for Fixed {
        async fn handle(&self, _request: Ping, _cancel: &CancellationToken) -> CourierResult<u32> {
            Ok(self.0)
        }
    }

    struct AlwaysValid;

    #[async_trait]
    impl Validator<Pong> for AlwaysValid {
        async fn validate(&self, _request: &Pong) -> Vec<ValidationFailure> {
            Vec::new()
        }
    }

    #[async_trait]
    impl Validator<Ping> for AlwaysValid {
        async fn validate(&self, _request: &Ping) -> Vec<ValidationFailure> {
            Vec::new()
        }
    }

    #[test]
    fn test_build_registers_pipeline() {
        let registry = HandlerRegistry::builder()
            .handler::<Ping, _>(Fixed(1))
            .build()
            .unwrap();

        assert!(registry.contains::<Ping>());
        assert!(!registry.contains::<Pong>());
        assert_eq!(registry.len(), 1);
        assert!(registry.pipeline::<Ping>().is_some());
        assert!(registry.request_names()[0].ends_with("Ping"));
    }

    #[test]
    fn test_duplicate_handler_rejected() {
        let error = HandlerRegistry::builder()
            .handler::<Ping, _>(Fixed(1))
            .handler::<Ping, _>(Fixed(2))
            .build()
            .unwrap_err();

        assert_eq!(error.code(), "CONFIGURATION_ERROR");
        assert!(error.to_string().contains("duplicate handler"));
    }

    #[test]
    fn test_validator_without_handler_rejected() {
        let error = HandlerRegistry::builder()
            .handler::<Ping, _>(Fixed(1))
            .validator::<Pong, _>(AlwaysValid)
            .build()
            .unwrap_err();

        assert!(error.to_string().contains("without a handler"));
    }

    #[test]
    fn test_validators_need_validation_stage() {
        let error = HandlerRegistry::builder()
            .handler::<Ping, _>(Fixed(1))
            .validator::<Ping, _>(AlwaysValid)
            .with_validation_stage(false)
            .build()
            .unwrap_err();

        assert!(error.to_string().contains("validation stage is disabled"));
    }

    #[tokio::test]
    async fn test_pipeline_executes_handler() {
        let registry = HandlerRegistry::builder()
            .handler::<Ping, _>(Fixed(9))
            .build()
            .unwrap();

        let pipeline = registry.pipeline::<Ping>().unwrap();
        let result = pipeline.execute(Ping, &CancellationToken::new()).await;
        assert_eq!(result, Ok(9));
    }
}
