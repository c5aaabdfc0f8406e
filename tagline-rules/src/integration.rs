//! Integration registry.
//!
//! Integrations are vendor extensions invoked by actions. An integration may
//! be registered ready, or pending behind a future that resolves once the
//! extension has initialized. Every caller waiting on the same pending
//! integration shares one resolution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::IntegrationError;

/// A live integration instance exposing named methods.
#[async_trait]
pub trait Integration: Send + Sync {
    async fn invoke(&self, method: &str, settings: Value) -> Result<(), IntegrationError>;
}

pub type IntegrationHandle = Arc<dyn Integration>;
type Resolution = Shared<BoxFuture<'static, Result<IntegrationHandle, IntegrationError>>>;

#[derive(Clone, Default)]
pub struct IntegrationRegistry {
    entries: Arc<RwLock<HashMap<String, Resolution>>>,
}

impl std::fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("IntegrationRegistry")
            .field("ids", &ids)
            .finish()
    }
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already initialized instance.
    pub fn register(&self, id: impl Into<String>, instance: IntegrationHandle) {
        self.insert(id.into(), future::ready(Ok(instance)).boxed());
    }

    /// Registers an instance that becomes available when `init` resolves.
    pub fn register_pending<F>(&self, id: impl Into<String>, init: F)
    where
        F: Future<Output = Result<IntegrationHandle, IntegrationError>> + Send + 'static,
    {
        self.insert(id.into(), init.boxed());
    }

    fn insert(&self, id: String, resolution: BoxFuture<'static, Result<IntegrationHandle, IntegrationError>>) {
        debug!(integration = %id, "registering integration");
        self.entries.write().insert(id, resolution.shared());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Resolves `id` to its instance, waiting for pending initialization.
    pub fn get_by_id(&self, id: &str) -> BoxFuture<'static, Result<IntegrationHandle, IntegrationError>> {
        match self.entries.read().get(id) {
            Some(resolution) => resolution.clone().boxed(),
            None => future::ready(Err(IntegrationError::UnknownIntegration(id.to_string()))).boxed(),
        }
    }

    /// Resolves `id` and invokes `method` on it.
    pub async fn invoke(&self, id: &str, method: &str, settings: Value) -> Result<(), IntegrationError> {
        let instance = self.get_by_id(id).await?;
        instance.invoke(method, settings).await
    }
}

type MethodFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), IntegrationError>> + Send + Sync>;

/// Integration assembled from one closure per method.
#[derive(Clone)]
pub struct MethodIntegration {
    name: String,
    methods: HashMap<String, MethodFn>,
}

impl std::fmt::Debug for MethodIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("MethodIntegration")
            .field("name", &self.name)
            .field("methods", &methods)
            .finish()
    }
}

impl MethodIntegration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), IntegrationError>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |settings: Value| handler(settings).boxed()));
        self
    }
}

#[async_trait]
impl Integration for MethodIntegration {
    async fn invoke(&self, method: &str, settings: Value) -> Result<(), IntegrationError> {
        let handler = self
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| IntegrationError::UnknownMethod {
                integration: self.name.clone(),
                method: method.to_string(),
            })?;
        handler(settings).await
    }
}
