//! Capability providers: a factory plus the names it depends on.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tessera_core::ServiceAccessor;

use crate::context::{CapabilitySet, Exposed, HostContext};
use crate::name::CapabilityName;

type Factory = Arc<
    dyn Fn(ServiceAccessor, HostContext, CapabilitySet) -> BoxFuture<'static, anyhow::Result<Exposed>>
        + Send
        + Sync,
>;

/// A registrable capability.
///
/// The factory runs once, after every declared dependency's factory, and
/// receives the capabilities initialized before it.
#[derive(Clone)]
pub struct CapabilityProvider {
    dependencies: Vec<CapabilityName>,
    factory: Factory,
}

impl CapabilityProvider {
    /// Provider with no dependencies.
    pub fn new<F, Fut, T>(factory: F) -> Self
    where
        F: Fn(ServiceAccessor, HostContext, CapabilitySet) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<T>>> + Send + 'static,
        T: Any + Send + Sync,
    {
        let factory: Factory = Arc::new(move |services, host, resolved| {
            factory(services, host, resolved)
                .map(|result| result.map(|exposed| exposed as Exposed))
                .boxed()
        });
        Self {
            dependencies: Vec::new(),
            factory,
        }
    }

    /// Declare a dependency. Duplicates are ignored.
    #[must_use]
    pub fn depends_on(mut self, name: CapabilityName) -> Self {
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    /// Declared dependencies, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[CapabilityName] {
        &self.dependencies
    }

    pub(crate) async fn create(
        &self,
        services: ServiceAccessor,
        host: HostContext,
        resolved: CapabilitySet,
    ) -> anyhow::Result<Exposed> {
        (self.factory)(services, host, resolved).await
    }
}

impl fmt::Debug for CapabilityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityProvider")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
