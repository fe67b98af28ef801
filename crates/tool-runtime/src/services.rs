//! The shared, process-wide services every tool runs against.

use std::sync::Arc;

use canary_catalog::TagCatalogIndex;
use canary_core::{CanaryError, Config};
use canary_historian::{CanaryClient, HistorianTransport, SizeGuard};
use canary_resolver::{TagResolver, TimeseriesOrchestrator};

pub struct CanaryServices {
    config: Config,
    orchestrator: Arc<TimeseriesOrchestrator>,
}

impl CanaryServices {
    /// Wire services over an explicit transport (tests use a scripted one).
    pub fn new(
        config: Config,
        catalog: TagCatalogIndex,
        transport: Arc<dyn HistorianTransport>,
    ) -> Self {
        let client = CanaryClient::with_transport(&config, transport);
        Self::assemble(config, catalog, client)
    }

    /// Wire services over HTTP to the configured historian.
    pub fn connect(config: Config, catalog: TagCatalogIndex) -> Result<Self, CanaryError> {
        let client = CanaryClient::connect(&config)?;
        Ok(Self::assemble(config, catalog, client))
    }

    fn assemble(config: Config, catalog: TagCatalogIndex, client: CanaryClient) -> Self {
        let resolver = TagResolver::new(Arc::new(catalog), client, config.resolver.clone());
        let orchestrator = TimeseriesOrchestrator::new(Arc::new(resolver), config.query.clone());
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &TimeseriesOrchestrator {
        &self.orchestrator
    }

    pub fn resolver(&self) -> &TagResolver {
        self.orchestrator.resolver()
    }

    pub fn client(&self) -> &CanaryClient {
        self.resolver().client()
    }

    pub fn catalog(&self) -> &TagCatalogIndex {
        self.resolver().catalog()
    }

    /// Final size check applied to every tool response.
    pub fn guard(&self) -> SizeGuard {
        self.client().core().guard()
    }
}
