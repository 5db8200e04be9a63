use std::sync::Arc;

use foundation::LonLat;
use tokio::sync::OnceCell;

use crate::{
    Attribution, BoundaryConfig, BoundaryDataset, BoundaryFetcher, FetchError, PolygonTest,
    attribute,
};

/// Boundary datasets fetched at most once per cache.
///
/// Concurrent callers share the in-flight download. A failed download is not
/// remembered: the caller gets `None` and a later call tries again.
pub struct BoundaryCache<F: BoundaryFetcher> {
    fetcher: F,
    config: BoundaryConfig,
    world: OnceCell<Arc<BoundaryDataset>>,
    regions: OnceCell<Arc<BoundaryDataset>>,
}

impl<F: BoundaryFetcher> BoundaryCache<F> {
    pub fn new(fetcher: F, config: BoundaryConfig) -> Self {
        Self {
            fetcher,
            config,
            world: OnceCell::new(),
            regions: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn is_loaded(&self) -> bool {
        self.world.initialized() && self.regions.initialized()
    }

    pub async fn world(&self) -> Option<Arc<BoundaryDataset>> {
        load(
            &self.fetcher,
            &self.world,
            &self.config.world_url,
            &self.config.world_name_keys,
        )
        .await
    }

    pub async fn regions(&self) -> Option<Arc<BoundaryDataset>> {
        load(
            &self.fetcher,
            &self.regions,
            &self.config.region_url,
            &self.config.region_name_keys,
        )
        .await
    }

    /// Loads both datasets concurrently and attributes `points`.
    pub async fn attribute<T: PolygonTest + ?Sized>(
        &self,
        points: &[LonLat],
        tester: &T,
    ) -> Attribution {
        let (world, regions) = tokio::join!(self.world(), self.regions());
        attribute(
            points,
            world.as_deref(),
            regions.as_deref(),
            &self.config.region_box,
            tester,
        )
    }
}

async fn load<F: BoundaryFetcher>(
    fetcher: &F,
    cell: &OnceCell<Arc<BoundaryDataset>>,
    url: &str,
    name_keys: &[String],
) -> Option<Arc<BoundaryDataset>> {
    let result = cell
        .get_or_try_init(|| async {
            let text = fetcher.fetch(url).await?;
            let ds = BoundaryDataset::from_geojson_str(&text, name_keys)?;
            tracing::debug!(url, features = ds.len(), "boundary dataset loaded");
            Ok::<_, FetchError>(Arc::new(ds))
        })
        .await;
    match result {
        Ok(ds) => Some(Arc::clone(ds)),
        Err(e) => {
            tracing::warn!(url, error = %e, "boundary dataset unavailable");
            None
        }
    }
}
