use crate::{BlobProvider, ProviderError, ProviderResult};
use alloy_eips::eip4844::{kzg_to_versioned_hash, Blob};
use alloy_primitives::B256;
use alloy_rpc_types_beacon::sidecar::{BeaconBlobBundle, BlobData};
use lru::LruCache;
use reqwest::Client;
use std::{num::NonZeroUsize, sync::Arc};
use tokio::sync::Mutex;

/// The size of the blob cache for the provider.
const PROVIDER_BLOB_CACHE_SIZE: usize = 100;

/// An API response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct APIResponse<T> {
    data: T,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct ReducedGenesisData {
    #[serde(rename = "genesis_time")]
    #[serde(with = "alloy_serde::quantity")]
    genesis_time: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct ReducedConfigData {
    #[serde(rename = "SECONDS_PER_SLOT")]
    #[serde(with = "alloy_serde::quantity")]
    seconds_per_slot: u64,
}

/// A [`BlobProvider`] backed by a beacon node, matching sidecars by versioned hash.
#[derive(Debug, Clone)]
pub struct BeaconClientProvider {
    base: String,
    inner: Client,
    /// The cache for blobs of recently queried slots.
    cache: Arc<Mutex<LruCache<B256, Arc<Blob>>>>,
    /// The genesis timestamp for the beacon chain.
    pub genesis_timestamp: u64,
    /// The slot interval for the beacon chain.
    pub slot_interval: u64,
}

impl BeaconClientProvider {
    const SPEC_METHOD: &'static str = "eth/v1/config/spec";
    const GENESIS_METHOD: &'static str = "eth/v1/beacon/genesis";
    const SIDECARS_METHOD_PREFIX: &'static str = "eth/v1/beacon/blob_sidecars";

    /// Creates a new [`BeaconClientProvider`] from the provided base url, querying the slot
    /// configuration of the beacon chain.
    pub async fn new_http(base: reqwest::Url) -> ProviderResult<Self> {
        let mut base = base.to_string();
        if base.ends_with('/') {
            base.remove(base.len() - 1);
        }

        let client = Client::new();
        let config = Self::get::<ReducedConfigData>(&client, &base, Self::SPEC_METHOD).await?;
        let genesis = Self::get::<ReducedGenesisData>(&client, &base, Self::GENESIS_METHOD).await?;
        if config.data.seconds_per_slot == 0 {
            return Err(ProviderError::InvalidBeaconConfig("zero seconds per slot"))
        }

        let capacity = NonZeroUsize::new(PROVIDER_BLOB_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            base,
            inner: client,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            slot_interval: config.data.seconds_per_slot,
            genesis_timestamp: genesis.data.genesis_time,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        client: &Client,
        base: &str,
        method: &str,
    ) -> Result<APIResponse<T>, reqwest::Error> {
        let response = client.get(format!("{base}/{method}")).send().await?.error_for_status()?;
        response.json::<APIResponse<T>>().await
    }

    /// Returns the blobs for the provided slot.
    async fn blobs(&self, slot: u64) -> Result<Vec<BlobData>, reqwest::Error> {
        let url = format!("{}/{}/{}", self.base, Self::SIDECARS_METHOD_PREFIX, slot);
        let response = self.inner.get(&url).send().await?.error_for_status()?;
        let blob_bundle = response.json::<BeaconBlobBundle>().await?;
        Ok(blob_bundle.data)
    }

    /// Returns the beacon slot given a block timestamp.
    const fn slot(&self, block_timestamp: u64) -> ProviderResult<u64> {
        if block_timestamp < self.genesis_timestamp {
            return Err(ProviderError::InvalidBlockTimestamp(
                self.genesis_timestamp,
                block_timestamp,
            ))
        }

        Ok((block_timestamp - self.genesis_timestamp) / self.slot_interval)
    }
}

#[async_trait::async_trait]
impl BlobProvider for BeaconClientProvider {
    async fn blob(&self, block_timestamp: u64, hash: B256) -> ProviderResult<Option<Arc<Blob>>> {
        let mut cache = self.cache.lock().await;
        if let Some(blob) = cache.get(&hash) {
            return Ok(Some(blob.clone()))
        }
        drop(cache);

        let slot = self.slot(block_timestamp)?;
        let sidecars = self.blobs(slot).await?;
        tracing::trace!(target: "mel::providers", slot, count = sidecars.len(), "fetched blob sidecars");

        // cache every blob of the slot.
        let mut found = None;
        let mut cache = self.cache.lock().await;
        for sidecar in sidecars {
            let versioned_hash = kzg_to_versioned_hash(sidecar.kzg_commitment.as_slice());
            let blob = Arc::new(*sidecar.blob);
            if versioned_hash == hash {
                found = Some(blob.clone());
            }
            cache.put(versioned_hash, blob);
        }

        Ok(found)
    }
}
