//! The `ChainClient` trait — what the engine needs from a chain, abstracted
//! so tests can script one.

use async_trait::async_trait;

use txindex_core::types::{BlockHeader, RawTxRecord};

use crate::error::TransportError;
use crate::transport::Transport;

/// Read access to an EVM chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number the chain reports.
    async fn current_head(&self) -> Result<u64, TransportError>;

    /// Chain id, for startup sanity logging.
    async fn chain_id(&self) -> Result<u64, TransportError>;

    /// Header only — enough for the lineage check.
    async fn fetch_block_header(&self, number: u64)
        -> Result<Option<BlockHeader>, TransportError>;

    /// Header plus raw transaction records ready for validation.
    async fn fetch_block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<(BlockHeader, Vec<RawTxRecord>)>, TransportError>;
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for std::sync::Arc<T> {
    async fn current_head(&self) -> Result<u64, TransportError> {
        (**self).current_head().await
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        (**self).chain_id().await
    }

    async fn fetch_block_header(
        &self,
        number: u64,
    ) -> Result<Option<BlockHeader>, TransportError> {
        (**self).fetch_block_header(number).await
    }

    async fn fetch_block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<(BlockHeader, Vec<RawTxRecord>)>, TransportError> {
        (**self).fetch_block_with_transactions(number).await
    }
}

#[async_trait]
impl ChainClient for Transport {
    async fn current_head(&self) -> Result<u64, TransportError> {
        Transport::current_head(self).await
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        Transport::chain_id(self).await
    }

    async fn fetch_block_header(
        &self,
        number: u64,
    ) -> Result<Option<BlockHeader>, TransportError> {
        Transport::fetch_block_header(self, number).await
    }

    async fn fetch_block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<(BlockHeader, Vec<RawTxRecord>)>, TransportError> {
        Transport::fetch_block_with_transactions(self, number).await
    }
}
