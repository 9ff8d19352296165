//! Cached contract descriptor lookup

use super::source::InterfaceSource;
use super::ContractDescriptor;
use crate::error::OperatorResult;

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tracing::info;

/// Resolves addresses to descriptors, parsing each ABI at most once
pub struct InterfaceProvider {
    source: Box<dyn InterfaceSource>,
    cache: DashMap<Address, Arc<ContractDescriptor>>,
}

impl InterfaceProvider {
    pub fn new(source: Box<dyn InterfaceSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    /// Get the descriptor for `address`, fetching it on first use
    pub async fn descriptor(&self, address: Address) -> OperatorResult<Arc<ContractDescriptor>> {
        if let Some(descriptor) = self.cache.get(&address) {
            return Ok(descriptor.clone());
        }

        let abi_json = self.source.fetch_interface(address).await?;
        let descriptor = Arc::new(ContractDescriptor::from_json(address, &abi_json)?);
        info!(
            "Loaded interface for {:?} ({} functions)",
            address,
            descriptor.abi().functions.len()
        );

        Ok(self
            .cache
            .entry(address)
            .or_insert(descriptor)
            .value()
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperatorError;
    use crate::testing::OPERATOR_ABI;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        fetches: Arc<AtomicUsize>,
        body: &'static str,
    }

    #[async_trait]
    impl InterfaceSource for CountingSource {
        async fn fetch_interface(&self, _address: Address) -> OperatorResult<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.to_string())
        }
    }

    #[tokio::test]
    async fn test_descriptor_is_cached() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let provider = InterfaceProvider::new(Box::new(CountingSource {
            fetches: fetches.clone(),
            body: OPERATOR_ABI,
        }));

        let address = Address::repeat_byte(9);
        let first = provider.descriptor(address).await.unwrap();
        let second = provider.descriptor(address).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(first.address(), address);
    }

    #[tokio::test]
    async fn test_malformed_interface_is_not_cached() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let provider = InterfaceProvider::new(Box::new(CountingSource {
            fetches: fetches.clone(),
            body: "{\"oops\":",
        }));

        for _ in 0..2 {
            let err = provider.descriptor(Address::zero()).await.unwrap_err();
            assert!(matches!(err, OperatorError::Interface(_)));
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
