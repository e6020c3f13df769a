//! Gas estimation: dry-run based limits with a configurable buffer

use crate::chain::{ChainClient, GasPrice};
use crate::error::EscrowResult;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::debug;

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
        }
    }

    /// Dry-run `tx` and return the buffered gas limit.
    ///
    /// A reverting dry-run comes back as `EscrowError::Estimation` and is never
    /// replaced by a fallback limit.
    pub async fn estimate_limit<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        tx: &TypedTransaction,
    ) -> EscrowResult<U256> {
        let estimated = client.estimate_gas(tx).await?;
        let limit = self.apply_buffer(estimated);
        debug!("Estimated gas {} (limit {})", estimated, limit);
        Ok(limit)
    }

    /// Current gas price from the chain
    pub async fn gas_price<C: ChainClient + ?Sized>(&self, client: &C) -> EscrowResult<GasPrice> {
        let price = client.gas_price().await?;
        debug!("Gas price: {:?}", price);
        Ok(price)
    }

    fn apply_buffer(&self, estimated: U256) -> U256 {
        estimated + estimated * self.gas_limit_buffer_percent / 100
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: &GasPrice) -> U256 {
        match gas_price {
            GasPrice::Legacy(price) => gas_limit * *price,
            GasPrice::Eip1559 { max_fee_per_gas, .. } => gas_limit * *max_fee_per_gas,
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_applied() {
        assert_eq!(GasEstimator::new(20).apply_buffer(U256::from(100_000)), U256::from(120_000));
        assert_eq!(GasEstimator::default().apply_buffer(U256::from(21_000)), U256::from(21_000));
    }

    #[test]
    fn test_cost_uses_max_fee() {
        let price = GasPrice::Eip1559 {
            max_fee_per_gas: U256::from(30),
            max_priority_fee_per_gas: U256::from(2),
        };
        assert_eq!(GasEstimator::calculate_cost(U256::from(10), &price), U256::from(300));
        assert_eq!(
            GasEstimator::calculate_cost(U256::from(10), &GasPrice::Legacy(U256::from(7))),
            U256::from(70)
        );
    }
}
