// Property tests for region failover
//
// Property: for N configured regions of which the first K fail, a query
// succeeds in region K+1 after exactly K+1 attempts when K < N, and
// otherwise fails carrying all N region errors in attempt order.

use async_trait::async_trait;
use exodus_edge::{
    AttrValue, BackendConnector, EdgeConfig, EdgeMetrics, Item, KeyQuery, LookupClient,
    TableBackend, TableConfig,
};
use prometheus::Registry;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;

struct FlakyBackend {
    region: String,
    failing: usize,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl TableBackend for FlakyBackend {
    async fn query_latest(&self, _query: &KeyQuery) -> anyhow::Result<Option<Item>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let index: usize = self.region.trim_start_matches("region-").parse()?;
        if index < self.failing {
            anyhow::bail!("error from {}", self.region);
        }

        let mut item = Item::new();
        item.insert("region".to_string(), AttrValue::S(self.region.clone()));
        Ok(Some(item))
    }
}

struct FlakyConnector {
    failing: usize,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl BackendConnector for FlakyConnector {
    async fn connect(&self, region: &str) -> anyhow::Result<Arc<dyn TableBackend>> {
        Ok(Arc::new(FlakyBackend {
            region: region.to_string(),
            failing: self.failing,
            attempts: Arc::clone(&self.attempts),
        }))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_failover_order(regions in 1usize..6, failing in 0usize..7) {
        let rt = Runtime::new().unwrap();

        let result: Result<(), TestCaseError> = rt.block_on(async {
            let region_names: Vec<String> = (0..regions).map(|i| format!("region-{}", i)).collect();

            let mut config = EdgeConfig::default();
            config.table = TableConfig {
                name: "test-table".to_string(),
                available_regions: Some(region_names.clone()),
            };

            let attempts = Arc::new(AtomicUsize::new(0));
            let connector = FlakyConnector {
                failing,
                attempts: Arc::clone(&attempts),
            };
            let metrics = Arc::new(EdgeMetrics::with_registry(&Registry::new()).unwrap());
            let client = LookupClient::new(Arc::new(config), Arc::new(connector), metrics);

            let result = client.query(&KeyQuery::content("test-table", "/some/uri")).await;

            if failing < regions {
                let item = result.unwrap().unwrap();
                prop_assert_eq!(
                    item["region"].as_s(),
                    Some(region_names[failing].as_str())
                );
                prop_assert_eq!(attempts.load(Ordering::SeqCst), failing + 1);
            } else {
                let err = result.unwrap_err();
                prop_assert_eq!(err.failures.len(), regions);
                let attempted: Vec<String> =
                    err.regions().into_iter().map(str::to_string).collect();
                prop_assert_eq!(attempted, region_names);
                prop_assert_eq!(
                    err.cause_chain().count(),
                    regions
                );
                prop_assert_eq!(attempts.load(Ordering::SeqCst), regions);
            }

            Ok(())
        });

        result?;
    }
}
