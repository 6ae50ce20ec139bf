use std::sync::Arc;

use crate::cache::SlotCache;
use crate::catalog::SlotCatalog;
use crate::config::Config;
use crate::ledger::SlotLedger;
use crate::payments::{create_gateway, SignatureVerifier};
use crate::store::BookingStore;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<SlotLedger>,
    pub catalog: Arc<SlotCatalog>,
    pub admin_api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn BookingStore>) -> Self {
        let cache = SlotCache::new(config.slot_cache_ttl);
        let gateway = create_gateway(&config.payment);
        let verifier = SignatureVerifier::new(config.payment.signing_secret());

        Self {
            ledger: Arc::new(SlotLedger::new(
                store.clone(),
                gateway,
                verifier,
                cache.clone(),
                config.pending_hold,
                config.currency.clone(),
            )),
            catalog: Arc::new(SlotCatalog::new(store, cache, config.pending_hold)),
            admin_api_token: config.admin_api_token.as_deref().map(Arc::from),
        }
    }
}
