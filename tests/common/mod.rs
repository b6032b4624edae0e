#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use carelink::api::ApiClient;
use carelink::auth::{Clock, MemorySecureStorage, SecureStorage, TokenStore};
use url::Url;

pub const START_MS: i64 = 1_700_000_000_000;

#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn at(now_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicI64::new(now_ms),
        })
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub storage: Arc<MemorySecureStorage>,
    pub clock: Arc<ManualClock>,
    pub tokens: TokenStore,
}

pub fn harness() -> Harness {
    let storage = Arc::new(MemorySecureStorage::new());
    let clock = ManualClock::at(START_MS);
    let tokens = TokenStore::with_clock(
        storage.clone() as Arc<dyn SecureStorage>,
        clock.clone() as Arc<dyn Clock>,
    );

    Harness {
        storage,
        clock,
        tokens,
    }
}

pub fn client(base_url: &str, tokens: &TokenStore) -> ApiClient {
    let base_url = Url::parse(base_url).expect("mock server url");
    ApiClient::new(base_url, Duration::from_secs(10), tokens.clone()).expect("client builds")
}

pub fn jwt_with_exp(exp_secs: i64) -> String {
    jwt(&format!(r#"{{"sub":"caregiver-7","exp":{exp_secs}}}"#))
}

pub fn jwt(payload: &str) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload)
    )
}
