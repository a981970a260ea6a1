// tests/user.rs
//
// Session store actor properties: versioned cold-storage load, merge and
// reset discipline, parameter descriptors, subscriptions, and the
// authenticate flow.

mod common;

use sigil::runtime::Body;
use sigil::storage::{ColdStorage, MemoryStorage};
use sigil::surface::{msg, MessagePort};
use sigil::transport::HttpMethod;
use sigil::user::CURRENT_USER_NAME;
use sigil::SigilError;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

#[tokio::test]
async fn stale_persisted_version_falls_back_to_defaults() {
  let storage = MemoryStorage::seeded(json!({ "VERSION": "0.0.0", "addr": "0x1" }));
  let harness = common::Harness::with_storage(storage);
  let client = harness.client().await;

  let user = client.current_user().snapshot().await.unwrap();
  assert_eq!(user.addr(), None);
  assert!(!user.logged_in());
}

#[tokio::test]
async fn matching_persisted_version_is_restored() {
  let storage = MemoryStorage::seeded(json!({
    "VERSION": "0.1.1",
    "addr": "0xabc",
    "loggedIn": true
  }));
  let harness = common::Harness::with_storage(storage);
  let client = harness.client().await;

  let user = client.current_user().snapshot().await.unwrap();
  assert_eq!(user.addr(), Some("0xabc"));
  assert!(user.logged_in());
}

#[tokio::test]
async fn merge_is_shallow_persists_and_broadcasts() {
  let harness = common::Harness::new();
  let client = harness.client().await;
  let user = client.current_user();

  let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let _subscription = user
    .subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.raw().clone()))
    .await;
  assert!(common::wait_for(|| seen.lock().unwrap().len() == 1, common::LONG_TIMEOUT).await);

  client
    .context()
    .send(
      CURRENT_USER_NAME,
      Body::SessionMerge {
        patch: json!({ "addr": "0xabc", "keyId": 3 }),
      },
    )
    .await
    .unwrap();

  assert!(common::wait_for(|| seen.lock().unwrap().len() == 2, common::LONG_TIMEOUT).await);
  let snapshot = user.snapshot().await.unwrap();
  assert_eq!(snapshot.addr(), Some("0xabc"));
  assert_eq!(snapshot.key_id(), Some(3));
  // Untouched fields survive a shallow merge.
  assert_eq!(snapshot.raw().get("VERSION"), Some(&json!("0.1.1")));

  // The mutation reached cold storage as one atomic step with the
  // broadcast.
  let persisted = harness.storage.get().await.unwrap().unwrap();
  assert_eq!(persisted.get("addr"), Some(&json!("0xabc")));
}

#[tokio::test]
async fn unauthenticate_resets_to_defaults() {
  let harness = common::Harness::new();
  let client = harness.client().await;
  let user = client.current_user();

  client
    .context()
    .send(
      CURRENT_USER_NAME,
      Body::SessionMerge {
        patch: json!({ "addr": "0xabc", "loggedIn": true }),
      },
    )
    .await
    .unwrap();
  // The snapshot round-trip is FIFO-ordered behind the merge, so once it
  // answers, the merge has been applied and persisted.
  let snapshot = user.snapshot().await.unwrap();
  assert_eq!(snapshot.addr(), Some("0xabc"));
  let persisted = harness.storage.get().await.unwrap().unwrap();
  assert_eq!(persisted.get("addr"), Some(&json!("0xabc")));

  user.unauthenticate().await.unwrap();
  let snapshot = user.snapshot().await.unwrap();
  assert_eq!(snapshot.addr(), None);
  assert!(!snapshot.logged_in());

  let persisted = harness.storage.get().await.unwrap().unwrap();
  assert_eq!(persisted.get("addr"), Some(&Value::Null));
}

#[tokio::test]
async fn param_builds_identity_descriptor_from_addr() {
  let harness = common::Harness::new();
  let client = harness.client().await;
  let user = client.current_user();

  client
    .context()
    .send(
      CURRENT_USER_NAME,
      Body::SessionMerge {
        patch: json!({ "addr": "0xabc", "loggedIn": true }),
      },
    )
    .await
    .unwrap();

  let param = user.param("proposer").await.unwrap();
  assert_eq!(param.key, "proposer");
  assert_eq!(param.value, json!("0xabc"));
  assert_eq!(param.xform, "Identity");
}

#[tokio::test]
async fn deprecated_accessors_return_values_unchanged() {
  let harness = common::Harness::new();
  let client = harness.client().await;

  let snapshot = client.current_user().snapshot().await.unwrap();
  // Warns, but the value comes back intact.
  let provider = snapshot.provider();
  assert_eq!(provider.get("pid"), Some(&Value::Null));
  assert_eq!(snapshot.verified(), None);
  assert_eq!(snapshot.scoped(), json!({}));
}

#[tokio::test]
async fn authenticate_runs_the_challenge_flow() {
  let harness = common::Harness::new();
  harness.http.push(json!({
    "addr": "0xabc",
    "keyId": 1,
    "provider": { "pid": "wallet-1", "addr": "0xprov", "name": "Test Wallet" },
    "authorizations": []
  }));
  let client = harness.client().await;
  let config = client.config();
  config
    .put("challenge.handshake", json!("https://wallet.example/authn"))
    .await
    .unwrap();
  config.put("challenge.scope", json!("email")).await.unwrap();

  let user = client.current_user();
  let authenticate = tokio::spawn(async move { user.authenticate().await });

  // The challenge frame mounts, then the provider answers on the port.
  let surface = harness.surface.clone();
  assert!(common::wait_for(|| surface.mounts() == 1, common::LONG_TIMEOUT).await);
  let frame = harness.surface.last_frame().unwrap();
  assert_eq!(frame.endpoint, "https://wallet.example/authn");
  assert_eq!(frame.params.get("scope"), Some(&"email".to_string()));

  let wallet = harness.port.wallet_side();
  wallet
    .post(json!({
      "type": msg::CHALLENGE_RESPONSE,
      "hks": "https://wallet.example/hooks",
      "code": "secret-code"
    }))
    .unwrap();

  let snapshot = authenticate.await.unwrap().unwrap();
  assert!(snapshot.logged_in());
  assert_eq!(snapshot.addr(), Some("0xabc"));
  assert_eq!(snapshot.cid(), Some("wallet-1|0xprov"));

  // Challenge frame torn down exactly once; code exchanged over GET.
  assert_eq!(harness.surface.unmounts(), 1);
  let requests = harness.http.requests();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].method, HttpMethod::Get);
  assert!(requests[0].url.contains("code=secret-code"));

  // A second authenticate short-circuits on the logged-in session.
  let again = client.current_user().authenticate().await.unwrap();
  assert_eq!(again.addr(), Some("0xabc"));
  assert_eq!(harness.surface.mounts(), 1);
}

#[tokio::test]
async fn subscribe_sees_catchup_then_every_session_change() {
  let harness = common::Harness::new();
  let client = harness.client().await;
  let user = client.current_user();

  let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let subscription = user
    .subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.raw().clone()))
    .await;

  assert!(common::wait_for(|| seen.lock().unwrap().len() == 1, common::LONG_TIMEOUT).await);
  assert_eq!(seen.lock().unwrap()[0].get("addr"), Some(&Value::Null));

  for (i, addr) in ["0x1", "0x2"].iter().enumerate() {
    client
      .context()
      .send(
        CURRENT_USER_NAME,
        Body::SessionMerge {
          patch: json!({ "addr": addr }),
        },
      )
      .await
      .unwrap();
    assert!(
      common::wait_for(|| seen.lock().unwrap().len() == i + 2, common::LONG_TIMEOUT).await
    );
  }
  assert_eq!(seen.lock().unwrap()[1].get("addr"), Some(&json!("0x1")));
  assert_eq!(seen.lock().unwrap()[2].get("addr"), Some(&json!("0x2")));

  subscription.unsubscribe().await;
  tokio::time::sleep(Duration::from_millis(50)).await;
  client
    .context()
    .send(
      CURRENT_USER_NAME,
      Body::SessionMerge {
        patch: json!({ "addr": "0x3" }),
      },
    )
    .await
    .unwrap();
  tokio::time::sleep(Duration::from_millis(100)).await;
  assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn storage_failure_on_load_starts_from_defaults() {
  struct BrokenStorage;

  #[async_trait::async_trait]
  impl ColdStorage for BrokenStorage {
    async fn get(&self) -> Result<Option<Value>, SigilError> {
      Err(SigilError::Storage("disk on fire".to_string()))
    }
    async fn put(&self, _record: &Value) -> Result<(), SigilError> {
      Err(SigilError::Storage("disk on fire".to_string()))
    }
  }

  let harness = common::Harness::new();
  let mut services = harness.services();
  services.storage = Arc::new(BrokenStorage);
  let client = sigil::Client::new(services).await;

  // The actor is up and serving despite the dead store.
  let snapshot = client.current_user().snapshot().await.unwrap();
  assert_eq!(snapshot.addr(), None);
}
