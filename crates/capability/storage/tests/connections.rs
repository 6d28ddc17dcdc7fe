use ams_storage::{GatewayConnectionRecord, GatewayConnectionStore, InMemoryGatewayConnectionStore};
use domain::RealmContext;

fn record(local_realm: &str) -> GatewayConnectionRecord {
    GatewayConnectionRecord {
        local_realm: local_realm.to_string(),
        host: "manager.example.com".to_string(),
        port: 8080,
        realm: "building1".to_string(),
        client_id: "gateway-abc".to_string(),
        client_secret: "secret".to_string(),
        secure: true,
        disabled: false,
    }
}

#[tokio::test]
async fn connection_upsert_replaces_per_realm() {
    let store = InMemoryGatewayConnectionStore::new();
    let ctx = RealmContext::new("realm-x", "user-1", vec![], vec![]);

    store
        .upsert_connection(&ctx, record("realm-x"))
        .await
        .expect("create");
    let mut replacement = record("realm-x");
    replacement.host = "other.example.com".to_string();
    store
        .upsert_connection(&ctx, replacement)
        .await
        .expect("replace");

    let all = store.list_connections().await.expect("list");
    assert_eq!(all.len(), 1, "at most one connection per realm");
    assert_eq!(all[0].host, "other.example.com");

    assert!(store
        .delete_connection(&ctx, "realm-x")
        .await
        .expect("delete"));
    assert!(store
        .find_connection(&ctx, "realm-x")
        .await
        .expect("find")
        .is_none());
}

#[tokio::test]
async fn connection_scope_is_enforced() {
    let store = InMemoryGatewayConnectionStore::new();
    let ctx = RealmContext::new("realm-y", "user-1", vec![], vec![]);
    let err = store
        .upsert_connection(&ctx, record("realm-x"))
        .await
        .expect_err("scope");
    assert!(matches!(err, ams_storage::StorageError::Scope(_)));
}
