use ams_auth::{issue_credentials, AuthError, GatewayAuthService, JwtManager};
use ams_storage::{AssetStore, InMemoryAssetStore};
use domain::asset::{CLIENT_ID_ATTRIBUTE, CLIENT_SECRET_ATTRIBUTE, DISABLED_ATTRIBUTE};
use domain::{Asset, AssetType, Attribute, RealmContext, ValueType};
use std::sync::Arc;

async fn seed_gateway(store: &InMemoryAssetStore, realm: &str, disabled: bool) -> (String, String, String) {
    let ctx = RealmContext::service(realm);
    let mut gateway = Asset::new("GW", AssetType::Gateway, realm, 0);
    let credentials = issue_credentials(&gateway.id);
    gateway.set_attribute(Attribute::new(
        CLIENT_ID_ATTRIBUTE,
        ValueType::Text,
        serde_json::json!(credentials.client_id),
        0,
    ));
    gateway.set_attribute(Attribute::new(
        CLIENT_SECRET_ATTRIBUTE,
        ValueType::Text,
        serde_json::json!(credentials.client_secret),
        0,
    ));
    gateway.set_attribute(Attribute::new(
        DISABLED_ATTRIBUTE,
        ValueType::Boolean,
        serde_json::json!(disabled),
        0,
    ));
    let gateway_id = gateway.id.clone();
    store.upsert_asset(&ctx, gateway).await.expect("seed");
    (gateway_id, credentials.client_id, credentials.client_secret)
}

#[tokio::test]
async fn grant_issues_gateway_token() {
    let store = Arc::new(InMemoryAssetStore::new());
    let (gateway_id, client_id, client_secret) = seed_gateway(&store, "master", false).await;
    let auth = GatewayAuthService::new(store, JwtManager::new("s".to_string(), 600));

    let issued = auth
        .client_credentials_grant("master", &client_id, &client_secret)
        .await
        .expect("grant");
    let identity = auth.verify_gateway_token(&issued.token).expect("verify");
    assert_eq!(identity.gateway_id, gateway_id);
    assert_eq!(identity.realm, "master");
}

#[tokio::test]
async fn grant_rejects_wrong_secret() {
    let store = Arc::new(InMemoryAssetStore::new());
    let (_, client_id, _) = seed_gateway(&store, "master", false).await;
    let auth = GatewayAuthService::new(store, JwtManager::new("s".to_string(), 600));

    let err = auth
        .client_credentials_grant("master", &client_id, "wrong-secret")
        .await
        .expect_err("rejected");
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn grant_rejects_disabled_gateway() {
    let store = Arc::new(InMemoryAssetStore::new());
    let (_, client_id, client_secret) = seed_gateway(&store, "master", true).await;
    let auth = GatewayAuthService::new(store, JwtManager::new("s".to_string(), 600));

    let err = auth
        .client_credentials_grant("master", &client_id, &client_secret)
        .await
        .expect_err("disabled");
    assert!(matches!(err, AuthError::GatewayDisabled));
}

#[tokio::test]
async fn grant_rejects_unknown_client() {
    let store = Arc::new(InMemoryAssetStore::new());
    let auth = GatewayAuthService::new(store, JwtManager::new("s".to_string(), 600));
    let err = auth
        .client_credentials_grant("master", "gateway-nobody", "secret")
        .await
        .expect_err("unknown");
    assert!(matches!(err, AuthError::InvalidCredentials));
}
