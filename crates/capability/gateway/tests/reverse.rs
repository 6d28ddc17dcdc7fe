//! 反向互联场景：本管理端作为另一管理端的网关。

mod common;

use ams_config::AppConfig;
use ams_gateway::{map_asset_id, EventBus, GatewayClientService};
use ams_storage::{
    AssetStore, GatewayConnectionRecord, GatewayConnectionStore, InMemoryAssetStore,
    InMemoryGatewayConnectionStore,
};
use common::*;
use domain::{Asset, AssetType, RealmContext};
use std::sync::Arc;
use std::time::Duration;

/// 场景 6：管理端 A 的租域 X 镜像到管理端 B 的网关 G 之下。
///
/// A 上改资产 → B 镜像跟进；B 在 G 下直接建资产 → A 上以父映射创建。
#[tokio::test]
async fn reverse_connection_mirrors_both_directions() {
    // B：上级管理端，持有网关资产 G
    let manager_b = manager_with_gateway(20).await;
    // A：下级管理端，租域 X 由其网关客户端整体上镜
    let realm_x = site();
    let ctx_x = site_ctx();

    let mut building = Asset::new("Plant", AssetType::Building, SITE_REALM, 1_000);
    building.id = "x-building-01".to_string();
    realm_x
        .store
        .upsert_asset(&ctx_x, building)
        .await
        .expect("seed building");
    let mut device = Asset::new("Meter", AssetType::Device, SITE_REALM, 1_000);
    device.id = "x-device-01".to_string();
    device.parent_id = Some("x-building-01".to_string());
    realm_x
        .store
        .upsert_asset(&ctx_x, device)
        .await
        .expect("seed device");

    let client = Arc::new(site_client(&realm_x));
    let (connector, _session) = connect(&manager_b, client.clone()).await;
    assert!(wait_connected(&connector).await);
    assert!(wait_mirror_count(&manager_b, 2).await);

    // A 上修改资产 → 反映到 B 的 G 之下
    let mut renamed = realm_x
        .store
        .find_asset(&ctx_x, "x-device-01")
        .await
        .expect("find")
        .expect("device");
    renamed.name = "Meter (calibrated)".to_string();
    client.local_upsert(renamed).await.expect("modify on A");

    let mirrored_device = map_asset_id(&manager_b.gateway_id, "x-device-01");
    let mut reflected = false;
    for _ in 0..200 {
        if let Some(mirror) = manager_b
            .store
            .find_asset(&manager_ctx(), &mirrored_device)
            .await
            .expect("find")
        {
            if mirror.name == "Meter (calibrated)" {
                assert_eq!(
                    mirror.parent_id.as_deref(),
                    Some(map_asset_id(&manager_b.gateway_id, "x-building-01").as_str())
                );
                reflected = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reflected, "modification on A reflected under G in B");

    // B 在 G 之下直接建资产 → A 上创建，父映射到位
    let mut request = Asset::new("Dashboard", AssetType::Thing, MANAGER_REALM, 2_000);
    request.id = String::new();
    request.parent_id = Some(map_asset_id(&manager_b.gateway_id, "x-building-01"));
    let mirrored = connector
        .forward_asset_merge(request)
        .await
        .expect("create under G");

    let created_on_a = realm_x
        .store
        .query_assets(&ctx_x, &domain::AssetQuery {
            recursive: true,
            ..domain::AssetQuery::default()
        })
        .await
        .expect("assets on A")
        .into_iter()
        .find(|asset| asset.name == "Dashboard")
        .expect("created on A");
    assert_eq!(
        created_on_a.parent_id.as_deref(),
        Some("x-building-01"),
        "parent unmapped on A"
    );
    assert_eq!(created_on_a.realm, SITE_REALM, "realm is A's, not B's");
    assert_eq!(
        mirrored.id,
        map_asset_id(&manager_b.gateway_id, &created_on_a.id)
    );
}

fn app_config_for_tests() -> AppConfig {
    std::env::set_var("AMS_JWT_SECRET", "test-secret");
    AppConfig::from_env().expect("config")
}

/// 互联配置服务：每租域至多一个客户端，停用配置不启动。
#[tokio::test]
async fn client_service_manages_one_client_per_realm() {
    let connections = Arc::new(InMemoryGatewayConnectionStore::new());
    let assets = Arc::new(InMemoryAssetStore::new());
    let service = GatewayClientService::new(
        connections.clone() as Arc<dyn GatewayConnectionStore>,
        assets as Arc<dyn AssetStore>,
        EventBus::new(),
        app_config_for_tests(),
    );
    let ctx = RealmContext::new(SITE_REALM, "admin", vec![], vec![]);

    let record = GatewayConnectionRecord {
        local_realm: SITE_REALM.to_string(),
        host: "manager-b.example.com".to_string(),
        port: 8080,
        realm: MANAGER_REALM.to_string(),
        client_id: "gateway-g".to_string(),
        client_secret: "secret".to_string(),
        secure: false,
        disabled: true,
    };
    service.apply(&ctx, record.clone()).await.expect("apply");
    assert!(
        !service.is_running(SITE_REALM).await,
        "disabled connection does not start a client"
    );
    assert!(service
        .find(&ctx, SITE_REALM)
        .await
        .expect("find")
        .is_some());

    // 替换配置仍然一租域一条
    let mut replacement = record.clone();
    replacement.host = "other.example.com".to_string();
    service.apply(&ctx, replacement).await.expect("replace");
    let stored = connections
        .list_connections()
        .await
        .expect("list");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].host, "other.example.com");

    assert!(service.remove(&ctx, SITE_REALM).await.expect("remove"));
    assert!(service
        .find(&ctx, SITE_REALM)
        .await
        .expect("find")
        .is_none());
    service.shutdown().await;
}
