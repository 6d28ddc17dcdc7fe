#![allow(dead_code)]

use ams_gateway::{
    in_memory_pair, EventBus, GatewayClient, GatewayClientConfig, GatewayConnector,
    GatewayService, MessageChannel, SessionTermination, SyncConfig,
};
use ams_gateway::error::GatewayError;
use ams_storage::{AssetStore, InMemoryAssetStore};
use domain::{Asset, AssetType, Attribute, RealmContext, ValueType};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const MANAGER_REALM: &str = "master";
pub const SITE_REALM: &str = "site";

/// 管理端测试装置。
pub struct Manager {
    pub store: Arc<InMemoryAssetStore>,
    pub bus: EventBus,
    pub service: Arc<GatewayService>,
    pub gateway_id: String,
}

pub fn admin_ctx() -> RealmContext {
    RealmContext::new(
        MANAGER_REALM,
        "admin",
        vec!["admin".to_string()],
        vec![
            domain::permissions::ASSET_READ.to_string(),
            domain::permissions::ASSET_WRITE.to_string(),
        ],
    )
}

pub fn manager_ctx() -> RealmContext {
    RealmContext::service(MANAGER_REALM)
}

pub fn site_ctx() -> RealmContext {
    RealmContext::service(SITE_REALM)
}

/// 构造带一个已注册网关资产的管理端。
pub async fn manager_with_gateway(batch_size: usize) -> Manager {
    let store = Arc::new(InMemoryAssetStore::new());
    let bus = EventBus::new();
    let config = SyncConfig {
        batch_size,
        read_timeout: Duration::from_secs(2),
        forward_timeout: Duration::from_secs(2),
        event_queue_capacity: 1024,
    };
    let service = Arc::new(GatewayService::new(
        store.clone() as Arc<dyn AssetStore>,
        bus.clone(),
        config,
    ));

    let ctx = manager_ctx();
    let mut gateway = Asset::new("Gateway", AssetType::Gateway, MANAGER_REALM, 0);
    gateway.id = "gw-0000000000000000000".to_string();
    let gateway_id = gateway.id.clone();
    store.upsert_asset(&ctx, gateway).await.expect("seed gateway");

    Manager {
        store,
        bus,
        service,
        gateway_id,
    }
}

/// 网关侧测试装置。
pub struct Site {
    pub store: Arc<InMemoryAssetStore>,
    pub bus: EventBus,
}

pub fn site() -> Site {
    Site {
        store: Arc::new(InMemoryAssetStore::new()),
        bus: EventBus::new(),
    }
}

pub fn test_client_config() -> GatewayClientConfig {
    GatewayClientConfig {
        host: "localhost".to_string(),
        port: 8080,
        secure: false,
        realm: MANAGER_REALM.to_string(),
        client_id: "gateway-test".to_string(),
        client_secret: "secret".to_string(),
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(200),
        queue_capacity: 1024,
    }
}

pub fn site_client(site: &Site) -> GatewayClient {
    GatewayClient::new(
        test_client_config(),
        site.store.clone() as Arc<dyn AssetStore>,
        site.bus.clone(),
        SITE_REALM,
    )
}

fn site_asset(id: &str, name: &str, asset_type: AssetType, parent: Option<&str>) -> Asset {
    let mut asset = Asset::new(name, asset_type, SITE_REALM, 1_000);
    asset.id = id.to_string();
    asset.parent_id = parent.map(str::to_string);
    asset
}

/// 种 30 个资产：20 个房间（ID 排序在前）、5 栋楼、5 个代理。
///
/// 清单按 ID 排序返回，房间因此先于其父楼栋出现。
pub async fn seed_site_tree(site: &Site) -> Vec<String> {
    let ctx = site_ctx();
    let mut ids = Vec::new();
    for building in 1..=5 {
        let id = format!("b-building-{:02}", building);
        site.store
            .upsert_asset(&ctx, site_asset(&id, &format!("Building {}", building), AssetType::Building, None))
            .await
            .expect("seed building");
        ids.push(id);
    }
    for room in 1..=20 {
        let building = (room - 1) / 4 + 1;
        let id = format!("a-room-{:02}", room);
        let mut asset = site_asset(
            &id,
            &format!("Room {}", room),
            AssetType::Room,
            Some(&format!("b-building-{:02}", building)),
        );
        if room == 1 {
            asset.set_attribute(Attribute::new(
                "light1Toggle",
                ValueType::Boolean,
                serde_json::json!(true),
                1_000,
            ));
        }
        site.store.upsert_asset(&ctx, asset).await.expect("seed room");
        ids.push(id);
    }
    for agent in 1..=5 {
        let id = format!("c-agent-{:02}", agent);
        site.store
            .upsert_asset(&ctx, site_asset(&id, &format!("Agent {}", agent), AssetType::Agent, None))
            .await
            .expect("seed agent");
        ids.push(id);
    }
    ids
}

pub type SessionHandle = JoinHandle<Result<SessionTermination, GatewayError>>;

/// 用内存通道把客户端接到管理端。
pub async fn connect(
    manager: &Manager,
    client: Arc<GatewayClient>,
) -> (GatewayConnector, SessionHandle) {
    let (manager_ch, gateway_ch) = in_memory_pair(256);
    let connector = manager
        .service
        .attach(&manager.gateway_id, MANAGER_REALM, manager_ch)
        .await
        .expect("attach");
    let session = tokio::spawn(async move { client.run_session(gateway_ch).await });
    (connector, session)
}

/// 同 `connect`，但在中间加记录管理端→网关帧的中继。
pub async fn connect_tapped(
    manager: &Manager,
    client: Arc<GatewayClient>,
) -> (GatewayConnector, SessionHandle, Arc<Mutex<Vec<String>>>) {
    let (manager_ch, relay_manager) = in_memory_pair(256);
    let (relay_gateway, gateway_ch) = in_memory_pair(256);
    let frames = Arc::new(Mutex::new(Vec::new()));

    let MessageChannel {
        outbound: to_manager,
        inbound: mut from_manager,
    } = relay_manager;
    let MessageChannel {
        outbound: to_gateway,
        inbound: mut from_gateway,
    } = relay_gateway;

    let log = frames.clone();
    tokio::spawn(async move {
        while let Some(frame) = from_manager.recv().await {
            log.lock().expect("frame log").push(frame.clone());
            if to_gateway.send(frame).await.is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        while let Some(frame) = from_gateway.recv().await {
            if to_manager.send(frame).await.is_err() {
                break;
            }
        }
    });

    let connector = manager
        .service
        .attach(&manager.gateway_id, MANAGER_REALM, manager_ch)
        .await
        .expect("attach");
    let session = tokio::spawn(async move { client.run_session(gateway_ch).await });
    (connector, session, frames)
}

pub async fn wait_connected(connector: &GatewayConnector) -> bool {
    for _ in 0..500 {
        if connector.is_connected() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub async fn mirror_ids(manager: &Manager) -> Vec<String> {
    manager
        .store
        .descendant_ids(&manager_ctx(), &manager.gateway_id)
        .await
        .expect("descendants")
}

pub async fn wait_mirror_count(manager: &Manager, expected: usize) -> bool {
    for _ in 0..500 {
        if mirror_ids(manager).await.len() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
