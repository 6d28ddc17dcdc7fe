//! 清单同步端到端场景（内存通道，不走网络）。

mod common;

use ams_gateway::codec::{decode_frame, Decoded, Envelope, SharedEvent};
use ams_gateway::{in_memory_pair, map_asset_id, MessageChannel};
use ams_storage::AssetStore;
use common::*;
use domain::asset::{DISABLED_ATTRIBUTE, STATUS_ATTRIBUTE};
use domain::{Asset, AssetEvent, AssetEventCause, AssetType, AttributeEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// 场景 1：注册 + 同步（多于一批）。
///
/// 30 个资产、批大小 20 → 恰好 2 个批请求，ID 两两不交且并集为 30；
/// 即使房间先于其父楼栋到达，父链也要正确。
#[tokio::test]
async fn provision_and_sync_with_two_batches() {
    let manager = manager_with_gateway(20).await;
    let site = site();
    let local_ids = seed_site_tree(&site).await;
    let client = Arc::new(site_client(&site));

    let (connector, _session, frames) = connect_tapped(&manager, client).await;
    assert!(wait_connected(&connector).await, "gateway reaches CONNECTED");
    assert!(wait_mirror_count(&manager, 30).await, "30 assets mirrored");

    // 批请求：恰好 ⌈30/20⌉ = 2 个，ID 不交、并集 30
    let mut batch_ids: Vec<Vec<String>> = Vec::new();
    for frame in frames.lock().expect("frame log").iter() {
        if let Ok(Decoded::Envelope(envelope)) = decode_frame(frame) {
            if envelope.message_id.starts_with("GATEWAY-ASSET-READ-") {
                match envelope.event {
                    SharedEvent::ReadAssets { query } => batch_ids.push(query.ids),
                    other => panic!("unexpected batch request event: {:?}", other),
                }
            }
        }
    }
    assert_eq!(batch_ids.len(), 2, "exactly two batch requests");
    let first: HashSet<&String> = batch_ids[0].iter().collect();
    let second: HashSet<&String> = batch_ids[1].iter().collect();
    assert!(first.is_disjoint(&second));
    assert_eq!(first.len() + second.len(), 30);

    // 镜像父链与租域
    let ctx = manager_ctx();
    for local_id in &local_ids {
        let mirrored_id = map_asset_id(&manager.gateway_id, local_id);
        let mirror = manager
            .store
            .find_asset(&ctx, &mirrored_id)
            .await
            .expect("find")
            .unwrap_or_else(|| panic!("mirror missing for {}", local_id));
        assert_eq!(mirror.realm, MANAGER_REALM);
        let site_asset = site
            .store
            .find_asset(&site_ctx(), local_id)
            .await
            .expect("find")
            .expect("site asset");
        let expected_parent = match site_asset.parent_id {
            Some(parent) => map_asset_id(&manager.gateway_id, &parent),
            None => manager.gateway_id.clone(),
        };
        assert_eq!(mirror.parent_id.as_deref(), Some(expected_parent.as_str()));
    }
}

async fn recv_envelope(channel: &mut MessageChannel) -> Envelope {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), channel.inbound.recv())
            .await
            .expect("frame within deadline")
            .expect("channel open");
        if let Decoded::Envelope(envelope) = decode_frame(&frame).expect("decode") {
            return envelope;
        }
    }
}

async fn respond(channel: &MessageChannel, message_id: &str, event: SharedEvent) {
    let frame = ams_gateway::codec::encode_envelope(&Envelope {
        message_id: message_id.to_string(),
        event,
    })
    .expect("encode");
    channel.outbound.send(frame).await.expect("send");
}

async fn send_event(channel: &MessageChannel, event: SharedEvent) {
    let frame = ams_gateway::codec::encode_event(&event).expect("encode");
    channel.outbound.send(frame).await.expect("send");
}

fn skeleton(id: &str, asset_type: AssetType, parent: Option<&str>) -> Asset {
    let mut asset = Asset::new(id, asset_type, "remote", 1_000);
    asset.id = id.to_string();
    asset.parent_id = parent.map(str::to_string);
    asset
}

/// 场景 3：同步中段的增删。
///
/// 两批同步之间注入一个新房间的 CREATE 和一个"在清单里但尚未拉取"
/// 的楼栋 DELETE：最终镜像包含新房间、不含被删楼栋，且不为被删 ID
/// 发起任何批请求。
#[tokio::test]
async fn mid_sync_mutations_are_folded_in() {
    let manager = manager_with_gateway(20).await;
    let (manager_ch, mut gateway_ch) = in_memory_pair(256);
    let connector = manager
        .service
        .attach(&manager.gateway_id, MANAGER_REALM, manager_ch)
        .await
        .expect("attach");

    // 手动扮演网关：20 房间（楼 1-4 各 5 间）+ 5 楼，房间 ID 排序在前
    let mut index = Vec::new();
    let mut rooms = Vec::new();
    for room in 1..=20 {
        let building = format!("b-building-{:02}", (room - 1) / 5 + 1);
        let asset = skeleton(
            &format!("a-room-{:02}", room),
            AssetType::Room,
            Some(&building),
        );
        rooms.push(asset.clone());
        index.push(asset);
    }
    let mut buildings = Vec::new();
    for building in 1..=5 {
        let asset = skeleton(
            &format!("b-building-{:02}", building),
            AssetType::Building,
            None,
        );
        buildings.push(asset.clone());
        index.push(asset);
    }

    let handshake = recv_envelope(&mut gateway_ch).await;
    assert_eq!(handshake.message_id, "GATEWAY-ASSET-READ");
    respond(
        &gateway_ch,
        "GATEWAY-ASSET-READ",
        SharedEvent::Assets {
            assets: index.clone(),
        },
    )
    .await;

    let batch1 = recv_envelope(&mut gateway_ch).await;
    assert_eq!(batch1.message_id, "GATEWAY-ASSET-READ-0");

    // 批 1 响应之前：新增 r-star，删除尚未拉取的 b-building-05
    send_event(
        &gateway_ch,
        SharedEvent::Asset(AssetEvent::new(
            AssetEventCause::Create,
            skeleton("r-star", AssetType::Room, Some("b-building-01")),
        )),
    )
    .await;
    send_event(
        &gateway_ch,
        SharedEvent::Asset(AssetEvent::new(
            AssetEventCause::Delete,
            skeleton("b-building-05", AssetType::Building, None),
        )),
    )
    .await;
    respond(
        &gateway_ch,
        "GATEWAY-ASSET-READ-0",
        SharedEvent::Assets {
            assets: rooms.clone(),
        },
    )
    .await;

    let batch2 = recv_envelope(&mut gateway_ch).await;
    assert_eq!(batch2.message_id, "GATEWAY-ASSET-READ-20");
    let requested: Vec<String> = match batch2.event {
        SharedEvent::ReadAssets { query } => query.ids,
        other => panic!("unexpected batch request: {:?}", other),
    };
    assert!(
        !requested.contains(&"b-building-05".to_string()),
        "no request for the deleted id"
    );
    assert_eq!(requested.len(), 4);
    respond(
        &gateway_ch,
        "GATEWAY-ASSET-READ-20",
        SharedEvent::Assets {
            assets: buildings[..4].to_vec(),
        },
    )
    .await;

    assert!(wait_connected(&connector).await, "sync completes");
    // 20 房间 + 4 楼 + r-star = 25
    assert!(wait_mirror_count(&manager, 25).await, "final mirror size");
    let ctx = manager_ctx();
    let star = manager
        .store
        .find_asset(&ctx, &map_asset_id(&manager.gateway_id, "r-star"))
        .await
        .expect("find")
        .expect("r-star mirrored");
    assert_eq!(
        star.parent_id.as_deref(),
        Some(map_asset_id(&manager.gateway_id, "b-building-01").as_str())
    );
    assert!(manager
        .store
        .find_asset(&ctx, &map_asset_id(&manager.gateway_id, "b-building-05"))
        .await
        .expect("find")
        .is_none());
}

/// 场景 4：停用/启用与清单漂移。
///
/// 停用期间网关侧增一删一改一；重新启用后一轮批同步把镜像追平。
#[tokio::test]
async fn disable_enable_catches_up_inventory_drift() {
    let manager = manager_with_gateway(20).await;
    let site = site();
    seed_site_tree(&site).await;
    let client = Arc::new(site_client(&site));

    let (connector, session) = connect(&manager, client.clone()).await;
    assert!(wait_connected(&connector).await);
    assert!(wait_mirror_count(&manager, 30).await);

    // 停用：对端收到 gateway-disconnect(DISABLED)，状态属性落 DISABLED
    manager
        .service
        .set_disabled(&manager_ctx(), &manager.gateway_id, true)
        .await
        .expect("disable");
    let end = session.await.expect("session join").expect("session end");
    assert_eq!(
        end,
        ams_gateway::SessionTermination::PeerDisconnect(ams_gateway::DisconnectReason::Disabled)
    );
    let gateway_asset = manager
        .store
        .find_asset(&manager_ctx(), &manager.gateway_id)
        .await
        .expect("find")
        .expect("gateway asset");
    assert_eq!(
        gateway_asset.attribute_str(STATUS_ATTRIBUTE),
        Some("DISABLED")
    );
    assert!(gateway_asset.attribute_bool(DISABLED_ATTRIBUTE));

    // 停用期间拒绝接入
    let (refused_ch, _peer) = in_memory_pair(16);
    let err = manager
        .service
        .attach(&manager.gateway_id, MANAGER_REALM, refused_ch)
        .await
        .expect_err("disabled gateway refuses traffic");
    assert!(matches!(err, ams_gateway::GatewayError::GatewayDisabled));

    // 网关侧漂移：增一、删一、改一
    let mut extra = Asset::new("Extra Room", AssetType::Room, SITE_REALM, 2_000);
    extra.id = "a-room-99".to_string();
    extra.parent_id = Some("b-building-01".to_string());
    client.local_upsert(extra).await.expect("add");
    client.local_delete("a-room-02").await.expect("remove");
    client
        .local_write(AttributeEvent::new(
            "a-room-01",
            "light1Toggle",
            Some(serde_json::json!(false)),
            2_000,
        ))
        .await
        .expect("attribute drift");

    // 重新启用并重连：一轮同步追平
    manager
        .service
        .set_disabled(&manager_ctx(), &manager.gateway_id, false)
        .await
        .expect("enable");
    let (connector, _session) = connect(&manager, client).await;
    assert!(wait_connected(&connector).await, "reconnected");
    assert!(wait_mirror_count(&manager, 30).await, "drift reconciled");

    let ctx = manager_ctx();
    assert!(manager
        .store
        .find_asset(&ctx, &map_asset_id(&manager.gateway_id, "a-room-99"))
        .await
        .expect("find")
        .is_some());
    assert!(manager
        .store
        .find_asset(&ctx, &map_asset_id(&manager.gateway_id, "a-room-02"))
        .await
        .expect("find")
        .is_none());
    let room1 = manager
        .store
        .find_asset(&ctx, &map_asset_id(&manager.gateway_id, "a-room-01"))
        .await
        .expect("find")
        .expect("room 1");
    assert_eq!(
        room1
            .attribute("light1Toggle")
            .and_then(|attribute| attribute.value.clone()),
        Some(serde_json::json!(false))
    );
}

/// 场景 5：网关删除是整体的。
#[tokio::test]
async fn gateway_deletion_is_total_and_idempotent() {
    let manager = manager_with_gateway(20).await;
    let site = site();
    seed_site_tree(&site).await;
    let client = Arc::new(site_client(&site));

    let (connector, _session) = connect(&manager, client).await;
    assert!(wait_connected(&connector).await);
    assert!(wait_mirror_count(&manager, 30).await);

    let deleted = manager
        .service
        .delete_gateway(&manager_ctx(), &manager.gateway_id)
        .await
        .expect("delete");
    assert!(deleted);
    assert_eq!(mirror_ids(&manager).await.len(), 0, "no descendants remain");
    assert!(manager
        .store
        .find_asset(&manager_ctx(), &manager.gateway_id)
        .await
        .expect("find")
        .is_none());
    assert!(
        manager.service.connector(&manager.gateway_id).await.is_none(),
        "connector map entry removed"
    );

    let again = manager
        .service
        .delete_gateway(&manager_ctx(), &manager.gateway_id)
        .await
        .expect("idempotent delete");
    assert!(!again);
}
