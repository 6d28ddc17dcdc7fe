use ams_storage::{AssetStore, InMemoryAssetStore, StorageError};
use domain::{Asset, AssetQuery, AssetType, Attribute, RealmContext, ValueType};

fn realm_ctx(realm: &str) -> RealmContext {
    RealmContext::new(realm, "user-1", vec![], vec![])
}

fn asset(name: &str, asset_type: AssetType, realm: &str) -> Asset {
    Asset::new(name, asset_type, realm, 1_000)
}

#[tokio::test]
async fn asset_crud_round_trip() {
    let store = InMemoryAssetStore::new();
    let ctx = realm_ctx("master");
    let building = asset("Building", AssetType::Building, "master");
    let building_id = building.id.clone();
    store.upsert_asset(&ctx, building).await.expect("create");

    let found = store
        .find_asset(&ctx, &building_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(found.name, "Building");

    assert!(store
        .delete_asset(&ctx, &building_id)
        .await
        .expect("delete"));
    assert!(store
        .find_asset(&ctx, &building_id)
        .await
        .expect("find")
        .is_none());
}

#[tokio::test]
async fn parent_must_exist_before_child() {
    let store = InMemoryAssetStore::new();
    let ctx = realm_ctx("master");
    let orphan = asset("Room", AssetType::Room, "master").with_parent("missing-parent");
    let err = store.upsert_asset(&ctx, orphan).await.expect_err("orphan");
    assert!(matches!(err, StorageError::ParentNotFound(_)));
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let store = InMemoryAssetStore::new();
    let ctx = realm_ctx("master");
    let mut room = asset("Room", AssetType::Room, "master");
    room.version = 3;
    let room_id = room.id.clone();
    store.upsert_asset(&ctx, room.clone()).await.expect("create");

    room.version = 2;
    let err = store.upsert_asset(&ctx, room.clone()).await.expect_err("stale");
    assert!(matches!(err, StorageError::VersionConflict { .. }));

    // 等版本重写视为幂等覆盖
    room.version = 3;
    store.upsert_asset(&ctx, room).await.expect("same version");
    let stored = store
        .find_asset(&ctx, &room_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.version, 3);
}

#[tokio::test]
async fn delete_with_children_is_refused() {
    let store = InMemoryAssetStore::new();
    let ctx = realm_ctx("master");
    let building = asset("Building", AssetType::Building, "master");
    let building_id = building.id.clone();
    store.upsert_asset(&ctx, building).await.expect("building");
    let room = asset("Room", AssetType::Room, "master").with_parent(building_id.clone());
    store.upsert_asset(&ctx, room).await.expect("room");

    let err = store
        .delete_asset(&ctx, &building_id)
        .await
        .expect_err("has children");
    assert!(matches!(err, StorageError::Conflict(_)));
}

#[tokio::test]
async fn query_recursive_and_select_excludes() {
    let store = InMemoryAssetStore::new();
    let ctx = realm_ctx("master");
    let mut building = asset("Building", AssetType::Building, "master");
    building.set_attribute(Attribute::new(
        "area",
        ValueType::Number,
        serde_json::json!(120),
        1_000,
    ));
    let building_id = building.id.clone();
    store.upsert_asset(&ctx, building).await.expect("building");
    let room = asset("Room", AssetType::Room, "master").with_parent(building_id.clone());
    let room_id = room.id.clone();
    store.upsert_asset(&ctx, room).await.expect("room");

    let index = store
        .query_assets(&ctx, &AssetQuery::index())
        .await
        .expect("index");
    assert_eq!(index.len(), 2);
    assert!(index.iter().all(|item| item.attributes.is_empty()));
    assert!(index.iter().all(|item| item.path.is_none()));

    let full = store
        .query_assets(&ctx, &AssetQuery::default())
        .await
        .expect("roots");
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].id, building_id);
    assert_eq!(
        full[0].path.as_deref(),
        Some(&[building_id.clone()][..])
    );

    let by_ids = store
        .query_assets(&ctx, &AssetQuery::by_ids(vec![room_id.clone(), building_id.clone()]))
        .await
        .expect("by ids");
    assert_eq!(by_ids.len(), 2);
    assert_eq!(by_ids[0].id, room_id);
    assert_eq!(by_ids[0].path, None, "by_ids query excludes path");
}

#[tokio::test]
async fn descendants_listed_parent_first() {
    let store = InMemoryAssetStore::new();
    let ctx = realm_ctx("master");
    let gateway = asset("GW", AssetType::Gateway, "master");
    let gateway_id = gateway.id.clone();
    store.upsert_asset(&ctx, gateway).await.expect("gateway");
    let building = asset("Building", AssetType::Building, "master").with_parent(gateway_id.clone());
    let building_id = building.id.clone();
    store.upsert_asset(&ctx, building).await.expect("building");
    let room = asset("Room", AssetType::Room, "master").with_parent(building_id.clone());
    let room_id = room.id.clone();
    store.upsert_asset(&ctx, room).await.expect("room");

    let ids = store
        .descendant_ids(&ctx, &gateway_id)
        .await
        .expect("descendants");
    assert_eq!(ids.len(), 2);
    let building_pos = ids.iter().position(|id| id == &building_id).expect("b");
    let room_pos = ids.iter().position(|id| id == &room_id).expect("r");
    assert!(building_pos < room_pos);

    let ancestor = store
        .gateway_ancestor(&ctx, &room_id)
        .await
        .expect("ancestor");
    assert_eq!(ancestor.as_deref(), Some(gateway_id.as_str()));
    let none = store
        .gateway_ancestor(&ctx, &gateway_id)
        .await
        .expect("self");
    assert!(none.is_none());
}

#[tokio::test]
async fn realms_are_isolated() {
    let store = InMemoryAssetStore::new();
    let ctx_a = realm_ctx("realm-a");
    let ctx_b = realm_ctx("realm-b");
    let thing = asset("Thing", AssetType::Thing, "realm-a");
    let thing_id = thing.id.clone();
    store.upsert_asset(&ctx_a, thing).await.expect("create");

    assert!(store
        .find_asset(&ctx_b, &thing_id)
        .await
        .expect("find")
        .is_none());
    let err = store
        .query_assets(&ctx_b, &AssetQuery {
            realm: Some("realm-a".to_string()),
            ..AssetQuery::default()
        })
        .await
        .expect_err("scope");
    assert!(matches!(err, StorageError::Scope(_)));
}
