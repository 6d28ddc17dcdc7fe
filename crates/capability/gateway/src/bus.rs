//! 本地事件总线：资产/属性事件的进程内扇出。

use domain::{AssetEvent, AttributeEvent};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 1024;

/// 进程内事件总线。
#[derive(Clone)]
pub struct EventBus {
    attributes: broadcast::Sender<AttributeEvent>,
    assets: broadcast::Sender<AssetEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (attributes, _) = broadcast::channel(BUS_CAPACITY);
        let (assets, _) = broadcast::channel(BUS_CAPACITY);
        Self { attributes, assets }
    }

    /// 发布属性事件（无订阅者时静默丢弃）。
    pub fn publish_attribute(&self, event: AttributeEvent) {
        let _ = self.attributes.send(event);
    }

    /// 发布资产事件。
    pub fn publish_asset(&self, event: AssetEvent) {
        let _ = self.assets.send(event);
    }

    pub fn subscribe_attributes(&self) -> broadcast::Receiver<AttributeEvent> {
        self.attributes.subscribe()
    }

    pub fn subscribe_assets(&self) -> broadcast::Receiver<AssetEvent> {
        self.assets.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
