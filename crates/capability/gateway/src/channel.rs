//! 通道抽象：协议逻辑与传输泵之间的有界帧队列
//!
//! 连接器/客户端只面对一对 mpsc 队列；WebSocket 泵在两端把套接字
//! 消息搬运进出。队列有界，入站消费跟不上时发送端等待，传输泵因此
//! 停止读套接字——背压靠不读实现，绝不丢帧。

use tokio::sync::mpsc;

/// 一端的消息通道：出站发送 + 入站接收。
pub struct MessageChannel {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// 构造互联的内存通道对（测试与进程内对接用）。
pub fn in_memory_pair(capacity: usize) -> (MessageChannel, MessageChannel) {
    let (left_tx, right_rx) = mpsc::channel(capacity);
    let (right_tx, left_rx) = mpsc::channel(capacity);
    (
        MessageChannel {
            outbound: left_tx,
            inbound: left_rx,
        },
        MessageChannel {
            outbound: right_tx,
            inbound: right_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_is_cross_wired() {
        let (mut left, mut right) = in_memory_pair(4);
        left.outbound.send("ping".to_string()).await.expect("send");
        assert_eq!(right.inbound.recv().await.as_deref(), Some("ping"));
        right.outbound.send("pong".to_string()).await.expect("send");
        assert_eq!(left.inbound.recv().await.as_deref(), Some("pong"));
    }
}
