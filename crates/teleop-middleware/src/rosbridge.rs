//! rosbridge v2 client transport.
//!
//! [`RosbridgeTransport`] keeps one WebSocket connection to a
//! `rosbridge_server` and speaks its JSON protocol:
//!
//! ```json
//! {"op":"advertise","id":"advertise:/cmd_vel:…","topic":"/cmd_vel","type":"geometry_msgs/msg/Twist"}
//! {"op":"publish","topic":"/cmd_vel","msg":{"linear":{"x":0.5,…},"angular":{…}}}
//! {"op":"unadvertise","id":"unadvertise:/cmd_vel:…","topic":"/cmd_vel"}
//! ```
//!
//! Sends never block: frames go onto an unbounded queue drained by a writer
//! task.  A reader task watches for the server closing the socket.  Either
//! task flips the connection state to `false` when it stops.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use teleop_types::TeleopError;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::Transport;

/// Build a rosbridge `advertise` frame.
pub fn build_advertise_frame(topic: &str, message_type: &str) -> Value {
    json!({
        "op": "advertise",
        "id": format!("advertise:{topic}:{}", Uuid::new_v4()),
        "topic": topic,
        "type": message_type,
    })
}

/// Build a rosbridge `unadvertise` frame.
pub fn build_unadvertise_frame(topic: &str) -> Value {
    json!({
        "op": "unadvertise",
        "id": format!("unadvertise:{topic}:{}", Uuid::new_v4()),
        "topic": topic,
    })
}

/// Build a rosbridge `publish` frame around an encoded message body.
pub fn build_publish_frame(topic: &str, message: &Value) -> Value {
    json!({
        "op": "publish",
        "topic": topic,
        "msg": message,
    })
}

pub struct RosbridgeTransport {
    url: String,
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<watch::Sender<bool>>,
}

impl RosbridgeTransport {
    /// Open the WebSocket and spawn the reader/writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::TransportNotReady`] when the handshake fails.
    pub async fn connect(url: impl Into<String>) -> Result<Self, TeleopError> {
        let url = url.into();
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TeleopError::TransportNotReady(format!("connect {url}: {e}")))?;
        info!(url = %url, "rosbridge connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (outbound, mut frames) = mpsc::unbounded_channel::<String>();
        let connected = Arc::new(watch::Sender::new(true));

        let writer_state = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!(error = %e, "rosbridge send failed");
                    break;
                }
            }
            writer_state.send_replace(false);
            let _ = ws_tx.close().await;
        });

        let reader_state = Arc::clone(&connected);
        let reader_url = url.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Text(text)) => debug!(len = text.len(), "rosbridge inbound frame ignored"),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "rosbridge read failed");
                        break;
                    }
                }
            }
            if reader_state.send_replace(false) {
                info!(url = %reader_url, "rosbridge disconnected");
            }
        });

        Ok(Self {
            url,
            outbound,
            connected,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn send(&self, frame: Value) -> Result<(), TeleopError> {
        if !*self.connected.borrow() {
            return Err(TeleopError::TransportNotReady(format!("{} is disconnected", self.url)));
        }
        let text = serde_json::to_string(&frame).map_err(|e| TeleopError::Serialization(e.to_string()))?;
        self.outbound
            .send(text)
            .map_err(|_| TeleopError::TransportNotReady(format!("{} writer stopped", self.url)))
    }
}

impl Transport for RosbridgeTransport {
    fn advertise(&self, topic: &str, message_type: &str) -> Result<(), TeleopError> {
        self.send(build_advertise_frame(topic, message_type))
    }

    fn unadvertise(&self, topic: &str) -> Result<(), TeleopError> {
        self.send(build_unadvertise_frame(topic))
    }

    fn publish(&self, topic: &str, message: &Value) -> Result<(), TeleopError> {
        self.send(build_publish_frame(topic, message))
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn advertise_frame_shape() {
        let frame = build_advertise_frame("/cmd_vel", "geometry_msgs/msg/Twist");
        assert_eq!(frame["op"], "advertise");
        assert_eq!(frame["topic"], "/cmd_vel");
        assert_eq!(frame["type"], "geometry_msgs/msg/Twist");
        assert!(frame["id"].as_str().unwrap().starts_with("advertise:/cmd_vel:"));
    }

    #[test]
    fn publish_frame_wraps_body() {
        let body = json!({"linear": {"x": 0.5}});
        let frame = build_publish_frame("/cmd_vel", &body);
        assert_eq!(frame["op"], "publish");
        assert_eq!(frame["msg"], body);
    }

    #[test]
    fn unadvertise_ids_are_unique() {
        let a = build_unadvertise_frame("/joy");
        let b = build_unadvertise_frame("/joy");
        assert_eq!(a["op"], "unadvertise");
        assert_ne!(a["id"], b["id"]);
    }

    #[tokio::test]
    async fn connect_failure_is_not_ready() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = RosbridgeTransport::connect(format!("ws://{addr}")).await;
        assert!(matches!(result, Err(TeleopError::TransportNotReady(_))));
    }

    #[tokio::test]
    async fn frames_reach_server_and_close_is_observed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut ops = Vec::new();
            while ops.len() < 3 {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                        ops.push(frame);
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            ws.close(None).await.unwrap();
            ops
        });

        let transport = RosbridgeTransport::connect(format!("ws://{addr}")).await.unwrap();
        let mut connection = transport.connection();
        assert!(transport.is_connected());

        transport.advertise("/cmd_vel", "geometry_msgs/msg/Twist").unwrap();
        transport.publish("/cmd_vel", &json!({"linear": {"x": 0.25}})).unwrap();
        transport.unadvertise("/cmd_vel").unwrap();

        let ops = server.await.unwrap();
        assert_eq!(ops[0]["op"], "advertise");
        assert_eq!(ops[1]["op"], "publish");
        assert_eq!(ops[1]["msg"]["linear"]["x"], 0.25);
        assert_eq!(ops[2]["op"], "unadvertise");

        connection.wait_for(|up| !*up).await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.publish("/cmd_vel", &json!({})),
            Err(TeleopError::TransportNotReady(_))
        ));
    }
}
