//! A scripted stand-in for the extension, for exercising [`Page`] over a
//! real WebSocket.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::identifiers::TabId;
use crate::transport::PendingServer;

use super::Page;

/// What the fake extension answers to one request.
pub(crate) struct Reply {
    /// `result` of a success response, or the message of an error response.
    pub result: std::result::Result<Value, String>,
    /// Events `(method, params)` sent after the response.
    pub events: Vec<(&'static str, Value)>,
}

impl Reply {
    pub(crate) fn ok(result: Value) -> Self {
        Self {
            result: Ok(result),
            events: Vec::new(),
        }
    }

    pub(crate) fn value(value: Value) -> Self {
        Self::ok(json!({ "value": value }))
    }

    pub(crate) fn script_error(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            events: Vec::new(),
        }
    }

    pub(crate) fn then(mut self, method: &'static str, params: Value) -> Self {
        self.events.push((method, params));
        self
    }
}

/// Connects a [`Page`] to a fake extension driven by `respond`.
///
/// `respond` receives each request's method and params.
pub(crate) async fn connect<F>(respond: F) -> Page
where
    F: Fn(&str, &Value) -> Reply + Send + 'static,
{
    let server = PendingServer::bind_localhost().await.expect("bind");
    let url = server.ws_url();

    tokio::spawn(async move {
        let (mut ws, _) = connect_async(url).await.expect("client connect");
        let ready = json!({
            "id": "00000000-0000-0000-0000-000000000000",
            "type": "success",
            "result": {"tabId": 1, "sessionId": 1}
        });
        ws.send(Message::Text(ready.to_string().into()))
            .await
            .expect("ready");

        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let request: Value = serde_json::from_str(&text).expect("request");
            let method = request["method"].as_str().unwrap_or_default().to_string();
            let reply = respond(&method, &request["params"]);

            let response = match reply.result {
                Ok(result) => json!({"id": request["id"], "type": "success", "result": result}),
                Err(message) => json!({
                    "id": request["id"],
                    "type": "error",
                    "error": "javascript error",
                    "message": message
                }),
            };
            ws.send(Message::Text(response.to_string().into()))
                .await
                .expect("response");

            for (event_method, params) in reply.events {
                let event = json!({
                    "id": "22222222-2222-2222-2222-222222222222",
                    "type": "event",
                    "method": event_method,
                    "params": params
                });
                ws.send(Message::Text(event.to_string().into()))
                    .await
                    .expect("event");
            }
        }
    });

    let (connection, ready) = server.accept().await.expect("accept");
    Page::new(connection, TabId::new(ready.tab_id).expect("tab id"))
}
