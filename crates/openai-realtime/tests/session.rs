use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use openai_realtime::types::tools::{FunctionTool, Tool};
use openai_realtime::types::{ServerEvent, Session};
use openai_realtime::{Config, ToolDispatch};
use tokio_tungstenite::tungstenite::Message;

struct StubDispatch;

#[async_trait]
impl ToolDispatch for StubDispatch {
    fn catalog(&self) -> Vec<Tool> {
        vec![Tool::Function(FunctionTool::new(
            "schedule_appointment",
            "Books an appointment for the customer",
            serde_json::json!({
                "type": "object",
                "properties": { "customer_name": { "type": "string" } },
                "required": ["customer_name"]
            }),
        ))]
    }

    async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> serde_json::Value {
        assert_eq!(name, "schedule_appointment");
        let customer = arguments["customer_name"].as_str().unwrap_or("unknown");
        serde_json::json!({
            "success": true,
            "appointment_id": "apt_1",
            "message": format!("Appointment for {customer} confirmed")
        })
    }
}

async fn recv_text(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("socket closed early")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("client sent invalid JSON");
        }
    }
}

async fn send_json(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    value: serde_json::Value,
) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Drives one full session against an in-process provider: configuration is
/// the first frame on the wire, audio appends keep their order and carry
/// unique correlation ids, a completed function call comes back as exactly
/// one `conversation.item.create`, and unrecognized server events are
/// republished rather than dropped.
#[tokio::test]
async fn session_flow_over_local_provider() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // The session configuration must be the first outbound event.
        let update = recv_text(&mut ws).await;
        assert_eq!(update["type"], "session.update");
        assert!(!update["event_id"].as_str().unwrap().is_empty());
        assert_eq!(
            update["session"]["tools"][0]["name"],
            "schedule_appointment"
        );

        send_json(
            &mut ws,
            serde_json::json!({
                "type": "session.created",
                "event_id": "srv_0",
                "session": { "id": "sess_123" }
            }),
        )
        .await;

        // Three audio frames, in carrier order, each individually stamped.
        let mut event_ids = Vec::new();
        for expected in ["AAA", "BBB", "CCC"] {
            let append = recv_text(&mut ws).await;
            assert_eq!(append["type"], "input_audio_buffer.append");
            assert_eq!(append["audio"], expected);
            let id = append["event_id"].as_str().unwrap().to_string();
            assert!(!id.is_empty());
            event_ids.push(id);
        }
        event_ids.sort();
        event_ids.dedup();
        assert_eq!(event_ids.len(), 3, "correlation ids must be unique");

        send_json(
            &mut ws,
            serde_json::json!({
                "type": "response.function_call_arguments.done",
                "event_id": "srv_1",
                "response_id": "resp_1",
                "item_id": "item_1",
                "output_index": 0,
                "call_id": "call_1",
                "name": "schedule_appointment",
                "arguments": "{\"customer_name\":\"Lena\"}"
            }),
        )
        .await;

        // The one legal answer to a function call.
        let item_create = recv_text(&mut ws).await;
        assert_eq!(item_create["type"], "conversation.item.create");
        assert_eq!(item_create["item"]["type"], "function_call_output");
        assert_eq!(item_create["item"]["call_id"], "call_1");
        let output: serde_json::Value =
            serde_json::from_str(item_create["item"]["output"].as_str().unwrap()).unwrap();
        assert_eq!(output["success"], true);
        assert!(!output["appointment_id"].as_str().unwrap().is_empty());
        assert!(output["message"].as_str().unwrap().contains("Lena"));

        send_json(
            &mut ws,
            serde_json::json!({
                "type": "conversation.item.created",
                "event_id": "srv_2",
                "previous_item_id": null,
                "item": { "id": "item_2", "type": "function_call_output", "status": "completed" }
            }),
        )
        .await;

        // A type outside the modeled set must still reach subscribers.
        send_json(
            &mut ws,
            serde_json::json!({
                "type": "rate_limits.updated",
                "event_id": "srv_3",
                "rate_limits": []
            }),
        )
        .await;

        // Drain until the client closes the socket.
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    let config = Config::builder()
        .with_base_url(&format!("ws://{addr}"))
        .with_api_key("sk-test")
        .with_model("gpt-4o-realtime-preview")
        .build();
    let dispatch: Arc<dyn ToolDispatch> = Arc::new(StubDispatch);
    let session = Session::new()
        .with_modalities_enable_audio()
        .with_instructions("You are a call agent.")
        .with_tools(dispatch.catalog())
        .build();

    let mut client = openai_realtime::connect(config, session, Some(dispatch))
        .await
        .expect("connect failed");
    let mut rx = client.server_events().expect("no event stream");

    let created = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("stream closed");
    match created {
        ServerEvent::SessionCreated(e) => assert_eq!(e.session().id(), "sess_123"),
        other => panic!("expected session.created first, got {other:?}"),
    }
    assert_eq!(client.session_id().as_deref(), Some("sess_123"));

    for frame in ["AAA", "BBB", "CCC"] {
        client
            .append_input_audio_buffer(frame.to_string())
            .await
            .unwrap();
    }

    // The function-call event is republished to subscribers, and the
    // unrecognized one arrives under its own name.
    let mut saw_function_call = false;
    let mut saw_other = false;
    while !(saw_function_call && saw_other) {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("stream closed");
        match event {
            ServerEvent::ResponseFunctionCallArgumentsDone(e) => {
                assert_eq!(e.name(), "schedule_appointment");
                saw_function_call = true;
            }
            ServerEvent::Other { kind, .. } => {
                assert_eq!(kind, "rate_limits.updated");
                saw_other = true;
            }
            _ => {}
        }
    }

    client.disconnect();
    // Idempotent: a second disconnect must be harmless.
    client.disconnect();

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server timed out")
        .expect("server task panicked");
}

/// Audio sent when no connection exists is silently dropped, never an error.
#[tokio::test]
async fn append_after_disconnect_is_a_noop() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut frames = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => frames.push(serde_json::from_str::<serde_json::Value>(&text).unwrap()),
                Message::Close(_) => break,
                _ => {}
            }
        }
        frames
    });

    let config = Config::builder()
        .with_base_url(&format!("ws://{addr}"))
        .with_api_key("sk-test")
        .build();
    let session = Session::new().build();
    let mut client = openai_realtime::connect(config, session, None)
        .await
        .unwrap();

    client.disconnect();
    client
        .append_input_audio_buffer("LATE".to_string())
        .await
        .expect("late frame must not error");

    let frames = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server timed out")
        .expect("server task panicked");
    assert!(
        frames
            .iter()
            .all(|f| f["type"] != "input_audio_buffer.append"),
        "no audio may reach the wire after disconnect"
    );
}
