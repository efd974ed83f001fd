//! WebSocket 세션 통합 테스트.
//!
//! 로컬 tokio-tungstenite 에코 서버를 상대로 컨트롤러의 listen 수명주기를 검증한다.

use apilink_core::models::auth::{AuthHeaderTarget, AuthTypeTarget};
use apilink_core::models::event::SessionEvent;
use apilink_network::controller::SessionController;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// 텍스트 프레임을 그대로 돌려주는 서버. 요청 URI를 보고한다.
async fn echo_server() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let uri_tx = uri_tx.clone();
            tokio::spawn(async move {
                let callback =
                    move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        let _ = uri_tx.send(req.uri().to_string());
                        Ok(resp)
                    };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, callback).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (format!("ws://{addr}/ws"), uri_rx)
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received")
}

#[tokio::test]
async fn listen_echo_and_stop() {
    let (target, mut uris) = echo_server().await;
    let controller = SessionController::builder().build().unwrap();
    controller.add_or_update_auth_header(
        "token",
        "abc",
        AuthHeaderTarget::UrlSegment,
        0,
        AuthTypeTarget::WebSocket,
    );
    controller.set_session_id("session-1");
    let mut rx = controller.subscribe();

    controller
        .start_listening_at(&target, false, None, vec![r#"{"op":"hello"}"#.to_string()])
        .await
        .unwrap();
    assert!(controller.is_listening());
    assert_eq!(uris.recv().await.unwrap(), "/ws?token=abc");

    // 연결 명령과 초기 핑이 에코되어 돌아옴
    let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::MessageReceived { .. })).await;
    match event {
        SessionEvent::MessageReceived {
            message,
            session_id,
            ..
        } => {
            assert_eq!(message, r#"{"op":"hello"}"#);
            assert_eq!(session_id, "session-1");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let event = wait_for(&mut rx, |e| matches!(e, SessionEvent::MessageReceived { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::MessageReceived { message, .. } if message.contains("server.info")
    ));

    controller.send_command("custom").await.unwrap();
    wait_for(&mut rx, |e| {
        matches!(e, SessionEvent::MessageReceived { message, .. } if message == "custom")
    })
    .await;

    controller.stop_listening().await;
    assert!(!controller.is_listening());
    wait_for(&mut rx, |e| matches!(e, SessionEvent::WebSocketDisconnected { .. })).await;
}

#[tokio::test]
async fn second_listen_without_stop_keeps_one_connection() {
    let (target, mut uris) = echo_server().await;
    let controller = SessionController::builder().build().unwrap();

    controller
        .start_listening_at(&target, false, None, Vec::new())
        .await
        .unwrap();
    controller
        .start_listening_at(&target, false, None, Vec::new())
        .await
        .unwrap();

    uris.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(uris.try_recv().is_err());

    controller.stop_listening().await;
}

#[tokio::test]
async fn refused_websocket_reports_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let controller = SessionController::builder().build().unwrap();
    let mut rx = controller.subscribe();

    controller
        .connect_websocket(&format!("ws://127.0.0.1:{port}"), Vec::new())
        .await
        .unwrap();

    assert!(!controller.is_listening());
    wait_for(&mut rx, |e| matches!(e, SessionEvent::WebSocketError { .. })).await;
}
