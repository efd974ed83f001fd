//! 컨트롤러 REST 경로 통합 테스트.
//!
//! mockito 서버를 상대로 인증 상태 전이, 에러 채널, 설정 파일 기반 조립을 검증한다.

use apilink_core::config_manager::ConfigManager;
use apilink_core::models::event::SessionEvent;
use apilink_core::models::outcome::OutcomeKind;
use apilink_core::models::request::RestRequest;
use apilink_network::controller::SessionController;
use std::time::Duration;
use tokio::sync::broadcast;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn controller(base: &str) -> SessionController {
    SessionController::builder()
        .with_web_address(format!("{base}/"))
        .with_version("v1")
        .with_api_key("secret")
        .build()
        .unwrap()
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn auth_failure_then_recovery() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let denied = server
        .mock("GET", "/v1/printers")
        .with_status(403)
        .expect(1)
        .create_async()
        .await;

    let controller = controller(&server.url());
    let mut rx = controller.subscribe();

    let outcome = controller
        .execute(RestRequest::get("printers"))
        .await
        .unwrap();
    assert_eq!(outcome.kind, OutcomeKind::AuthFailure);
    assert!(controller.state().authentication_failed());
    denied.assert_async().await;
    denied.remove_async().await;

    let _ok = server
        .mock("GET", "/v1/printers")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let outcome = controller
        .execute(RestRequest::get("printers"))
        .await
        .unwrap();
    assert!(outcome.succeeded);
    assert!(!controller.state().authentication_failed());

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(SessionEvent::AuthenticationError { status, .. }) if status == "403"
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::AuthenticationSucceeded)));
}

#[tokio::test]
async fn conflict_is_an_outcome_not_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("PUT", "/v1/jobs/7")
        .with_status(409)
        .create_async()
        .await;

    let controller = controller(&server.url());
    let mut rx = controller.subscribe();
    let outcome = controller
        .execute(
            RestRequest::put("jobs")
                .with_command("7")
                .with_body(serde_json::json!({"state": "paused"})),
        )
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    assert!(outcome.is_online);
    assert!(!outcome.has_auth_error);
    assert!(outcome.error.is_none());
    assert!(drain(&mut rx).iter().all(|e| !e.is_error()));
}

#[tokio::test]
async fn server_error_goes_to_rest_error_channel() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/status")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let controller = controller(&server.url());
    let mut rx = controller.subscribe();
    let outcome = controller
        .execute(RestRequest::get("status"))
        .await
        .unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Error);
    assert!(outcome.is_online);
    match rx.recv().await.unwrap() {
        SessionEvent::RestError { error, is_online } => {
            assert!(is_online);
            let message = error.to_string();
            assert!(message.contains("500"));
            assert!(message.contains("boom"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // rethrow 모드에서는 같은 에러가 호출자에게도 반환됨
    controller.set_rethrow(true);
    assert!(controller
        .execute(RestRequest::get("status"))
        .await
        .is_err());
}

#[tokio::test]
async fn slow_endpoint_times_out_without_error_while_online() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/slow")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(1500));
            w.write_all(b"late")
        })
        .create_async()
        .await;

    let controller = controller(&server.url());
    let mut rx = controller.subscribe();
    let outcome = controller
        .execute(RestRequest::get("slow").with_timeout(Duration::from_millis(200)))
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::TaskCanceled { .. })));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Error(_))));
}

#[tokio::test]
async fn controller_from_config_file() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v2")
        .with_status(200)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manager = ConfigManager::with_path(dir.path().join("apilink.json")).unwrap();
    let url = format!("{}/", server.url());
    manager
        .update_with(|config| {
            config.server.base_url = url;
            config.server.api_version = "v2".to_string();
        })
        .unwrap();

    let controller = SessionController::builder()
        .with_config(manager.get())
        .build()
        .unwrap();
    assert!(controller.check_online(None).await.unwrap());
    mock.assert_async().await;
}

#[test]
fn api_validity_check_blocking() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/v1/server/info")
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .create();

    let controller = controller(&server.url());
    let valid = tokio_test::block_on(controller.check_if_api_is_valid("server", "info", None));
    assert!(valid.unwrap());
}
