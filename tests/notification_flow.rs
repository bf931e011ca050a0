//! End-to-end tests for notification reconciliation over HTTP and the live channel.
//!
//! The REST store is mocked with wiremock; the live channel is an in-process
//! tokio-tungstenite server. Together they exercise:
//! 1. Fetch / mark-read / push reconciliation through the real HTTP adapter
//! 2. Rollback and the sync indicator when the store rejects a mutation
//! 3. Session wiring: initial fetch, live push, logout teardown

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notify_client::{ClientError, Config, HttpNotificationApi, NotificationCenter, Session};

fn notification_json(id: &str, is_read: bool) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "userId": "u1",
        "type": "comment",
        "title": format!("title {id}"),
        "message": "hello",
        "documentId": "doc-1",
        "isRead": is_read,
        "createdAt": "2026-03-01T12:00:00Z"
    })
}

fn config_for(server: &MockServer) -> Config {
    let mut cfg = Config::new(&server.uri(), "u1").unwrap().with_token("sk-test");
    cfg.http_max_retries = 0;
    cfg
}

async fn mount_list(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

mod http_reconciliation {
    use super::*;

    #[tokio::test]
    async fn test_fetch_then_mark_read_then_push() {
        let server = MockServer::start().await;
        mount_list(
            &server,
            serde_json::json!([notification_json("n1", false), notification_json("n2", true)]),
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/notifications/n1/read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(notification_json("n1", true)))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpNotificationApi::new(&config_for(&server)).unwrap();
        let center = NotificationCenter::new(api);

        tokio_test::assert_ok!(center.refresh().await);
        assert_eq!(center.snapshot().unread_count, 1);

        tokio_test::assert_ok!(center.mark_read("n1").await);
        let view = center.snapshot();
        assert_eq!(view.unread_count, 0);
        assert!(view.notifications.iter().all(|n| n.is_read));

        let pushed: notify_client::models::Notification =
            serde_json::from_value(notification_json("n3", false)).unwrap();
        center.apply_push(pushed);
        let view = center.snapshot();
        let ids: Vec<_> = view.notifications.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n1", "n2"]);
        assert_eq!(view.unread_count, 1);
    }

    #[tokio::test]
    async fn test_server_error_rolls_back_mark_all_read() {
        let server = MockServer::start().await;
        mount_list(
            &server,
            serde_json::json!([notification_json("a", false), notification_json("b", false)]),
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/notifications/read-all"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let center = NotificationCenter::new(HttpNotificationApi::new(&config_for(&server)).unwrap());
        center.refresh().await.unwrap();

        let err = tokio_test::assert_err!(center.mark_all_read().await);
        assert!(err.is_retryable());
        let view = center.snapshot();
        assert_eq!(view.unread_count, 2);
        assert_eq!(view.sync_error.as_deref(), Some("couldn't sync notifications"));
    }

    #[tokio::test]
    async fn test_not_found_rolls_back_and_reports() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([notification_json("gone", false)])).await;
        Mock::given(method("PUT"))
            .and(path("/notifications/gone/read"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let center = NotificationCenter::new(HttpNotificationApi::new(&config_for(&server)).unwrap());
        center.refresh().await.unwrap();

        match center.mark_read("gone").await {
            Err(ClientError::NotFound { id }) => assert_eq!(id, "gone"),
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert_eq!(center.snapshot().unread_count, 1);
    }

    #[tokio::test]
    async fn test_repeated_mark_read_counts_once() {
        let server = MockServer::start().await;
        mount_list(
            &server,
            serde_json::json!([notification_json("a", false), notification_json("b", false)]),
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/notifications/a/read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(notification_json("a", true)))
            .mount(&server)
            .await;

        let center = NotificationCenter::new(HttpNotificationApi::new(&config_for(&server)).unwrap());
        center.refresh().await.unwrap();
        center.mark_read("a").await.unwrap();
        let once = center.snapshot();
        center.mark_read("a").await.unwrap();
        assert_eq!(center.snapshot(), once);
        assert_eq!(once.unread_count, 1);
    }
}

mod session_wiring {
    use super::*;

    #[tokio::test]
    async fn test_session_applies_live_push_and_logs_out() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([notification_json("n1", false)])).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_url = format!("ws://{}/socket", listener.local_addr().unwrap());

        let mut cfg = config_for(&server).with_ws_url(&ws_url).unwrap();
        cfg.resync_on_reconnect = false;
        let session = Session::new(cfg).unwrap();

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(stream).await.unwrap()
        });

        let center = session.start_center().await;
        assert_eq!(center.snapshot().notifications.len(), 1);

        let mut ws = timeout(Duration::from_secs(5), accept).await.unwrap().unwrap();
        let join = ws.next().await.unwrap().unwrap();
        let join: serde_json::Value = serde_json::from_str(join.to_text().unwrap()).unwrap();
        assert_eq!(join["data"], "u1");

        let mut rx = center.watch();
        let frame = serde_json::json!({"event": "new-notification", "data": notification_json("n2", false)});
        ws.send(Message::Text(frame.to_string())).await.unwrap();

        timeout(Duration::from_secs(5), async {
            while rx.borrow_and_update().notifications.len() < 2 {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("push should reach the mirror");

        let view = center.snapshot();
        assert_eq!(view.notifications[0].id, "n2");
        assert_eq!(view.unread_count, 2);

        session.logout().await;
        assert!(!center.is_alive());

        // pushes after logout are ignored
        let _ = ws
            .send(Message::Text(
                serde_json::json!({"event": "new-notification", "data": notification_json("n9", false)})
                    .to_string(),
            ))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(center.snapshot().notifications.len(), 2);
    }

    #[tokio::test]
    async fn test_session_without_live_endpoint_still_fetches() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([notification_json("n1", true)])).await;

        let session = Session::new(config_for(&server)).unwrap();
        let center = session.start_center().await;
        let view = center.snapshot();
        assert_eq!(view.notifications.len(), 1);
        assert_eq!(view.unread_count, 0);
        session.logout().await;
    }
}
