//! Integration tests: start the relay on a free port and exercise the HTTP
//! front door. Neither WhatsApp nor a completion backend needs to be
//! reachable; external base URLs point at closed local ports.

use lib::config::Config;
use lib::server;
use std::path::PathBuf;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn test_config(port: u16) -> (Config, PathBuf) {
    let store_dir = std::env::temp_dir().join(format!("simon-server-test-{}", uuid::Uuid::new_v4()));
    let mut config = Config::default();
    config.server.port = port;
    config.server.bind = "127.0.0.1".to_string();
    config.whatsapp.api_token = Some("test-token".to_string());
    config.whatsapp.number_id = Some("1055".to_string());
    config.whatsapp.verify_token = Some("hook-secret".to_string());
    config.whatsapp.api_base = Some(format!("http://127.0.0.1:{}", free_port()));
    config.completion.api_key = Some("test-key".to_string());
    config.completion.base_url = Some(format!("http://127.0.0.1:{}", free_port()));
    config.store.directory = Some(store_dir.clone());
    (config, store_dir)
}

async fn wait_until_healthy(client: &reqwest::Client, port: u16) {
    let url = format!("http://127.0.0.1:{}/", port);
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("GET {} did not return 200 with health JSON within 5s", url);
}

#[tokio::test]
async fn health_and_verification_handshake() {
    let port = free_port();
    let (config, _store_dir) = test_config(port);
    tokio::spawn(async move {
        let _ = server::run_server(config).await;
    });

    let client = reqwest::Client::new();
    wait_until_healthy(&client, port).await;

    let url = format!(
        "http://127.0.0.1:{}/webhook?hub.verify_token=hook-secret&hub.challenge=42",
        port
    );
    let resp = client.get(&url).send().await.expect("handshake request");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.expect("body"), "42");

    let url = format!(
        "http://127.0.0.1:{}/webhook?hub.verify_token=wrong&hub.challenge=42",
        port
    );
    let resp = client.get(&url).send().await.expect("handshake request");
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn webhook_error_mapping() {
    let port = free_port();
    let (config, store_dir) = test_config(port);
    tokio::spawn(async move {
        let _ = server::run_server(config).await;
    });

    let client = reqwest::Client::new();
    wait_until_healthy(&client, port).await;
    let url = format!("http://127.0.0.1:{}/webhook", port);

    // Not JSON at all.
    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status().as_u16(), 400);

    // Parses but misses the required notification path.
    let resp = client
        .post(&url)
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert!(body.get("error").is_some());

    // Well-formed notification, but the completion backend is unreachable:
    // the cycle fails upstream and nothing is persisted.
    let notification = serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "contacts": [{"wa_id": "123"}],
                    "messages": [{"text": {"body": "Hello!"}}]
                }
            }]
        }]
    });
    let resp = client
        .post(&url)
        .json(&notification)
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status().as_u16(), 502);
    assert!(!store_dir.join("123.json").exists());
}
