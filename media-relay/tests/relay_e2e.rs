use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use media_relay::cli::{run, Cli, Commands};
use media_relay_core::ledger::Ledger;
use serde_json::json;
use serial_test::serial;
use tempfile::tempdir;

#[derive(Clone, Default)]
struct Fake {
    // (description, payload) per upload, in arrival order
    uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn channel_post(message_id: i64, caption: &str) -> serde_json::Value {
    json!({
        "update_id": message_id,
        "channel_post": {
            "message_id": message_id,
            "date": 1_700_000_000 + message_id,
            "chat": { "id": -1001, "username": "relaychan", "type": "channel" },
            "caption": caption,
            "video": { "file_id": format!("f{message_id}") }
        }
    })
}

async fn get_updates() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "result": [channel_post(1, "oldest"), channel_post(2, "middle"), channel_post(3, "newest")]
    }))
}

async fn get_file(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    let file_id = q.get("file_id").cloned().unwrap_or_default();
    Json(json!({ "ok": true, "result": { "file_path": format!("videos/{file_id}.mp4") } }))
}

async fn file(Path(name): Path<String>) -> Vec<u8> {
    format!("payload of {name}").into_bytes()
}

async fn videos(State(fake): State<Fake>, mut multipart: Multipart) -> Json<serde_json::Value> {
    let mut description = String::new();
    let mut payload = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name().unwrap_or_default() {
            "description" => description = field.text().await.unwrap(),
            "source" => payload = field.bytes().await.unwrap().to_vec(),
            _ => {}
        }
    }
    let mut uploads = fake.uploads.lock().unwrap();
    uploads.push((description, payload));
    Json(json!({ "id": format!("fb-{}", uploads.len()) }))
}

fn fake_world(fake: Fake) -> Router {
    Router::new()
        .route("/botbot-token/getUpdates", get(get_updates))
        .route("/botbot-token/getFile", get(get_file))
        .route("/file/botbot-token/videos/{name}", get(file))
        .route("/v21.0/{page}/videos", post(videos))
        .with_state(fake)
}

#[tokio::test]
#[serial]
async fn telegram_to_page_relays_once_in_chronological_order() {
    let fake = Fake::default();
    let addr = serve(fake_world(fake.clone())).await;
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("posted_cache.json");
    let work_dir = dir.path().join("work");

    let config_path = dir.path().join("relay.yaml");
    std::fs::write(
        &config_path,
        format!(
            r#"
source:
  type: telegram
  chat: "@relaychan"
  api_base: "http://{addr}"
relay:
  batch_limit: 5
  work_dir: "{work}"
  ledger_path: "{ledger}"
fetch:
  retries: 0
  backoff_secs: 0
  timeout_secs: 10
publish:
  graph_url: "http://{addr}"
"#,
            work = work_dir.display(),
            ledger = ledger_path.display(),
        ),
    )
    .unwrap();

    std::env::remove_var("MAX_RESULTS");
    std::env::set_var("TELEGRAM_BOT_TOKEN", "bot-token");
    std::env::set_var("FACEBOOK_PAGE_ID", "page-1");
    std::env::set_var("FACEBOOK_PAGE_ACCESS_TOKEN", "page-token");

    let cli = || Cli {
        command: Commands::Relay {
            config: config_path.clone(),
        },
    };

    run(cli()).await.expect("first run should succeed");
    {
        let uploads = fake.uploads.lock().unwrap();
        let captions: Vec<_> = uploads.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(captions, vec!["oldest", "middle", "newest"]);
        assert_eq!(uploads[0].1, b"payload of f1.mp4".to_vec());
    }

    let ledger = Ledger::load(&ledger_path);
    assert_eq!(
        ledger.ids().collect::<Vec<_>>(),
        vec!["-1001_1", "-1001_2", "-1001_3"]
    );
    assert_eq!(std::fs::read_dir(&work_dir).unwrap().count(), 0);

    // second run sees the same posts and publishes nothing
    run(cli()).await.expect("second run should succeed");
    assert_eq!(fake.uploads.lock().unwrap().len(), 3);

    std::env::remove_var("TELEGRAM_BOT_TOKEN");
    std::env::remove_var("FACEBOOK_PAGE_ID");
    std::env::remove_var("FACEBOOK_PAGE_ACCESS_TOKEN");
}

#[tokio::test]
#[serial]
async fn unreachable_source_fails_the_run() {
    let dir = tempdir().unwrap();
    // bind then drop to get a port nobody listens on
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config_path = dir.path().join("relay.yaml");
    std::fs::write(
        &config_path,
        format!(
            "source:\n  type: telegram\n  chat: \"@relaychan\"\n  api_base: \"http://{addr}\"\nrelay:\n  ledger_path: \"{}\"\n",
            dir.path().join("posted_cache.json").display()
        ),
    )
    .unwrap();

    std::env::remove_var("MAX_RESULTS");
    std::env::set_var("TELEGRAM_BOT_TOKEN", "bot-token");
    std::env::set_var("FACEBOOK_PAGE_ID", "page-1");
    std::env::set_var("FACEBOOK_PAGE_ACCESS_TOKEN", "page-token");

    let result = run(Cli {
        command: Commands::Relay {
            config: config_path,
        },
    })
    .await;

    std::env::remove_var("TELEGRAM_BOT_TOKEN");
    std::env::remove_var("FACEBOOK_PAGE_ID");
    std::env::remove_var("FACEBOOK_PAGE_ACCESS_TOKEN");

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("source unavailable"), "got: {err:#}");
    assert!(!dir.path().join("posted_cache.json").exists());
}
