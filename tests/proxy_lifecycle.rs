use std::net::TcpListener;
use std::time::Duration;

use proxyctl::api::control_api::{MSG_ALREADY_RUNNING, MSG_NOT_RUNNING, MSG_START_SUCCESS};
use proxyctl::api::{init_core, ControlApi};
use proxyctl::config::ControllerConfig;
use proxyctl::proxy::StartOptions;
use tempfile::TempDir;

fn available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn open_api(storage_dir: &TempDir) -> ControlApi {
    init_core(Some(storage_dir.path())).unwrap();

    let mut config = ControllerConfig::load(storage_dir.path()).unwrap();
    config.host = Some("127.0.0.1".to_string());
    config.port = available_port();
    ControlApi::open(config).expect("control api opens")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn proxy_start_stop_transitions_state() {
    let storage_dir = tempfile::tempdir().unwrap();
    let api = open_api(&storage_dir);
    let port = api.config().port;

    let reply = api
        .start_proxy(StartOptions::default())
        .await
        .expect("proxy starts");
    assert_eq!(reply.msg, MSG_START_SUCCESS);
    assert_eq!(reply.port, port);
    assert!(api.status().is_running());

    tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("listener accepts connections");

    let again = api.start_proxy(StartOptions::default()).await.unwrap();
    assert_eq!(again.msg, MSG_ALREADY_RUNNING);
    assert_eq!((again.address, again.port), (reply.address, reply.port));

    api.stop_proxy().expect("proxy stops");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!api.status().is_running());
    assert_eq!(api.stop_proxy().unwrap_err().msg, MSG_NOT_RUNNING);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saved_custom_rule_is_used_on_next_start() {
    let storage_dir = tempfile::tempdir().unwrap();
    let api = open_api(&storage_dir);

    let sample = api.fetch_sample_rule("block_ads").expect("bundled sample");
    api.save_custom_rule("7", &sample).unwrap();

    api.start_proxy(StartOptions {
        rule_id: Some("7".to_string()),
        ..Default::default()
    })
    .await
    .expect("proxy starts with custom rule");
    assert_eq!(api.status().rule_id.as_deref(), Some("7"));
    api.stop_proxy().unwrap();

    api.delete_custom_rule("7").unwrap();
    api.start_proxy(StartOptions {
        rule_id: Some("7".to_string()),
        port: Some(available_port()),
        ..Default::default()
    })
    .await
    .expect("deleted rule falls back to default behaviour");
    assert_eq!(api.status().rule_id, None);
    api.stop_proxy().unwrap();
}

#[tokio::test]
async fn fresh_data_dir_has_samples_and_empty_log() {
    let storage_dir = tempfile::tempdir().unwrap();
    let api = open_api(&storage_dir);

    assert_eq!(
        api.list_sample_rules().unwrap(),
        vec!["block_ads", "rewrite_headers"]
    );
    assert!(api.read_rules().unwrap().is_empty());
    assert!(api.latest_log().await.unwrap().is_empty());
}
