mod support;

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use shopping_scraper::api::{self, AppState};

use support::{Script, SimulatedLauncher, quick_scraper};

async fn spawn_api(launcher: &Arc<SimulatedLauncher>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(quick_scraper(launcher));

    tokio::spawn(api::serve(listener, state, std::future::pending()));
    addr
}

#[tokio::test]
async fn health_and_index() {
    let launcher = SimulatedLauncher::new(Script::default());
    let addr = spawn_api(&launcher).await;

    let health = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "OK");

    let index: Value = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(index["site"], "Google Shopping");
    assert!(index["endpoints"]["GET /scrape"].is_string());
}

#[tokio::test]
async fn scrape_requires_a_query() {
    let launcher = SimulatedLauncher::new(Script::default());
    let addr = spawn_api(&launcher).await;

    for url in [
        format!("http://{addr}/scrape"),
        format!("http://{addr}/scrape?query=%20%20"),
    ] {
        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["kind"], "configuration");
        assert!(body["error"].as_str().unwrap().contains("query"));
    }
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn scrape_returns_results() {
    let launcher = SimulatedLauncher::new(Script::default());
    let addr = spawn_api(&launcher).await;

    let response = reqwest::get(format!(
        "http://{addr}/scrape?query=gaming%20laptop&fast=true&max_results=5"
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["query"], "gaming laptop");
    assert_eq!(body["count"], 5);
    assert_eq!(body["results"].as_array().unwrap().len(), 5);
    assert_eq!(body["results"][0]["title"], "Product 1");
    assert_eq!(body["mode"]["headless"], true);
    assert_eq!(body["mode"]["keep_session"], false);
    assert!(body["elapsed_seconds"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn launch_failure_maps_to_service_unavailable() {
    let launcher = SimulatedLauncher::new(Script {
        fail_launch: true,
        ..Script::default()
    });
    let addr = spawn_api(&launcher).await;

    let response = reqwest::get(format!("http://{addr}/scrape?query=laptop&fast=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "session_start");
}

#[tokio::test]
async fn navigation_failure_maps_to_bad_gateway() {
    let launcher = SimulatedLauncher::new(Script {
        failing_navigations: 2,
        ..Script::default()
    });
    let addr = spawn_api(&launcher).await;

    let response = reqwest::get(format!("http://{addr}/scrape?query=laptop&fast=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn cleanup_closes_retained_session() {
    let launcher = SimulatedLauncher::new(Script {
        total: 10,
        ..Script::default()
    });
    let addr = spawn_api(&launcher).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "http://{addr}/scrape?query=laptop&fast=true&keep_browser=true"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let first: Value = client
        .post(format!("http://{addr}/cleanup"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["closed"], true);

    let second = client
        .post(format!("http://{addr}/cleanup"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["closed"], false);
    assert_eq!(launcher.closes(), 1);
}
