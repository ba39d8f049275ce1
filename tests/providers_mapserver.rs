// tests/providers_mapserver.rs
//
// MapServerProvider against a local axum server serving the layer query and
// the discussion info pages.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use spc_notifier::ingest::providers::mapserver::MapServerProvider;
use spc_notifier::ingest::types::SourceProvider;

async fn serve(query_status: StatusCode) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let query = format!(
        r#"{{"features": [
            {{"attributes": {{"name": "MD 1001", "popupinfo": "{base}/md1001.html"}}}},
            {{"attributes": {{"name": "MD 1002", "popupinfo": "{base}/md1002.html"}}}},
            {{"attributes": {{"name": "MD 1003", "popupinfo": "{base}/md1003.html"}}}},
            {{"attributes": {{"name": "NoArea", "popupinfo": ""}}}}
        ]}}"#
    );

    let app = Router::new()
        .route(
            "/MapServer/0/query",
            get(move || {
                let body = query.clone();
                async move { (query_status, body) }
            }),
        )
        .route(
            "/md1001.html",
            get(|| async {
                "<html><body><pre>\n   Mesoscale Discussion 1001\n   Areas affected...Central Iowa\n</pre></body></html>"
            }),
        )
        .route(
            "/md1002.html",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream error") }),
        )
        .route(
            "/md1003.html",
            get(|| async { "<html><body><p>Discussion text not yet available.</p></body></html>" }),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

#[tokio::test]
async fn discussions_without_text_are_deferred() {
    let base = serve(StatusCode::OK).await;
    let provider = MapServerProvider::new(base.clone(), Duration::from_secs(5)).unwrap();
    assert!(!provider.required());

    let before = Utc::now();
    let items = provider.fetch_latest().await.expect("query ok");

    assert_eq!(items.len(), 1, "only the discussion with page text is kept");
    let md = &items[0];
    assert_eq!(md.title, "Mesoscale Discussion 1001");
    assert_eq!(md.identifier.as_deref(), Some("1001"));
    assert_eq!(md.link, format!("{base}/md1001.html"));
    assert_eq!(md.summary, "Mesoscale Discussion 1001\n   Areas affected...Central Iowa");
    assert!(md.first_seen.is_some_and(|t| t >= before));
}

#[tokio::test]
async fn failed_layer_query_is_an_error() {
    let base = serve(StatusCode::SERVICE_UNAVAILABLE).await;
    let provider = MapServerProvider::new(base, Duration::from_secs(5)).unwrap();
    let err = provider.fetch_latest().await.unwrap_err();
    assert!(format!("{err:#}").contains("non-2xx"));
}
