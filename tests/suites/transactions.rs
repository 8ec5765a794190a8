use crate::common::{
    client, create_store, create_test_config, error_json, setup, spawn_mock_engine, spawn_proxy,
};
use std::sync::Arc;

const UPDATE_ROADS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:Transaction service="WFS" version="1.1.0" xmlns:wfs="http://www.opengis.net/wfs" xmlns:ogc="http://www.opengis.net/ogc">
  <wfs:Update typeName="feature:Roads">
    <wfs:Property><wfs:Name>name</wfs:Name><wfs:Value>Main St</wfs:Value></wfs:Property>
    <ogc:Filter><ogc:FeatureId fid="Roads.1"/></ogc:Filter>
  </wfs:Update>
</wfs:Transaction>"#;

const INSERT_ROADS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:Transaction service="WFS" version="1.1.0" xmlns:wfs="http://www.opengis.net/wfs" xmlns:feature="http://example.org/feature">
  <wfs:Insert>
    <feature:Roads><feature:name>Side St</feature:name></feature:Roads>
  </wfs:Insert>
</wfs:Transaction>"#;

fn wfs_url(port: u16, project: &str) -> String {
    format!("http://127.0.0.1:{port}/ows/{project}?SERVICE=WFS&REQUEST=Transaction")
}

#[tokio::test]
async fn test_denied_update_never_reaches_engine() {
    let (engine, port) = setup().await;

    let resp = client()
        .post(wfs_url(port, "alice/parks"))
        .header("X-Forwarded-User", "bob")
        .body(UPDATE_ROADS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let json = error_json(resp).await;
    assert_eq!(json["status"], 403);
    assert_eq!(json["message"], "Forbidden");
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_permitted_insert_forwarded_unchanged() {
    let (engine, port) = setup().await;

    let resp = client()
        .post(wfs_url(port, "alice/parks"))
        .header("X-Forwarded-User", "bob")
        .header("Content-Type", "text/xml")
        .body(INSERT_ROADS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "<EngineResponse/>");

    let requests = engine.requests();
    assert_eq!(requests.len(), 1);
    let seen = &requests[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body.as_ref(), INSERT_ROADS.as_bytes());
    assert_eq!(seen.params("MAP"), vec!["/publish/alice/parks/parks.qgs"]);
    assert!(seen.headers.get("x-forwarded-user").is_none());
}

#[tokio::test]
async fn test_anonymous_insert_denied() {
    let (engine, port) = setup().await;

    let resp = client()
        .post(wfs_url(port, "alice/parks"))
        .body(INSERT_ROADS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_malformed_transaction_rejected() {
    let (engine, port) = setup().await;

    let resp = client()
        .post(wfs_url(port, "alice/parks"))
        .header("X-Forwarded-User", "bob")
        .body("<wfs:Transaction><wfs:Insert>")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let message = error_json(resp).await["message"].as_str().unwrap().to_string();
    assert!(message.starts_with("Invalid WFS transaction"), "{message}");
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_oversized_transaction_rejected() {
    let engine = spawn_mock_engine().await;
    let mut config = (*create_test_config(engine.port)).clone();
    config.max_transaction_body_size = 128;
    let (port, _) = spawn_proxy(Arc::new(config), create_store(&engine)).await;

    let resp = client()
        .post(wfs_url(port, "alice/parks"))
        .header("X-Forwarded-User", "bob")
        .body(INSERT_ROADS)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_transaction_body_behind_other_request_denied() {
    let (engine, port) = setup().await;

    for query in ["?SERVICE=WFS&REQUEST=GetFeature", "?SERVICE=WMS&REQUEST=GetMap", ""] {
        let resp = client()
            .post(format!("http://127.0.0.1:{port}/ows/alice/parks{query}"))
            .header("X-Forwarded-User", "bob")
            .body(UPDATE_ROADS)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 403, "query {query:?}");
    }
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_conflicting_type_names_rejected() {
    let (engine, port) = setup().await;

    let resp = client()
        .post(wfs_url(port, "alice/parks"))
        .header("X-Forwarded-User", "bob")
        .body(r#"<wfs:Transaction xmlns:wfs="http://www.opengis.net/wfs"><wfs:Update typename="feature:Parcels" typeName="feature:Roads"/></wfs:Transaction>"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_post_query_forwarded_buffered() {
    let (engine, port) = setup().await;
    let body = r#"<wfs:GetFeature service="WFS" version="1.1.0" xmlns:wfs="http://www.opengis.net/wfs"><wfs:Query typeName="feature:Roads"/></wfs:GetFeature>"#;

    let resp = client()
        .post(format!(
            "http://127.0.0.1:{port}/ows/alice/parks?SERVICE=WFS&REQUEST=GetFeature&map=/etc/passwd"
        ))
        .header("Cookie", "session=secret")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let server = resp.headers().get("server").map(|v| v.to_str().unwrap().to_string());
    assert_ne!(server.as_deref(), Some("QGIS Server"));
    assert_eq!(resp.text().await.unwrap(), "<EngineResponse/>");

    let requests = engine.requests();
    assert_eq!(requests.len(), 1);
    let seen = &requests[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body.as_ref(), body.as_bytes());
    assert_eq!(seen.params("MAP"), vec!["/publish/alice/parks/parks.qgs"]);
    assert!(seen.headers.get("cookie").is_none());
}
