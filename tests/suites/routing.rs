use crate::common::{client, create_store, create_test_config, error_json, setup, spawn_proxy};

#[tokio::test]
async fn test_unknown_paths_and_projects() {
    let (engine, port) = setup().await;

    for path in [
        "/",
        "/ows/alice",
        "/ows/alice/missing?SERVICE=WMS&REQUEST=GetMap",
        "/ows/alice/%2E%2E?SERVICE=WMS",
        "/api/map/capabilities/bob/parks?LAYER=Ortho",
    ] {
        let resp = client()
            .get(format!("http://127.0.0.1:{port}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404, "path {path}");
        assert_eq!(
            resp.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );
        let json = error_json(resp).await;
        assert_eq!(json["status"], 404);
        assert_eq!(json["message"], "Not Found");
    }
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_private_project_access_gate() {
    let (engine, port) = setup().await;
    let url = format!("http://127.0.0.1:{port}/ows/alice/secret?SERVICE=WMS&REQUEST=GetMap");

    let resp = client().get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers()["www-authenticate"], r#"Basic realm="Restricted""#);

    let resp = client()
        .get(&url)
        .header("X-Forwarded-User", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(engine.hits(), 0);

    let resp = client()
        .get(&url)
        .header("X-Forwarded-User", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        engine.requests()[0].params("MAP"),
        vec!["/publish/alice/secret/parks.qgs"]
    );
}

#[tokio::test]
async fn test_health_endpoints() {
    let (engine, port) = setup().await;

    for path in ["/health", "/.well-known/health"] {
        let resp = client()
            .get(format!("http://127.0.0.1:{port}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "OK");
    }
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_conflicting_service_parameters() {
    let (engine, port) = setup().await;

    let resp = client()
        .post(format!(
            "http://127.0.0.1:{port}/ows/alice/parks?SERVICE=WMS&service=WFS&REQUEST=Transaction"
        ))
        .body("<wfs:Transaction/>")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_json(resp).await["message"], "Invalid query parameters");
    assert_eq!(engine.hits(), 0);
}

#[tokio::test]
async fn test_engine_unreachable() {
    // Nothing listens on the engine port once the placeholder listener is dropped.
    let placeholder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = placeholder.local_addr().unwrap().port();
    drop(placeholder);

    let engine = crate::common::spawn_mock_engine().await;
    let store = create_store(&engine);
    let (port, _) = spawn_proxy(create_test_config(dead_port), store).await;

    for query in [
        "SERVICE=WMS&REQUEST=GetCapabilities",
        "SERVICE=WMS&REQUEST=GetMap",
    ] {
        let resp = client()
            .get(format!("http://127.0.0.1:{port}/ows/alice/parks?{query}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 502, "query {query}");
    }
}
