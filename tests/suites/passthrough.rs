use crate::common::{client, setup};

#[tokio::test]
async fn test_getmap_directed_to_engine() {
    let (engine, port) = setup().await;

    let resp = client()
        .get(format!(
            "http://127.0.0.1:{port}/ows/alice/parks?SERVICE=WMS&REQUEST=GetMap&map=/etc/passwd&LAYERS=Roads&BBOX=0%2C0%2C1%2C1"
        ))
        .header("Cookie", "session=secret")
        .header("X-Forwarded-User", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let server = resp.headers().get("server").map(|v| v.to_str().unwrap().to_string());
    assert_ne!(server.as_deref(), Some("QGIS Server"));
    assert!(resp.headers().get("x-powered-by").is_none());
    assert_eq!(resp.text().await.unwrap(), "<EngineResponse/>");

    let requests = engine.requests();
    assert_eq!(requests.len(), 1);
    let seen = &requests[0];
    assert_eq!(seen.path, "/ows/");
    assert_eq!(seen.params("MAP"), vec!["/publish/alice/parks/parks.qgs"]);
    assert_eq!(seen.params("LAYERS"), vec!["Roads"]);
    assert_eq!(seen.params("BBOX"), vec!["0,0,1,1"]);
    assert!(seen.query.ends_with("MAP=%2Fpublish%2Falice%2Fparks%2Fparks.qgs"));
    assert!(seen.headers.get("cookie").is_none());
    assert!(seen.headers.get("x-forwarded-user").is_none());
}

#[tokio::test]
async fn test_missing_user_agent_sent_empty() {
    let (engine, port) = setup().await;

    let resp = client()
        .get(format!(
            "http://127.0.0.1:{port}/ows/alice/parks?SERVICE=WMS&REQUEST=GetLegendGraphic"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let seen = &engine.requests()[0];
    assert_eq!(seen.headers["user-agent"], "");
}

#[tokio::test]
async fn test_user_agent_kept() {
    let (engine, port) = setup().await;

    client()
        .get(format!(
            "http://127.0.0.1:{port}/ows/alice/parks?SERVICE=WFS&REQUEST=GetFeature&TYPENAME=Roads"
        ))
        .header("User-Agent", "QGIS/3.34")
        .send()
        .await
        .unwrap();

    let seen = &engine.requests()[0];
    assert_eq!(seen.headers["user-agent"], "QGIS/3.34");
    assert_eq!(seen.params("TYPENAME"), vec!["Roads"]);
}
