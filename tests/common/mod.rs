use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use owsgate::config::{Config, LogFormat};
use owsgate::features::projects::{
    AccessType, AuthSettings, LayerMeta, LayerPermission, LayerSettings, LayersData,
    MemoryProjectStore, ProjectInfo, ProjectRecord, ProjectRole, ProjectSettings,
    RolePermissions, RoleType,
};
use owsgate::{EngineClient, HeaderIdentityResolver, OwsGateway, OwsProxy};
use pingora::proxy::http_proxy_service;
use pingora::server::Server;
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Capabilities document; `{host}` is replaced by the request's `Host`, as
/// the engine derives its service URLs from it.
pub const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<WMS_Capabilities version="1.3.0" xmlns:xlink="http://www.w3.org/1999/xlink">
 <Service>
  <Name>WMS</Name>
  <OnlineResource xlink:type="simple" xlink:href="http://{host}/wms?MAP=/data/alice/parks/parks.qgs&amp;SERVICE=WMS"/>
 </Service>
 <Capability>
  <Request>
   <GetMap>
    <DCPType><HTTP><Get><OnlineResource xlink:href="http://{host}/wms?MAP=/data/alice/parks/parks.qgs&amp;SERVICE=WMS"/></Get></HTTP></DCPType>
   </GetMap>
  </Request>
 </Capability>
</WMS_Capabilities>"#;

/// Request as seen by the mock engine.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    /// Decoded values of every query parameter named `key` (any case).
    pub fn params(&self, key: &str) -> Vec<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.into_owned())
            .collect()
    }
}

/// Mock rendering engine that records every request it receives.
#[derive(Clone)]
pub struct MockEngine {
    pub port: u16,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockEngine {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }
}

async fn engine_response(
    req: Request<Incoming>,
    requests: Arc<Mutex<Vec<Recorded>>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();
    let recorded = Recorded {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().unwrap_or_default().to_string(),
        headers: parts.headers,
        body,
    };
    let is_capabilities = recorded
        .params("REQUEST")
        .iter()
        .any(|r| r.eq_ignore_ascii_case("GetCapabilities"));
    let is_remote = recorded.path.starts_with("/remote/");
    let host = recorded
        .headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("engine.internal")
        .to_string();
    requests.lock().unwrap().push(recorded);

    let (content_type, body) = if is_remote {
        ("text/xml", Bytes::from_static(b"<RemoteCapabilities/>"))
    } else if is_capabilities {
        ("text/xml", Bytes::from(CAPABILITIES.replace("{host}", &host)))
    } else {
        ("text/xml", Bytes::from_static(b"<EngineResponse/>"))
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Server", "QGIS Server")
        .header("X-Powered-By", "fcgi")
        .body(Full::new(body))
        .unwrap();
    Ok(response)
}

pub async fn spawn_mock_engine() -> MockEngine {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let shared = requests.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let shared = shared.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| engine_response(req, shared.clone()));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    MockEngine { port, requests }
}

pub fn create_test_config(engine_port: u16) -> Arc<Config> {
    Arc::new(Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        engine_url: format!("http://127.0.0.1:{engine_port}/ows/"),
        publish_root: "/publish".to_string(),
        projects_root: PathBuf::from("/nonexistent"),
        identity_header: "X-Forwarded-User".to_string(),
        engine_timeout: Duration::from_secs(5),
        max_transaction_body_size: 64 * 1024,
        auth_realm: "Restricted".to_string(),
        log_format: LogFormat::Pretty,
    })
}

fn project(access: AccessType, ortho_url: &str) -> ProjectRecord {
    let insert_only = LayerPermission {
        insert: true,
        update: false,
        delete: false,
    };
    let editors = ProjectRole {
        name: "editors".into(),
        kind: RoleType::Users,
        users: vec!["bob".into()],
        permissions: RolePermissions {
            layers: HashMap::from([
                ("roads_1".to_string(), insert_only),
                ("parcels_2".to_string(), LayerPermission::ALL),
            ]),
        },
    };

    let mut ortho = LayerMeta {
        name: "Ortho".into(),
        source_params: HashMap::new(),
    };
    ortho
        .source_params
        .insert("url".into(), serde_json::Value::from(ortho_url));

    ProjectRecord {
        info: ProjectInfo {
            state: "published".into(),
            qgis_file: "parks.qgs".into(),
        },
        settings: ProjectSettings {
            auth: AuthSettings {
                access,
                users: vec![],
                roles: vec![editors],
            },
            layers: HashMap::from([
                ("roads_1".to_string(), LayerSettings::default()),
                ("parcels_2".to_string(), LayerSettings::default()),
                ("ortho_3".to_string(), LayerSettings::default()),
            ]),
        },
        layers: LayersData::new(HashMap::from([
            (
                "roads_1".to_string(),
                LayerMeta {
                    name: "Roads".into(),
                    source_params: HashMap::new(),
                },
            ),
            (
                "parcels_2".to_string(),
                LayerMeta {
                    name: "Parcels".into(),
                    source_params: HashMap::new(),
                },
            ),
            ("ortho_3".to_string(), ortho),
        ])),
    }
}

/// `alice/parks` is public, `alice/secret` private. The `Ortho` layer's remote
/// source lives on the mock engine under `/remote/wms`.
pub fn create_store(engine: &MockEngine) -> MemoryProjectStore {
    let ortho_url = engine.url("/remote/wms?SERVICE=WMS&REQUEST=GetCapabilities");
    let store = MemoryProjectStore::new();
    store.insert("alice/parks", project(AccessType::Public, &ortho_url));
    store.insert("alice/secret", project(AccessType::Private, &ortho_url));
    store
}

pub async fn spawn_proxy(
    config: Arc<Config>,
    store: MemoryProjectStore,
) -> (u16, std::thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut conf_clone = (*config).clone();
    conf_clone.listen_addr = format!("127.0.0.1:{port}").parse().unwrap();
    let config = Arc::new(conf_clone);

    let handle = std::thread::spawn(move || {
        let engine = EngineClient::new(&config).unwrap();
        let target = engine.target().clone();
        let identity = HeaderIdentityResolver::new(&config.identity_header).unwrap();
        let gateway = OwsGateway::new(
            &config,
            &target,
            Arc::new(store),
            Arc::new(identity),
            Arc::new(engine),
        );
        let proxy = OwsProxy::new(config.clone(), Arc::new(gateway), target);

        let server_conf = Arc::new(pingora::server::configuration::ServerConf::default());
        let mut service = http_proxy_service(&server_conf, proxy);
        service.add_tcp(&config.listen_addr.to_string());

        let mut server = Server::new(None).unwrap();
        server.bootstrap();
        server.add_service(service);
        server.run_forever();
    });

    wait_for_health(port).await;
    (port, handle)
}

async fn wait_for_health(port: u16) {
    let client = client();
    for _ in 0..50 {
        let ready = client
            .get(format!("http://127.0.0.1:{port}/health"))
            .send()
            .await
            .is_ok_and(|r| r.status() == 200);
        if ready {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("proxy on port {port} did not become ready");
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Starts a mock engine and a proxy in front of it.
pub async fn setup() -> (MockEngine, u16) {
    let engine = spawn_mock_engine().await;
    let config = create_test_config(engine.port);
    let (proxy_port, _) = spawn_proxy(config, create_store(&engine)).await;
    (engine, proxy_port)
}

pub async fn error_json(resp: reqwest::Response) -> serde_json::Value {
    serde_json::from_str(&resp.text().await.unwrap()).unwrap()
}
