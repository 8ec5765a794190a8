use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;

const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<WMS_Capabilities version="1.3.0" xmlns:xlink="http://www.w3.org/1999/xlink">
 <Service>
  <Name>WMS</Name>
  <OnlineResource xlink:href="http://qgis-server:9000/ows/?MAP=/publish/alice/parks/parks.qgs&amp;SERVICE=WMS"/>
 </Service>
</WMS_Capabilities>
"#;

fn param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

async fn engine(req: Request<hyper::body::Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let query = req.uri().query().unwrap_or_default();
    println!(
        "{} {} map={:?}",
        req.method(),
        req.uri(),
        param(query, "MAP")
    );

    let (body, status) = match param(query, "REQUEST") {
        Some(r) if r.eq_ignore_ascii_case("GetCapabilities") => {
            (Bytes::from_static(CAPABILITIES.as_bytes()), StatusCode::OK)
        }
        Some(_) => (Bytes::from("<EngineResponse/>"), StatusCode::OK),
        None => (Bytes::from("<ServiceExceptionReport/>"), StatusCode::BAD_REQUEST),
    };

    let response = Response::builder()
        .status(status)
        .header("Content-Type", "text/xml")
        .header("Server", "QGIS Server")
        .body(Full::new(body))
        .unwrap();

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], 9000));

    let listener = TcpListener::bind(addr).await?;
    println!("Mock engine listening on http://{addr}");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(engine))
                .await
            {
                eprintln!("Error serving connection: {err:?}");
            }
        });
    }
}
