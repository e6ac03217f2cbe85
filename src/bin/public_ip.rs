//! public-ip: standalone client-IP detection service.
//!
//! Off the proxy data path; inspects forwarding headers to report the
//! caller's IP. Run: cargo run --bin public-ip [-- PORT]

use anyhow::Result;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::info;

use flowgate::ipinfo;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port: u16 = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PORT").ok())
        .map(|p| p.parse())
        .transpose()?
        .unwrap_or(8080);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let make_service = make_service_fn(|conn: &AddrStream| {
        let remote_addr = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| async move {
                Ok::<_, Infallible>(ipinfo::handle(req, Some(remote_addr)).await)
            }))
        }
    });

    info!("public-ip service listening on {addr}");
    Server::bind(&addr).serve(make_service).await?;

    Ok(())
}
