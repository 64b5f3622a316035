// tests/common/mod.rs
// Shared helpers: an in-process HTTP origin that serves feed fixtures.
#![allow(dead_code)]

use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    routing::get,
    Router,
};

pub const THREE_ITEMS_XML: &str = include_str!("../fixtures/three_items.xml");
pub const TWO_ITEMS_XML: &str = include_str!("../fixtures/two_items.xml");
pub const MALFORMED_XML: &str = include_str!("../fixtures/malformed.xml");

/// One canned response served at `path`.
#[derive(Clone, Copy)]
pub struct Route {
    pub path: &'static str,
    pub status: u16,
    pub content_type: &'static str,
    pub body: &'static str,
}

impl Route {
    pub fn xml(path: &'static str, body: &'static str) -> Self {
        Self {
            path,
            status: 200,
            content_type: "application/xml",
            body,
        }
    }
}

/// Serve `routes` on 127.0.0.1 with an OS-assigned port; returns the base URL.
pub async fn spawn_origin(routes: Vec<Route>) -> String {
    let mut app = Router::new();
    for r in routes {
        app = app.route(
            r.path,
            get(move || async move {
                (
                    StatusCode::from_u16(r.status).expect("valid status"),
                    [(header::CONTENT_TYPE, r.content_type)],
                    r.body,
                )
            }),
        );
    }
    app = app.route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "too late"
        }),
    );
    serve(app).await
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind origin");
    let addr = listener.local_addr().expect("origin addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("origin server");
    });
    format!("http://{addr}")
}
