//! A small HTTP API used as the remote end in client tests.
//!
//! Serves a JSON post store in the style of public placeholder APIs plus a
//! few diagnostic routes: fixed statuses, slow responses, non-JSON bodies and
//! a route that reflects the request back as JSON.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tokio_rustls::{rustls::ServerConfig, TlsAcceptor};

pub mod tls;

pub struct Store {
    posts: RwLock<BTreeMap<u64, Value>>,
    next_id: AtomicU64,
}

pub type Db = Arc<Store>;

pub fn app() -> Router {
    let db: Db = Arc::new(Store {
        posts: RwLock::new(BTreeMap::new()),
        next_id: AtomicU64::new(1),
    });
    Router::new()
        .route("/ok", get(ok))
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(replace_post).patch(update_post).delete(delete_post),
        )
        .route("/echo", post(echo))
        .route("/inspect", any(inspect))
        .route("/status/{code}", any(status))
        .route("/delay/{ms}", get(delay))
        .route("/html", get(html))
        .route("/bytes/{len}", get(bytes))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Bind to an ephemeral local port and serve in the background.
pub async fn spawn() -> Result<SocketAddr, std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(err) = run(listener).await {
            tracing::error!(error = %err, "mock server stopped");
        }
    });
    Ok(addr)
}

/// Like `spawn`, but every connection is wrapped in TLS using `config`.
pub async fn spawn_tls(config: Arc<ServerConfig>) -> Result<SocketAddr, std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let acceptor = TlsAcceptor::from(config);
    let app = app();
    tokio::spawn(async move {
        loop {
            let tcp = match listener.accept().await {
                Ok((tcp, _)) => tcp,
                Err(err) => {
                    tracing::error!(error = %err, "mock server stopped");
                    return;
                }
            };
            let acceptor = acceptor.clone();
            let service = TowerToHyperService::new(app.clone());
            tokio::spawn(async move {
                let stream = match acceptor.accept(tcp).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        tracing::debug!(error = %err, "tls handshake failed");
                        return;
                    }
                };
                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tracing::debug!(error = %err, "connection closed with error");
                }
            });
        }
    });
    Ok(addr)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}

async fn ok() -> Json<Value> {
    Json(json!({"id": 1}))
}

async fn list_posts(State(db): State<Db>) -> Json<Vec<Value>> {
    let posts = db.posts.read().await;
    Json(posts.values().cloned().collect())
}

async fn create_post(State(db): State<Db>, Json(input): Json<Map<String, Value>>) -> Response {
    let id = db.next_id.fetch_add(1, Ordering::Relaxed);
    let mut post = input;
    post.insert("id".to_string(), json!(id));
    let post = Value::Object(post);
    db.posts.write().await.insert(id, post.clone());
    tracing::debug!(id, "post created");
    (StatusCode::CREATED, Json(post)).into_response()
}

async fn get_post(State(db): State<Db>, Path(id): Path<u64>) -> Response {
    match db.posts.read().await.get(&id) {
        Some(post) => Json(post.clone()).into_response(),
        None => not_found(),
    }
}

async fn replace_post(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<Map<String, Value>>,
) -> Response {
    let mut posts = db.posts.write().await;
    let Some(post) = posts.get_mut(&id) else {
        return not_found();
    };
    let mut replacement = input;
    replacement.insert("id".to_string(), json!(id));
    *post = Value::Object(replacement);
    Json(post.clone()).into_response()
}

async fn update_post(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<Map<String, Value>>,
) -> Response {
    let mut posts = db.posts.write().await;
    let Some(Value::Object(post)) = posts.get_mut(&id) else {
        return not_found();
    };
    for (key, value) in input {
        if key != "id" {
            post.insert(key, value);
        }
    }
    Json(Value::Object(post.clone())).into_response()
}

async fn delete_post(State(db): State<Db>, Path(id): Path<u64>) -> Response {
    match db.posts.write().await.remove(&id) {
        Some(_) => Json(json!({})).into_response(),
        None => not_found(),
    }
}

/// Answer 201 with the request body and its content type unchanged.
async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/octet-stream"));
    (StatusCode::CREATED, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Describe the received request as JSON.
async fn inspect(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut reflected = Map::new();
    for (name, value) in &headers {
        reflected.insert(
            name.as_str().to_string(),
            Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        );
    }
    Json(json!({
        "method": method.as_str(),
        "path": uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"),
        "headers": reflected,
        "body": String::from_utf8_lossy(&body),
        "body_length": body.len(),
    }))
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, Json(json!({"status": code}))).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn delay(Path(ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({"delayed_ms": ms}))
}

async fn html() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], "<html></html>")
}

async fn bytes(Path(len): Path<usize>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "a".repeat(len))
}
