use std::error::Error;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_docstore_session::{KeyPair, MemCollection, SessionError, SessionStore, TokenSink};
use tokio::net::TcpListener;

const SESSION: &str = "counter";

async fn count(
    State(sessions): State<SessionStore<MemCollection>>,
    request: Request,
) -> Result<Response, StatusCode> {
    let (mut parts, _) = request.into_parts();

    let session = sessions.get(&mut parts, SESSION).await.map_err(internal)?;
    let visits = session.get::<u64>("visits").unwrap_or(0) + 1;
    session
        .insert("visits", visits)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut sink = TokenSink::new();
    sessions
        .save_all(&mut parts, &mut sink)
        .await
        .map_err(internal)?;

    Ok(sink.into_response(format!("visit number {visits}")))
}

async fn reset(
    State(sessions): State<SessionStore<MemCollection>>,
    request: Request,
) -> Result<Response, StatusCode> {
    let (mut parts, _) = request.into_parts();

    let session = sessions.get(&mut parts, SESSION).await.map_err(internal)?;
    if session.is_new() {
        return Ok("nothing to forget".into_response());
    }
    session.expire();

    let mut sink = TokenSink::new();
    sessions
        .save_all(&mut parts, &mut sink)
        .await
        .map_err(internal)?;

    Ok(sink.into_response("forgotten".into_response()))
}

fn internal(error: SessionError) -> StatusCode {
    tracing::error!(%error, "session failure");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let sessions = SessionStore::builder()
        .key_pair(KeyPair::generate())
        .max_age(15 * 60)
        .ensure_ttl(true)
        .use_dev_options(cfg!(debug_assertions))
        .collection(MemCollection::new())
        .build()
        .await?;

    let router = Router::new()
        .route("/", get(count))
        .route("/reset", get(reset))
        .with_state(sessions);

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
