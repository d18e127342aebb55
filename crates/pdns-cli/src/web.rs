//! The HTTP query façade.
//!
//! JSON read API over the store: exact and prefix search for tuples and
//! individuals. The synchronous store is shared behind a mutex and
//! queried on the blocking pool.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, info};

use pdns_core::traits::Store;
use pdns_core::types::{IndividualRow, TupleRow};

type SharedStore = Arc<Mutex<Box<dyn Store>>>;

#[derive(Clone)]
struct AppState {
    store: SharedStore,
}

#[derive(Debug, Clone, Copy)]
enum SearchKind {
    Exact,
    Like,
}

impl SearchKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(Self::Exact),
            "like" => Some(Self::Like),
            _ => None,
        }
    }
}

/// Serve the API on `listen` until the process exits. A bare `:port`
/// listens on all interfaces.
pub fn serve(store: Box<dyn Store>, listen: &str) -> anyhow::Result<()> {
    let addr = normalize_listen(listen);
    let app = router(Arc::new(Mutex::new(store)));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "listening");
        axum::serve(listener, app).await?;
        Ok(())
    })
}

fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/ui/") }))
        .route("/ui/", get(|| async { Html(UI_INDEX) }))
        .route("/dns/{search}/tuples/{query}", get(search_tuples))
        .route("/dns/{search}/individual/{value}", get(search_individual))
        .with_state(AppState { store })
}

fn normalize_listen(listen: &str) -> String {
    match listen.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => listen.to_string(),
    }
}

async fn search_tuples(
    State(state): State<AppState>,
    Path((search, query)): Path<(String, String)>,
) -> Result<Json<Vec<TupleRow>>, (StatusCode, String)> {
    let kind = validate(&search, &query)?;
    let rows = run_query(state.store, move |store| match kind {
        SearchKind::Exact => store.find_tuples(&query),
        SearchKind::Like => store.like_tuples(&query),
    })
    .await?;
    Ok(Json(rows))
}

async fn search_individual(
    State(state): State<AppState>,
    Path((search, value)): Path<(String, String)>,
) -> Result<Json<Vec<IndividualRow>>, (StatusCode, String)> {
    let kind = validate(&search, &value)?;
    let rows = run_query(state.store, move |store| match kind {
        SearchKind::Exact => store.find_individual(&value),
        SearchKind::Like => store.like_individual(&value),
    })
    .await?;
    Ok(Json(rows))
}

fn validate(search: &str, query: &str) -> Result<SearchKind, (StatusCode, String)> {
    let kind = SearchKind::parse(search).ok_or((
        StatusCode::BAD_REQUEST,
        format!("unknown search type {search:?}"),
    ))?;
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "missing query".to_string()));
    }
    Ok(kind)
}

/// Run a store query on the blocking pool.
async fn run_query<T, F>(store: SharedStore, query: F) -> Result<T, (StatusCode, String)>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Store) -> Result<T, pdns_core::errors::StorageError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = match store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        query(guard.as_mut())
    })
    .await;
    match result {
        Ok(Ok(rows)) => Ok(rows),
        Ok(Err(err)) => {
            error!(%err, "store query failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
        Err(join) => {
            error!(%join, "query task failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "query task failed".to_string(),
            ))
        }
    }
}

const UI_INDEX: &str = r#"<!doctype html>
<html>
<head><title>pdns</title></head>
<body>
<h1>pdns</h1>
<p>Passive-DNS query API:</p>
<ul>
<li><code>GET /dns/exact/tuples/{query}</code></li>
<li><code>GET /dns/like/tuples/{query}</code></li>
<li><code>GET /dns/exact/individual/{value}</code></li>
<li><code>GET /dns/like/individual/{value}</code></li>
</ul>
</body>
</html>
"#;
