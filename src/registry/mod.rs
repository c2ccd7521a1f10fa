pub mod archive;
pub mod handlers;
pub mod route;
pub mod upload;

use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::store::{AppState, ModulePath};
use route::Operation;

/// Module protocol routes. Everything outside `/healthz` goes through the
/// ordered endpoint table in [`route::Routes`].
pub fn router() -> Router<AppState> {
    Router::new().fallback(dispatch)
}

/// The full application: health check, protocol routes and middleware.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(body_limit)),
        )
        .with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Result<Response, ApiError> {
    let route = state
        .routes
        .resolve(request.method(), request.uri().path())?;

    if let (Operation::Upload, Some(version)) = (route.operation, route.version.as_deref()) {
        let (parts, body) = request.into_parts();
        return upload::upload(&state, &route.module, version, &parts.headers, body).await;
    }

    let module = ModulePath::parse(&route.module)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid module path: {:?}", route.module)))?;

    match (route.operation, route.version.as_deref()) {
        (Operation::List, _) => handlers::list(&state, &module).await,
        (Operation::Latest, _) => handlers::latest(&state, &module).await,
        (Operation::Info, Some(version)) => handlers::info(&state, &module, version).await,
        (Operation::ModFile, Some(version)) => handlers::mod_file(&state, &module, version).await,
        (Operation::Archive, Some(version)) => handlers::zip_file(&state, &module, version).await,
        _ => Err(ApiError::NotFound(format!("no endpoint for {}", request.uri().path()))),
    }
}
