//! API v1 routes.

mod driver;
mod metrics;
mod routes;
mod scaler;
mod services;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Deploy surface: /v1/projects/{project}/services/...
        .nest(
            "/projects/{project}/services",
            services::routes().merge(routes::routes()),
        )
        // Reporting edges push samples here.
        .nest("/metrics", metrics::routes())
        // External scaler contract.
        .nest("/scaler", scaler::routes())
        // Driver passthrough for remote edges.
        .nest("/driver", driver::routes())
}
