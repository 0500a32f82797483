//! HTTP surface.
//!
//! Identity comes from the authenticating gateway in front of this service:
//! `x-user-id` carries the caller's id and `x-user-role: admin` unlocks the
//! admin routes.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use uuid::Uuid;
use crate::service::Storefront;
use crate::CommerceError;

mod handlers;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub fn router(storefront: Storefront) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront"})) }))
        .route("/api/products", get(handlers::list_products))
        .route("/api/products/:id", get(handlers::get_product))
        .route("/api/cart", get(handlers::get_cart).delete(handlers::clear_cart))
        .route("/api/cart/items", post(handlers::add_item))
        .route("/api/cart/items/:id", put(handlers::update_item).delete(handlers::remove_item))
        .route("/api/orders", get(handlers::user_orders))
        .route("/api/orders/checkout", post(handlers::checkout))
        .route("/api/orders/:id", get(handlers::get_order))
        .route("/api/payment/simulate", post(handlers::simulate_payment))
        .route("/api/admin/products", post(handlers::create_product))
        .route("/api/admin/products/:id", put(handlers::update_product).delete(handlers::delete_product))
        .route("/api/admin/products/:id/restock", post(handlers::restock))
        .route("/api/admin/orders", get(handlers::all_orders))
        .route("/api/admin/orders/:id/status", put(handlers::update_order_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(storefront)
}

// =============================================================================
// Identity
// =============================================================================

/// Authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

/// Authenticated caller holding the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Uuid);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header(parts, USER_ID_HEADER).map(Uuid::parse_str) {
            Some(Ok(id)) => Ok(Self(id)),
            _ => {
                warn!(path = %parts.uri.path(), "missing or invalid user id header");
                Err(CommerceError::Unauthenticated)
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(id) = CurrentUser::from_request_parts(parts, state).await?;
        if !header(parts, USER_ROLE_HEADER).is_some_and(|role| role.eq_ignore_ascii_case("admin")) {
            warn!(user_id = %id, path = %parts.uri.path(), "admin route denied");
            return Err(CommerceError::Unauthorized);
        }
        Ok(Self(id))
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// `Json` whose rejections answer with the JSON error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(CommerceError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejections answer with the JSON error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(CommerceError))]
pub struct ApiPath<T>(pub T);

impl From<JsonRejection> for CommerceError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => Self::Validation(e.body_text()),
            other => Self::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for CommerceError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

// =============================================================================
// Error Responses
// =============================================================================

impl CommerceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CartNotFound | Self::CartLineNotFound | Self::OrderNotFound | Self::ProductNotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::EmptyCart
            | Self::InsufficientStock { .. }
            | Self::AlreadyPaid { .. }
            | Self::InvalidTransition { .. }
            | Self::InvalidStatus(_)
            | Self::InvalidQuantity
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TransactionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::InsufficientStock { product_id, product_name, available, requested } => json!({
                "success": false,
                "message": self.to_string(),
                "product": { "id": product_id, "name": product_name },
                "available_stock": available,
                "requested_quantity": requested,
            }),
            Self::AlreadyPaid { status } => json!({ "success": false, "message": self.to_string(), "status": status }),
            Self::TransactionFailure(cause) => {
                error!(%cause, "request failed");
                json!({ "success": false, "message": "Transaction failed" })
            }
            _ => json!({ "success": false, "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
