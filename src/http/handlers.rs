use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;
use crate::http::{AdminUser, ApiJson, ApiPath, CurrentUser};
use crate::service::{NewProduct, ProductChanges, Storefront};
use crate::{CommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest { pub order_id: Uuid }

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
}

fn validated<T: Validate>(body: T) -> Result<T> {
    body.validate().map_err(|e| CommerceError::Validation(e.to_string()))?;
    Ok(body)
}

fn data(value: impl serde::Serialize) -> Json<Value> { Json(json!({ "success": true, "data": value })) }

fn done(message: &str) -> Json<Value> { Json(json!({ "success": true, "message": message })) }

// Catalog

pub async fn list_products(State(sf): State<Storefront>) -> Result<Json<Value>> {
    Ok(data(sf.list_products().await?))
}

pub async fn get_product(State(sf): State<Storefront>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    Ok(data(sf.product(id).await?))
}

pub async fn create_product(State(sf): State<Storefront>, _: AdminUser, ApiJson(body): ApiJson<NewProduct>) -> Result<(StatusCode, Json<Value>)> {
    let product = sf.create_product(validated(body)?).await?;
    Ok((StatusCode::CREATED, data(product)))
}

pub async fn update_product(State(sf): State<Storefront>, _: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(body): ApiJson<ProductChanges>) -> Result<Json<Value>> {
    Ok(data(sf.update_product(id, validated(body)?).await?))
}

pub async fn delete_product(State(sf): State<Storefront>, _: AdminUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    sf.delete_product(id).await?;
    Ok(done("Product deleted"))
}

pub async fn restock(State(sf): State<Storefront>, _: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(body): ApiJson<QuantityRequest>) -> Result<Json<Value>> {
    let body = validated(body)?;
    Ok(data(sf.restock(id, body.quantity).await?))
}

// Cart

pub async fn get_cart(State(sf): State<Storefront>, CurrentUser(user): CurrentUser) -> Result<Json<Value>> {
    Ok(data(sf.cart(user).await?))
}

pub async fn add_item(State(sf): State<Storefront>, CurrentUser(user): CurrentUser, ApiJson(body): ApiJson<AddItemRequest>) -> Result<Json<Value>> {
    let body = validated(body)?;
    Ok(data(sf.add_item(user, body.product_id, body.quantity).await?))
}

pub async fn update_item(State(sf): State<Storefront>, CurrentUser(user): CurrentUser, ApiPath(id): ApiPath<Uuid>, ApiJson(body): ApiJson<QuantityRequest>) -> Result<Json<Value>> {
    let body = validated(body)?;
    Ok(data(sf.update_item(user, id, body.quantity).await?))
}

pub async fn remove_item(State(sf): State<Storefront>, CurrentUser(user): CurrentUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    sf.remove_item(user, id).await?;
    Ok(done("Item removed from cart"))
}

pub async fn clear_cart(State(sf): State<Storefront>, CurrentUser(user): CurrentUser) -> Result<Json<Value>> {
    sf.clear_cart(user).await?;
    Ok(done("Cart cleared"))
}

// Orders

pub async fn checkout(State(sf): State<Storefront>, CurrentUser(user): CurrentUser) -> Result<(StatusCode, Json<Value>)> {
    Ok((StatusCode::CREATED, data(sf.checkout(user).await?)))
}

pub async fn user_orders(State(sf): State<Storefront>, CurrentUser(user): CurrentUser) -> Result<Json<Value>> {
    Ok(data(sf.orders_for_user(user).await?))
}

pub async fn get_order(State(sf): State<Storefront>, CurrentUser(user): CurrentUser, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    Ok(data(sf.order_for_user(id, user).await?))
}

pub async fn simulate_payment(State(sf): State<Storefront>, CurrentUser(user): CurrentUser, ApiJson(body): ApiJson<PaymentRequest>) -> Result<Json<Value>> {
    let (order, payment) = sf.simulate_payment(body.order_id, user).await?;
    Ok(data(json!({ "order": order, "payment": payment })))
}

pub async fn all_orders(State(sf): State<Storefront>, _: AdminUser) -> Result<Json<Value>> {
    Ok(data(sf.all_orders().await?))
}

pub async fn update_order_status(State(sf): State<Storefront>, _: AdminUser, ApiPath(id): ApiPath<Uuid>, ApiJson(body): ApiJson<StatusRequest>) -> Result<Json<Value>> {
    let body = validated(body)?;
    Ok(data(sf.update_order_status(id, &body.status).await?))
}
