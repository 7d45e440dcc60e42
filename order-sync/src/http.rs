//! GraphQL client for the order backend
//!
//! Implements the request/response collaborators over a single GraphQL
//! endpoint. Failures travel in the standard `errors` array. A numeric
//! `extensions.code` is authoritative; errors without one are classified
//! from their message here, once, and never again past this module.
//!
//! Every id is a `String!` on the wire. Restaurants and dishes are keyed by
//! name, so a restaurant id is the restaurant's name and a dish id is the
//! dish's name.
//!
//! Push delivery is not part of this client; pair it with a
//! [`LedgerChannel`](crate::remote::LedgerChannel) implementation.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::remote::{CartBackend, CatalogService, OrderBackend, PaymentGateway};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    Cart, CartDelta, CheckoutReceipt, LedgerView, Menu, MenuItem, Order, PaymentConfirmation,
    PaymentSession,
};
use std::collections::HashMap;

macro_rules! cart_fields {
    () => {
        "createdAt items { dishId dishName imageUrl price quantity } restaurantId status userName"
    };
}

macro_rules! order_fields {
    () => {
        "internalOrderId externalOrderId userId restaurantId total createdAt updatedAt status \
         items { dishId dishName imageUrl price quantity }"
    };
}

const GET_CART: &str = concat!(
    "query GetCart($userId: String!) { getCart(userId: $userId) { ",
    cart_fields!(),
    " } }"
);

const ADD_TO_CART: &str = "mutation AddToCart($userId: String!, $restaurantId: String!, \
    $dishId: String!, $dishName: String!, $price: Float!, $quantity: Int!, \
    $userName: String!, $imageUrl: String) { addToCart(userId: $userId, \
    restaurantId: $restaurantId, dishId: $dishId, dishName: $dishName, price: $price, \
    quantity: $quantity, userName: $userName, imageUrl: $imageUrl) }";

const CLEAR_CART: &str = "mutation ClearCart($userId: String!) { clearCart(userId: $userId) }";

const CHECKOUT_CART: &str = "mutation CheckoutCart($userId: String!) { checkoutCart(userId: $userId) \
    { success internalOrderId restaurantId total } }";

const CONFIRM_PAYMENT: &str = concat!(
    "mutation ConfirmPayment($internalOrderId: String!, $paymentId: String!, \
     $gatewayOrderId: String, $signature: String) { confirmPayment(\
     internalOrderId: $internalOrderId, paymentId: $paymentId, \
     gatewayOrderId: $gatewayOrderId, signature: $signature) { ",
    order_fields!(),
    " } }"
);

const GET_MY_ORDERS: &str = concat!(
    "query GetMyOrders($userId: String!) { getMyOrders(userId: $userId) { tracking { ",
    order_fields!(),
    " } past { ",
    order_fields!(),
    " } } }"
);

const GET_MENU_BY_RESTAURANT_NAME: &str = "query GetMenuByRestaurantName($name: String!) \
    { getMenuByRestaurantName(name: $name) { name menu { name category description imageUrl \
    isAvailable price } isOpen } }";

const CREATE_CASHFREE_ORDER: &str = "mutation CreateCashfreeOrder($restaurantId: String!, \
    $internalOrderId: String!, $total: Float!) { createCashfreeOrder(\
    restaurantId: $restaurantId, internalOrderId: $internalOrderId, total: $total) \
    { paymentSessionId success } }";

/// GraphQL request body
#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: ErrorExtensions,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorExtensions {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    details: Option<HashMap<String, Value>>,
}

impl GraphQlError {
    fn into_app_error(self) -> AppError {
        let code = match &self.extensions.code {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|c| u16::try_from(c).ok())
                .and_then(|c| ErrorCode::try_from(c).ok()),
            _ => None,
        }
        .unwrap_or_else(|| code_from_message(&self.message));

        let mut err = AppError::with_message(code, self.message);
        for (key, value) in self.extensions.details.unwrap_or_default() {
            err = err.with_detail(key, value);
        }
        err
    }
}

/// Classify an error that carries no numeric code by its message text
fn code_from_message(message: &str) -> ErrorCode {
    let message = message.to_ascii_lowercase();
    if message.contains("not available") || message.contains("unavailable") {
        ErrorCode::ItemUnavailable
    } else if message.contains("not found") || message.contains("does not exist") {
        ErrorCode::ItemNotFound
    } else if message.contains("cart is empty") {
        ErrorCode::EmptyCart
    } else {
        ErrorCode::Unknown
    }
}

/// Attach the dish an item error is about when the backend left it out
fn for_dish(err: AppError, dish_id: &str) -> AppError {
    let item_error = matches!(err.code, ErrorCode::ItemUnavailable | ErrorCode::ItemNotFound);
    if item_error && err.detail_str("dish_id").is_none() {
        err.with_detail("dish_id", dish_id)
    } else {
        err
    }
}

/// A "not found" while confirming a payment is about the order
fn for_order(err: AppError, internal_order_id: &str) -> AppError {
    if err.code == ErrorCode::ItemNotFound && err.detail_str("dish_id").is_none() {
        AppError::with_message(ErrorCode::OrderNotFound, err.message)
            .with_detail("internal_order_id", internal_order_id)
    } else {
        err
    }
}

/// Unwrap an envelope: the first error wins over any partial data
fn decode_envelope<T>(envelope: GraphQlResponse<T>) -> AppResult<T> {
    if let Some(first) = envelope.errors.into_iter().next() {
        return Err(first.into_app_error());
    }
    envelope
        .data
        .ok_or_else(|| AppError::invalid_response("response carried neither data nor errors"))
}

/// Classify a non-2xx response that did not carry a GraphQL error
fn status_error(status: StatusCode, body: &str) -> AppError {
    match status {
        s if s.is_server_error()
            || s == StatusCode::REQUEST_TIMEOUT
            || s == StatusCode::TOO_MANY_REQUESTS =>
        {
            AppError::network(format!("HTTP {s}: {body}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::validation(format!("HTTP {status}: not authorized"))
        }
        _ => AppError::invalid_response(format!("HTTP {status}: {body}")),
    }
}

fn add_to_cart_variables(delta: &CartDelta) -> Value {
    json!({
        "userId": delta.owner_id,
        // Non-null on the wire
        "userName": delta.owner_name.as_deref().unwrap_or_default(),
        "restaurantId": delta.restaurant_id,
        "dishId": delta.dish_id,
        "dishName": delta.meta.dish_name,
        "price": delta.meta.unit_price,
        // Signed change, not an absolute quantity
        "quantity": delta.delta,
        "imageUrl": delta.meta.image_ref,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutPayload {
    success: bool,
    internal_order_id: Option<String>,
    restaurant_id: Option<String>,
    total: Option<Decimal>,
}

impl CheckoutPayload {
    fn into_receipt(self) -> AppResult<CheckoutReceipt> {
        if !self.success {
            // The backend reports an empty cart as success: false
            return Err(AppError::empty_cart());
        }
        match (self.internal_order_id, self.restaurant_id, self.total) {
            (Some(internal_order_id), Some(restaurant_id), Some(total)) => Ok(CheckoutReceipt {
                internal_order_id,
                restaurant_id,
                total,
            }),
            _ => Err(AppError::invalid_response("checkout receipt is incomplete")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    #[serde(default = "default_true")]
    success: bool,
    payment_session_id: Option<String>,
}

fn default_true() -> bool {
    true
}

/// `getMenuByRestaurantName` result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestaurantMenuPayload {
    name: String,
    #[serde(default)]
    menu: Vec<DishPayload>,
    is_open: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DishPayload {
    name: String,
    price: Decimal,
    is_available: Option<bool>,
    image_url: Option<String>,
    category: Option<String>,
    description: Option<String>,
}

impl RestaurantMenuPayload {
    /// Names double as ids; a missing flag imposes no restriction
    fn into_menu(self) -> Menu {
        Menu {
            restaurant_id: self.name,
            items: self
                .menu
                .into_iter()
                .map(|dish| MenuItem {
                    dish_id: dish.name.clone(),
                    name: dish.name,
                    price: dish.price,
                    is_available: dish.is_available.unwrap_or(true),
                    image_ref: dish.image_url,
                    category: dish.category,
                    description: dish.description,
                })
                .collect(),
            is_open: self.is_open.unwrap_or(true),
        }
    }
}

/// GraphQL-backed implementation of the remote collaborators
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl GraphQlClient {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
        })
    }

    /// Set the authentication token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    /// POST one operation and decode its `data`
    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> AppResult<T> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&GraphQlRequest { query, variables });

        if let Some(auth) = self.auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!(endpoint = %self.endpoint, error = %e, "GraphQL request failed");
            AppError::network(e.to_string())
        })?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::network(e.to_string()))?;

        if !status.is_success() {
            // GraphQL servers often report errors with a 4xx status
            if let Ok(envelope) = serde_json::from_slice::<GraphQlResponse<Value>>(&body)
                && let Some(first) = envelope.errors.into_iter().next()
            {
                return Err(first.into_app_error());
            }
            return Err(status_error(status, &String::from_utf8_lossy(&body)));
        }

        let envelope: GraphQlResponse<T> = serde_json::from_slice(&body)
            .map_err(|e| AppError::invalid_response(format!("malformed response: {e}")))?;
        decode_envelope(envelope)
    }
}

#[async_trait]
impl CartBackend for GraphQlClient {
    async fn fetch_cart(&self, owner_id: &str) -> AppResult<Cart> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            get_cart: Option<Cart>,
        }

        let data: Data = self.execute(GET_CART, json!({ "userId": owner_id })).await?;

        let mut cart = data.get_cart.unwrap_or_else(|| Cart::empty(owner_id));
        if cart.owner_id.is_empty() {
            cart.owner_id = owner_id.to_string();
        }
        Ok(cart)
    }

    async fn apply_delta(&self, delta: &CartDelta) -> AppResult<Cart> {
        let _: Value = self
            .execute(ADD_TO_CART, add_to_cart_variables(delta))
            .await
            .map_err(|e| for_dish(e, &delta.dish_id))?;
        // The mutation only acknowledges; read back the committed cart
        self.fetch_cart(&delta.owner_id).await
    }

    async fn clear_cart(&self, owner_id: &str) -> AppResult<()> {
        let _: Value = self.execute(CLEAR_CART, json!({ "userId": owner_id })).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderBackend for GraphQlClient {
    async fn checkout_cart(&self, owner_id: &str) -> AppResult<CheckoutReceipt> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            checkout_cart: CheckoutPayload,
        }

        let data: Data = self.execute(CHECKOUT_CART, json!({ "userId": owner_id })).await?;
        data.checkout_cart.into_receipt()
    }

    async fn confirm_payment(
        &self,
        internal_order_id: &str,
        confirmation: &PaymentConfirmation,
    ) -> AppResult<Order> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            confirm_payment: Order,
        }

        let variables = json!({
            "internalOrderId": internal_order_id,
            "paymentId": confirmation.gateway_payment_id,
            "gatewayOrderId": confirmation.gateway_order_id,
            "signature": confirmation.signature,
        });
        let data: Data = self
            .execute(CONFIRM_PAYMENT, variables)
            .await
            .map_err(|e| for_order(e, internal_order_id))?;
        Ok(data.confirm_payment)
    }

    async fn fetch_orders(&self, owner_id: &str) -> AppResult<LedgerView> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            get_my_orders: LedgerView,
        }

        let data: Data = self.execute(GET_MY_ORDERS, json!({ "userId": owner_id })).await?;
        Ok(data.get_my_orders)
    }
}

#[async_trait]
impl CatalogService for GraphQlClient {
    async fn get_menu(&self, restaurant_id: &str) -> AppResult<Menu> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            get_menu_by_restaurant_name: Option<RestaurantMenuPayload>,
        }

        let data: Data = self
            .execute(GET_MENU_BY_RESTAURANT_NAME, json!({ "name": restaurant_id }))
            .await?;

        // A restaurant that no longer exists sells nothing
        Ok(match data.get_menu_by_restaurant_name {
            Some(payload) => payload.into_menu(),
            None => Menu {
                restaurant_id: restaurant_id.to_string(),
                items: Vec::new(),
                is_open: false,
            },
        })
    }
}

#[async_trait]
impl PaymentGateway for GraphQlClient {
    async fn create_payment_session(
        &self,
        restaurant_id: &str,
        internal_order_id: &str,
        total: Decimal,
    ) -> AppResult<PaymentSession> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            create_cashfree_order: SessionPayload,
        }

        let variables = json!({
            "restaurantId": restaurant_id,
            "internalOrderId": internal_order_id,
            "total": total,
        });
        let data: Data = self.execute(CREATE_CASHFREE_ORDER, variables).await?;

        match data.create_cashfree_order {
            SessionPayload {
                success: true,
                payment_session_id: Some(session_id),
            } if !session_id.trim().is_empty() => Ok(PaymentSession {
                session_id,
                internal_order_id: internal_order_id.to_string(),
                checkout_url: None,
            }),
            _ => Err(AppError::payment_session_failed(
                "gateway did not return a payment session",
            )),
        }
    }
}
