use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use quill_db::models::{OrderItemRow, OrderRow};
use quill_types::api::{CreateOrderRequest, OrderItemResponse, OrderResponse};
use quill_types::validate;

use crate::error::{ApiResult, validated};
use crate::state::{AppState, run_db};
use crate::util;

pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::create_order(&req))?;

    let id = Uuid::new_v4();
    let created_at = util::now_rfc3339();

    // Quantities are coerced, not rejected.
    let items: Vec<(String, i64)> = req
        .items
        .iter()
        .map(|item| {
            (
                item.product_id.to_string(),
                validate::coerce_quantity(item.quantity),
            )
        })
        .collect();

    let rows = {
        let id = id.to_string();
        let user_id = req.user_id.to_string();
        let created_at = created_at.clone();
        run_db(&state, move |db| db.create_order(&id, &user_id, &items, &created_at)).await?
    };

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            id,
            user_id: req.user_id,
            created_at: util::parse_created_at(&created_at),
            items: rows.into_iter().map(to_item_response).collect(),
        }),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id.to_string();
    let (order, items) = run_db(&state, move |db| db.get_order(&id)).await?;
    Ok(Json(to_order_response(order, items)))
}

pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<OrderResponse>>> {
    let id = user_id.to_string();
    let orders = run_db(&state, move |db| db.list_orders_for_user(&id)).await?;
    Ok(Json(
        orders
            .into_iter()
            .map(|(order, items)| to_order_response(order, items))
            .collect(),
    ))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let id = order_id.to_string();
    run_db(&state, move |db| db.delete_order(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_order_response(order: OrderRow, items: Vec<OrderItemRow>) -> OrderResponse {
    OrderResponse {
        id: util::parse_id(&order.id, "order"),
        user_id: util::parse_id(&order.user_id, "user"),
        created_at: util::parse_created_at(&order.created_at),
        items: items.into_iter().map(to_item_response).collect(),
    }
}

fn to_item_response(row: OrderItemRow) -> OrderItemResponse {
    OrderItemResponse {
        product_id: util::parse_id(&row.product_id, "product"),
        product_name: row.product_name,
        quantity: row.quantity,
    }
}
