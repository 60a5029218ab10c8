use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use quill_db::models::ProductRow;
use quill_types::api::{CreateProductRequest, ProductResponse, UpdateProductRequest};
use quill_types::validate;

use crate::error::{ApiResult, validated};
use crate::state::{AppState, run_db};
use crate::util;

pub async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    validated(validate::create_product(&req))?;

    let id = Uuid::new_v4();

    {
        let id = id.to_string();
        let name = req.name.clone();
        let description = req.description.clone();
        run_db(&state, move |db| {
            db.create_product(&id, &name, description.as_deref(), req.price)
        })
        .await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            id,
            name: req.name,
            description: req.description,
            price: req.price,
        }),
    ))
}

pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<ProductResponse>>> {
    let rows = run_db(&state, move |db| db.list_products()).await?;
    Ok(Json(rows.into_iter().map(to_product_response).collect()))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Json<ProductResponse>> {
    let id = product_id.to_string();
    let row = run_db(&state, move |db| db.get_product(&id)).await?;
    Ok(Json(to_product_response(row)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<ProductResponse>> {
    validated(validate::update_product(&req.name, req.price))?;

    let id = product_id.to_string();
    let row = run_db(&state, move |db| {
        db.update_product(
            &id,
            req.name.as_deref(),
            req.description.as_deref(),
            req.price,
        )
    })
    .await?;
    Ok(Json(to_product_response(row)))
}

/// 409 while any order item still references the product.
pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let id = product_id.to_string();
    run_db(&state, move |db| db.delete_product(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_product_response(row: ProductRow) -> ProductResponse {
    ProductResponse {
        id: util::parse_id(&row.id, "product"),
        name: row.name,
        description: row.description,
        price: row.price,
    }
}
