//! School shop: materials and the orders placed for students.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use scholar_core::access::{ResourceKind, ADMINS, ANY_ROLE};
use scholar_core::auth::Role;
use scholar_core::db::{create_material_repository, create_student_repository, OrderFilter};
use scholar_core::fanout::Audience;
use scholar_core::models::{
    MaterialUpdate, NewMaterial, NewNotification, NewOrder, NotificationCategory, OrderStatus,
};

use super::{ensure_guardian, referenced, visible, within};
use crate::auth::CurrentUser;
use crate::dto::{ListQuery, Reply, ScopeQuery};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Body, Params};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_materials).post(create_material))
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/:id", get(get_order))
        .route(
            "/orders/:id/status",
            put(change_order_status).post(change_order_status),
        )
        .route(
            "/:id",
            get(get_material)
                .put(update_material)
                .delete(delete_material),
        )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMaterialRequest {
    pub school_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateMaterialRequest {
    #[validate(length(min = 1, max = 200, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: Option<f64>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub material_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub material_id: Uuid,
    pub student_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderStatusRequest {
    #[schema(value_type = String, example = "approved")]
    pub status: OrderStatus,
}

#[utoipa::path(
    get,
    path = "/api/v1/materials",
    responses(
        (status = 200, description = "Materials retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn list_materials(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::Material, list.school_id);
    let search = list.search();
    let materials = create_material_repository(&state.db)
        .list(&predicate, search.as_deref(), &list.pagination())
        .await?;

    Reply::ok("Materials retrieved successfully").page("materials", &materials)
}

#[utoipa::path(
    get,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Material retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Material not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn get_material(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::Material, scope.school_id);
    let material = visible(
        create_material_repository(&state.db)
            .find(&predicate, id)
            .await?,
        ResourceKind::Material,
    )?;

    Reply::ok("Material retrieved successfully").with("material", &material)
}

#[utoipa::path(
    post,
    path = "/api/v1/materials",
    request_body = CreateMaterialRequest,
    responses(
        (status = 201, description = "Material created successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn create_material(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<CreateMaterialRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    request.validate()?;
    let school_id = caller.target_school(&state, request.school_id).await?;

    let material = create_material_repository(&state.db)
        .create(&NewMaterial {
            school_id,
            name: request.name,
            description: request.description,
            price: request.price,
            stock: request.stock,
        })
        .await?;

    info!(material_id = %material.id, school_id = %school_id, "Material created");
    Reply::created("Material created successfully").with("material", &material)
}

#[utoipa::path(
    put,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    request_body = UpdateMaterialRequest,
    responses(
        (status = 200, description = "Material updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Material not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn update_material(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<UpdateMaterialRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Material, None);
    let materials = create_material_repository(&state.db);
    let existing = visible(materials.find(&predicate, id).await?, ResourceKind::Material)?;
    request.validate()?;

    let material = materials
        .update(
            existing.id,
            &MaterialUpdate {
                name: request.name,
                description: request.description,
                price: request.price,
                stock: request.stock,
            },
        )
        .await?;

    info!(material_id = %material.id, "Material updated");
    Reply::ok("Material updated successfully").with("material", &material)
}

#[utoipa::path(
    delete,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Material deleted successfully"),
        (status = 400, description = "Dependent records exist", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Material not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn delete_material(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::Material, None);
    let materials = create_material_repository(&state.db);
    let material = visible(materials.find(&predicate, id).await?, ResourceKind::Material)?;

    ApiError::ensure_clear("material", materials.dependents(material.id).await?)?;
    materials.delete(material.id).await?;

    info!(material_id = %material.id, "Material deleted");
    Ok(Reply::ok("Material deleted successfully"))
}

// ============================================================================
// Orders
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/materials/orders",
    responses(
        (status = 200, description = "Orders retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: CurrentUser,
    Params(list): Params<ListQuery>,
    Params(query): Params<OrderQuery>,
) -> ApiResult<Reply> {
    let predicate = caller.filter(ResourceKind::MaterialOrder, list.school_id);

    let filter = OrderFilter {
        material_id: query.material_id,
        student_id: query.student_id,
        status: query.status,
    };
    let orders = create_material_repository(&state.db)
        .list_orders(&predicate, &filter, &list.pagination())
        .await?;

    Reply::ok("Orders retrieved successfully").page("orders", &orders)
}

#[utoipa::path(
    get,
    path = "/api/v1/materials/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved successfully"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn get_order(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Params(scope): Params<ScopeQuery>,
) -> ApiResult<Reply> {
    caller.require(ANY_ROLE)?;
    let predicate = caller.filter(ResourceKind::MaterialOrder, scope.school_id);
    let order = visible(
        create_material_repository(&state.db)
            .find_order(&predicate, id)
            .await?,
        ResourceKind::MaterialOrder,
    )?;

    Reply::ok("Order retrieved successfully").with("order", &order)
}

/// Parents order for their own children; admins may order for any student.
#[utoipa::path(
    post,
    path = "/api/v1/materials/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn place_order(
    State(state): State<AppState>,
    caller: CurrentUser,
    Body(request): Body<PlaceOrderRequest>,
) -> ApiResult<Reply> {
    let parent_id = if caller.identity.has_role(Role::Parent) {
        Some(ensure_guardian(&state, &caller, request.student_id).await?)
    } else {
        caller.require(ADMINS)?;
        None
    };
    request.validate()?;

    let student = referenced(
        create_student_repository(&state.db)
            .find(
                &caller.filter(ResourceKind::Student, None),
                request.student_id,
            )
            .await?,
        "studentId",
        ResourceKind::Student,
    )?;
    let materials = create_material_repository(&state.db);
    let material = referenced(
        materials
            .find(&within(student.school_id), request.material_id)
            .await?,
        "materialId",
        ResourceKind::Material,
    )?;

    let order = materials
        .create_order(&NewOrder {
            school_id: student.school_id,
            material_id: material.id,
            student_id: student.id,
            parent_id,
            ordered_by: caller.user.id,
            quantity: request.quantity,
            unit_price: material.price,
        })
        .await?;

    info!(
        order_id = %order.id,
        material_id = %material.id,
        quantity = order.quantity,
        "Material order placed"
    );
    Reply::created("Order placed successfully").with("order", &order)
}

/// Approval takes stock atomically; short stock is a 409.
#[utoipa::path(
    put,
    path = "/api/v1/materials/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = OrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated successfully"),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::error::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Materials"
)]
pub async fn change_order_status(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Body(request): Body<OrderStatusRequest>,
) -> ApiResult<Reply> {
    caller.require(ADMINS)?;
    let predicate = caller.filter(ResourceKind::MaterialOrder, None);
    let materials = create_material_repository(&state.db);
    let order = visible(
        materials.find_order(&predicate, id).await?,
        ResourceKind::MaterialOrder,
    )?;

    if !order.status.can_become(request.status) {
        return Err(ApiError::BadRequest(format!(
            "Cannot change order status from {} to {}",
            order.status, request.status
        )));
    }

    let updated = materials.change_status(&order, request.status).await?;

    info!(
        order_id = %updated.id,
        from = %order.status,
        to = %updated.status,
        "Order status changed"
    );

    if let Some(parent_id) = updated.parent_id {
        let notification = NewNotification::new(
            NotificationCategory::Order,
            format!("Order {}", updated.status),
            format!(
                "Your order of {} item(s) is now {}",
                updated.quantity, updated.status
            ),
        )
        .in_school(updated.school_id)
        .with_metadata(json!({ "orderId": updated.id, "status": updated.status }));
        state
            .notifier
            .notify(&Audience::Parent(parent_id), &notification)
            .await;
    }

    Reply::ok("Order status updated successfully").with("order", &updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_stock_and_price_are_invalid() {
        let request = CreateMaterialRequest {
            school_id: None,
            name: "Uniform".into(),
            description: None,
            price: -1.0,
            stock: -5,
        };
        let err = request.validate().unwrap_err();
        assert!(err.field_errors().contains_key("price"));
        assert!(err.field_errors().contains_key("stock"));
    }

    #[test]
    fn test_zero_quantity_is_invalid() {
        let request = PlaceOrderRequest {
            material_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(request.validate().is_err());
    }
}
