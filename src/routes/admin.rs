//! Admin dashboard: customers, order management and statistics.

use std::collections::BTreeMap;

use axum::{
    extract::State,
    routing::{get, patch},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::{change_status, load_order, parse_status};
use super::{non_blank, ApiJson, ApiPath, ApiQuery, Paginated};
use crate::auth::AdminUser;
use crate::domain::aggregates::product::LOW_STOCK_THRESHOLD;
use crate::domain::aggregates::{Order, OrderStatus, PaymentStatus, Product, ProductStatus, ProductView, Role, User, UserProfile};
use crate::domain::value_objects::Money;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Filter, Page, Pagination, Query, Sort};

pub const RECENT_ORDERS: u64 = 5;
pub const LOW_STOCK_LIMIT: u64 = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/customers", get(list_customers))
        .route("/api/admin/customers/:id", get(customer_detail))
        .route("/api/admin/customers/:id/role", patch(change_role))
        .route("/api/admin/orders", get(list_orders))
        .route("/api/admin/orders/:id/status", patch(update_status))
        .route("/api/admin/stats", get(stats))
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrderParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub note: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub order_count: u64,
    pub total_spent: Money,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub revenue: Money,
    pub total_orders: u64,
    pub orders_by_status: BTreeMap<&'static str, u64>,
    pub product_count: u64,
    pub customer_count: u64,
    pub low_stock: Vec<ProductView>,
    pub recent_orders: Vec<Order>,
}

async fn paid_total(state: &AppState, filter: Filter) -> AppResult<Money> {
    let paid = state.repo::<Order>().find(&Query::new(filter.eq("payment_status", PaymentStatus::Paid))).await?;
    Ok(paid.iter().map(|o| o.totals.total).sum())
}

async fn list_customers(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<CustomerListParams>,
) -> AppResult<Json<Paginated<UserProfile>>> {
    let pagination = Pagination::new(params.page, params.limit);
    let mut filter = Filter::new();
    if let Some(role) = params.role {
        filter = filter.eq("role", role);
    }
    if let Some(search) = params.search {
        filter = filter.search(&["name", "email"], &search);
    }
    let query = Query::new(filter).sort(Sort::desc("created_at")).page(pagination.to_page());
    let (users, total) = state.repo::<User>().page(&query).await?;
    Ok(Json(Paginated::new(users.iter().map(UserProfile::from).collect(), pagination, total)))
}

async fn customer_detail(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<CustomerDetail>> {
    let user = state.repo::<User>().get(id).await?.ok_or(AppError::NotFound("Customer"))?;
    let own = Filter::new().eq("user_id", id);
    let order_count = state.repo::<Order>().count(&own).await?;
    let total_spent = paid_total(&state, own).await?;
    Ok(Json(CustomerDetail { profile: UserProfile::from(&user), order_count, total_spent }))
}

async fn change_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> AppResult<Json<UserProfile>> {
    if id == admin.id && req.role != Role::Admin {
        return Err(AppError::validation("You cannot remove your own admin role"));
    }
    let users = state.repo::<User>();
    let mut user = users.get(id).await?.ok_or(AppError::NotFound("Customer"))?;
    user.role = req.role;
    user.touch();
    users.save(&user).await?;
    tracing::info!(user_id = %id, role = ?req.role, admin_id = %admin.id, "User role changed");
    Ok(Json(UserProfile::from(&user)))
}

async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiQuery(params): ApiQuery<AdminOrderParams>,
) -> AppResult<Json<Paginated<Order>>> {
    let pagination = Pagination::new(params.page, params.limit);
    let mut filter = Filter::new();
    if let Some(status) = non_blank(params.status) {
        filter = filter.eq("status", parse_status(&status)?);
    }
    if let Some(search) = params.search {
        filter = filter.search(&["order_number", "email"], &search);
    }
    let query = Query::new(filter).sort(Sort::desc("created_at")).page(pagination.to_page());
    let (orders, total) = state.repo::<Order>().page(&query).await?;
    Ok(Json(Paginated::new(orders, pagination, total)))
}

async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusUpdateRequest>,
) -> AppResult<Json<Order>> {
    let next = parse_status(&req.status)?;
    let mut order = load_order(&state, id).await?;
    change_status(&state, &mut order, next, req.note, req.tracking_number).await?;
    tracing::info!(order_id = %id, status = %next, admin_id = %admin.id, "Order status updated by admin");
    Ok(Json(order))
}

async fn stats(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<DashboardStats>> {
    let orders = state.repo::<Order>();
    let products = state.repo::<Product>();

    let mut orders_by_status = BTreeMap::new();
    let mut total_orders = 0;
    for status in OrderStatus::ALL {
        let count = orders.count(&Filter::new().eq("status", status)).await?;
        total_orders += count;
        orders_by_status.insert(status.as_str(), count);
    }

    let low_stock_query = Query::new(
        Filter::new()
            .ne("status", ProductStatus::Archived)
            .lte("stock", Decimal::from(LOW_STOCK_THRESHOLD)),
    )
    .sort(Sort::asc("stock"))
    .page(Page { skip: 0, limit: LOW_STOCK_LIMIT });
    let low_stock = products.find(&low_stock_query).await?.iter().map(ProductView::from).collect();

    let recent_query = Query::all().sort(Sort::desc("created_at")).page(Page { skip: 0, limit: RECENT_ORDERS });

    Ok(Json(DashboardStats {
        revenue: paid_total(&state, Filter::new()).await?,
        total_orders,
        orders_by_status,
        product_count: products.count(&Filter::new()).await?,
        customer_count: state.repo::<User>().count(&Filter::new().eq("role", Role::Customer)).await?,
        low_stock,
        recent_orders: orders.find(&recent_query).await?,
    }))
}
