//! School shop: stock items and family orders.

use super::convert::{now_ts, parse_enum, parse_opt_uuid, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{
    Material, MaterialOrder, MaterialUpdate, NewMaterial, NewOrder, OrderStatus,
};
use async_trait::async_trait;
use uuid::Uuid;

const MATERIALS: ScopedTable = ScopedTable {
    kind: ResourceKind::Material,
    columns: "id, school_id, name, description, price, stock, created_at, updated_at",
    order_by: "name ASC",
};

const ORDERS: ScopedTable = ScopedTable {
    kind: ResourceKind::MaterialOrder,
    columns: "id, school_id, material_id, student_id, parent_id, ordered_by, quantity, \
              total_price, status, created_at, updated_at",
    order_by: "created_at DESC",
};

const DEPENDENTS: &[DependentRef] = &[("orders", "material_orders", "material_id")];

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub material_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

#[async_trait]
pub trait MaterialRepository: Send + Sync {
    async fn create(&self, material: &NewMaterial) -> Result<Material, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Material>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        search: Option<&str>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Material>, DbError>;

    async fn update(&self, id: Uuid, update: &MaterialUpdate) -> Result<Material, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Places a pending order priced at `unit_price * quantity`.
    async fn create_order(&self, order: &NewOrder) -> Result<MaterialOrder, DbError>;

    async fn find_order(
        &self,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<Option<MaterialOrder>, DbError>;

    async fn list_orders(
        &self,
        predicate: &Predicate,
        filter: &OrderFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<MaterialOrder>, DbError>;

    /// Moves `order` to `next` and adjusts stock in one transaction.
    ///
    /// Approval takes the ordered quantity out of stock and fails with a
    /// constraint error when stock is short. Cancelling an approved order
    /// puts the quantity back. The caller validates the transition.
    async fn change_status(
        &self,
        order: &MaterialOrder,
        next: OrderStatus,
    ) -> Result<MaterialOrder, DbError>;
}

pub struct SqliteMaterialRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteMaterialRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MaterialRepository for SqliteMaterialRepository {
    async fn create(&self, material: &NewMaterial) -> Result<Material, DbError> {
        let now = now_ts();
        let row: MaterialRow = sqlx::query_as(&format!(
            "INSERT INTO materials ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            MATERIALS.columns, MATERIALS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(material.school_id.to_string())
        .bind(material.name.trim())
        .bind(&material.description)
        .bind(material.price)
        .bind(material.stock)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Material>, DbError> {
        MATERIALS
            .find::<MaterialRow, Material>(&self.pool, predicate, id)
            .await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        search: Option<&str>,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Material>, DbError> {
        let rows = RowFilter::new().search(&["name", "description"], search);
        MATERIALS
            .list::<MaterialRow, Material>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn update(&self, id: Uuid, update: &MaterialUpdate) -> Result<Material, DbError> {
        let changes = Changes::new()
            .set_opt("name", update.name.as_deref().map(str::trim))
            .set_opt("description", update.description.clone())
            .set_opt("price", update.price)
            .set_opt("stock", update.stock);
        if !MATERIALS.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Material", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Material", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        MATERIALS.delete(&self.pool, id).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<MaterialOrder, DbError> {
        let now = now_ts();
        let total = crate::grading::round2(order.unit_price * order.quantity as f64);
        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO material_orders ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?) RETURNING {}",
            ORDERS.columns, ORDERS.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(order.school_id.to_string())
        .bind(order.material_id.to_string())
        .bind(order.student_id.to_string())
        .bind(order.parent_id.map(|id| id.to_string()))
        .bind(order.ordered_by.to_string())
        .bind(order.quantity)
        .bind(total)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_order(
        &self,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<Option<MaterialOrder>, DbError> {
        ORDERS
            .find::<OrderRow, MaterialOrder>(&self.pool, predicate, id)
            .await
    }

    async fn list_orders(
        &self,
        predicate: &Predicate,
        filter: &OrderFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<MaterialOrder>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("material_id", filter.material_id)
            .eq_opt("student_id", filter.student_id)
            .eq_opt("status", filter.status.map(|s| s.as_str()));
        ORDERS
            .list::<OrderRow, MaterialOrder>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn change_status(
        &self,
        order: &MaterialOrder,
        next: OrderStatus,
    ) -> Result<MaterialOrder, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        let now = now_ts();

        match (order.status, next) {
            (OrderStatus::Pending, OrderStatus::Approved) => {
                let taken = sqlx::query(
                    "UPDATE materials SET stock = stock - ?, updated_at = ? \
                     WHERE id = ? AND stock >= ?",
                )
                .bind(order.quantity)
                .bind(&now)
                .bind(order.material_id.to_string())
                .bind(order.quantity)
                .execute(&mut *tx)
                .await?;
                if taken.rows_affected() == 0 {
                    return Err(DbError::Constraint("Insufficient stock".to_string()));
                }
            }
            (OrderStatus::Approved, OrderStatus::Cancelled) => {
                sqlx::query(
                    "UPDATE materials SET stock = stock + ?, updated_at = ? WHERE id = ?",
                )
                .bind(order.quantity)
                .bind(&now)
                .bind(order.material_id.to_string())
                .execute(&mut *tx)
                .await?;
            }
            _ => {}
        }

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE material_orders SET status = ?, updated_at = ? \
             WHERE id = ? AND status = ? RETURNING {}",
            ORDERS.columns
        ))
        .bind(next.as_str())
        .bind(&now)
        .bind(order.id.to_string())
        .bind(order.status.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(DbError::Constraint(format!(
                "Order {} is no longer {}",
                order.id, order.status
            )));
        };

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        row.try_into()
    }
}

pub fn create_material_repository(pool: &DbPool) -> Box<dyn MaterialRepository> {
    Box::new(SqliteMaterialRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct MaterialRow {
    id: String,
    school_id: String,
    name: String,
    description: Option<String>,
    price: f64,
    stock: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MaterialRow> for Material {
    type Error = DbError;

    fn try_from(row: MaterialRow) -> Result<Self, Self::Error> {
        Ok(Material {
            id: parse_uuid(&row.id, "materials.id")?,
            school_id: parse_uuid(&row.school_id, "materials.school_id")?,
            name: row.name,
            description: row.description,
            price: row.price,
            stock: row.stock,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    school_id: String,
    material_id: String,
    student_id: String,
    parent_id: Option<String>,
    ordered_by: String,
    quantity: i64,
    total_price: f64,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<OrderRow> for MaterialOrder {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(MaterialOrder {
            id: parse_uuid(&row.id, "material_orders.id")?,
            school_id: parse_uuid(&row.school_id, "material_orders.school_id")?,
            material_id: parse_uuid(&row.material_id, "material_orders.material_id")?,
            student_id: parse_uuid(&row.student_id, "material_orders.student_id")?,
            parent_id: parse_opt_uuid(row.parent_id, "material_orders.parent_id")?,
            ordered_by: parse_uuid(&row.ordered_by, "material_orders.ordered_by")?,
            quantity: row.quantity,
            total_price: row.total_price,
            status: parse_enum(&row.status, "material_orders.status")?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_school, seed_student, test_pool};
    use crate::db::{create_student_repository, StudentRepository};

    async fn setup(
        pool: &DbPool,
        code: &str,
        stock: i64,
    ) -> (Box<dyn MaterialRepository>, Material, NewOrder) {
        let school = seed_school(pool, code).await;
        let student = seed_student(pool, school.id, None, "M-1").await;
        let repo = create_material_repository(pool);
        let material = repo
            .create(&NewMaterial {
                school_id: school.id,
                name: "Blazer".into(),
                description: None,
                price: 24.5,
                stock,
            })
            .await
            .unwrap();
        let order = NewOrder {
            school_id: school.id,
            material_id: material.id,
            student_id: student.id,
            parent_id: None,
            ordered_by: Uuid::new_v4(),
            quantity: 3,
            unit_price: material.price,
        };
        (repo, material, order)
    }

    #[tokio::test]
    async fn test_approval_takes_stock_and_cancel_restores_it() {
        let pool = test_pool().await;
        let (repo, material, new_order) = setup(&pool, "MAT", 5).await;

        let order = repo.create_order(&new_order).await.unwrap();
        assert_eq!(order.total_price, 73.5);
        assert_eq!(order.status, OrderStatus::Pending);

        let approved = repo.change_status(&order, OrderStatus::Approved).await.unwrap();
        let stock = repo.find(&Predicate::Unrestricted, material.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 2);

        repo.change_status(&approved, OrderStatus::Cancelled).await.unwrap();
        let stock = repo.find(&Predicate::Unrestricted, material.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 5);
        assert_eq!(repo.dependents(material.id).await.unwrap().get("orders"), Some(1));
    }

    #[tokio::test]
    async fn test_order_keeps_student_from_deletion() {
        let pool = test_pool().await;
        let (repo, _, new_order) = setup(&pool, "MKEEP", 5).await;
        repo.create_order(&new_order).await.unwrap();

        let students = create_student_repository(&pool);
        let deps = students.dependents(new_order.student_id).await.unwrap();
        assert_eq!(deps.get("orders"), Some(1));
        assert!(students.delete(new_order.student_id).await.is_err());
    }

    #[tokio::test]
    async fn test_short_stock_rejects_approval() {
        let pool = test_pool().await;
        let (repo, material, new_order) = setup(&pool, "MSH", 2).await;

        let order = repo.create_order(&new_order).await.unwrap();
        let err = repo.change_status(&order, OrderStatus::Approved).await.unwrap_err();
        assert!(err.is_constraint());

        let unchanged = repo.find_order(&Predicate::Unrestricted, order.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, OrderStatus::Pending);
        let stock = repo.find(&Predicate::Unrestricted, material.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 2);
    }

    #[tokio::test]
    async fn test_stale_order_is_rejected() {
        let pool = test_pool().await;
        let (repo, _, new_order) = setup(&pool, "MST", 10).await;

        let order = repo.create_order(&new_order).await.unwrap();
        repo.change_status(&order, OrderStatus::Rejected).await.unwrap();
        // `order` still says pending
        assert!(repo.change_status(&order, OrderStatus::Approved).await.is_err());
        let page = repo
            .list_orders(
                &Predicate::Unrestricted,
                &OrderFilter {
                    status: Some(OrderStatus::Rejected),
                    ..Default::default()
                },
                &Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }
}
