//! Ledger users repository for database operations

use async_trait::async_trait;
use sqlx::{postgres::PgRow, types::Json, Pool, Postgres, Row};

use super::{CartFilter, RecordStore};
use crate::{
    error::{AppError, AppResult},
    models::{Borrower, BorrowerProfile, LedgerUser, LoanRecord, Role},
};

const SELECT_USER: &str = r#"
    SELECT id, full_name, email, role, staff_no, admission_no, cart, history, version
    FROM ledger_users
"#;

#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool<Postgres>,
}

impl PgRecordStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn user_from_row(row: &PgRow) -> AppResult<LedgerUser> {
        let id: i32 = row.try_get("id")?;
        let role: String = row.try_get("role")?;
        let role: Role = role
            .parse()
            .map_err(|e: String| AppError::StoreFailure(format!("User {}: {}", id, e)))?;
        let borrower = Borrower::new(role, row.try_get("staff_no")?, row.try_get("admission_no")?)
            .map_err(|e| AppError::StoreFailure(format!("User {}: {}", id, e)))?;

        let Json(cart): Json<Vec<LoanRecord>> = row.try_get("cart")?;
        let Json(history): Json<Vec<LoanRecord>> = row.try_get("history")?;

        Ok(LedgerUser::from_parts(
            id,
            BorrowerProfile {
                full_name: row.try_get("full_name")?,
                email: row.try_get("email")?,
                borrower,
            },
            cart,
            history,
            row.try_get("version")?,
        ))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    /// Get a user with its cart and history
    async fn load(&self, user_id: i32) -> AppResult<LedgerUser> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_USER))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        Self::user_from_row(&row)
    }

    /// Write cart and history if the stored version still matches
    async fn save(&self, user_id: i32, user: &LedgerUser) -> AppResult<LedgerUser> {
        let cart: Vec<&LoanRecord> = user.cart().values().collect();

        let result = sqlx::query(
            r#"
            UPDATE ledger_users
            SET cart = $1, history = $2, version = version + 1, updated_at = NOW()
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(Json(cart))
        .bind(Json(user.history()))
        .bind(user_id)
        .bind(user.version())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ledger_users WHERE id = $1)")
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await?;

            return Err(if exists {
                AppError::Conflict(format!(
                    "User {} was modified concurrently (version {} is stale)",
                    user_id,
                    user.version()
                ))
            } else {
                AppError::NotFound(format!("User with id {} not found", user_id))
            });
        }

        let mut saved = user.clone();
        saved.set_version(user.version() + 1);
        Ok(saved)
    }

    /// Register a borrower with empty collections
    async fn create(&self, profile: &BorrowerProfile) -> AppResult<LedgerUser> {
        let inserted = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO ledger_users (full_name, email, role, staff_no, admission_no)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(profile.borrower.role().as_str())
        .bind(profile.borrower.staff_no())
        .bind(profile.borrower.admission_no())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(LedgerUser::new(id, profile.clone())),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                "A user with this email or identity number already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Users with at least one cart record matching the filter
    async fn find_with_cart_status(&self, filter: CartFilter) -> AppResult<Vec<LedgerUser>> {
        let (field, value) = filter.json_predicate();

        let rows = sqlx::query(&format!(
            r#"{}
            WHERE EXISTS (
                SELECT 1 FROM jsonb_array_elements(cart) AS entry
                WHERE entry ->> $1 = $2
            )
            ORDER BY id
            "#,
            SELECT_USER
        ))
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::user_from_row).collect()
    }

    async fn list(&self) -> AppResult<Vec<LedgerUser>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_USER))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::user_from_row).collect()
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
