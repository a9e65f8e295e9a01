//! Ledger user model, session claims and related types

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::enums::Role;
use super::loan::{Borrower, LoanRecord, LoanRecordView};
use crate::error::{AppError, AppResult};

/// A user together with its two loan collections
///
/// `cart` holds in-flight records keyed by item id (at most one per item),
/// `history` holds archived records in archival order. `version` is bumped by
/// the record store on every successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerUser {
    pub id: i32,
    pub full_name: String,
    pub email: Option<String>,
    pub borrower: Borrower,
    #[serde(with = "cart_order")]
    cart: IndexMap<i32, LoanRecord>,
    history: Vec<LoanRecord>,
    version: i64,
}

impl LedgerUser {
    pub fn new(id: i32, profile: BorrowerProfile) -> Self {
        Self {
            id,
            full_name: profile.full_name,
            email: profile.email,
            borrower: profile.borrower,
            cart: IndexMap::new(),
            history: Vec::new(),
            version: 0,
        }
    }

    /// Rebuild a user from persisted parts
    pub fn from_parts(
        id: i32,
        profile: BorrowerProfile,
        cart: Vec<LoanRecord>,
        history: Vec<LoanRecord>,
        version: i64,
    ) -> Self {
        Self {
            id,
            full_name: profile.full_name,
            email: profile.email,
            borrower: profile.borrower,
            cart: cart.into_iter().map(|r| (r.item_id(), r)).collect(),
            history,
            version,
        }
    }

    pub fn role(&self) -> Role {
        self.borrower.role()
    }

    pub fn cart(&self) -> &IndexMap<i32, LoanRecord> {
        &self.cart
    }

    pub fn history(&self) -> &[LoanRecord] {
        &self.history
    }

    pub fn cart_entry(&self, item_id: i32) -> Option<&LoanRecord> {
        self.cart.get(&item_id)
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    /// Add a new record to the cart; a second in-flight record for the same
    /// item is refused.
    pub(crate) fn insert_cart(&mut self, record: LoanRecord) -> AppResult<()> {
        let item_id = record.item_id();
        if self.cart.contains_key(&item_id) {
            return Err(AppError::Conflict(format!(
                "User {} already has an in-flight loan for item {}",
                self.id, item_id
            )));
        }
        self.cart.insert(item_id, record);
        Ok(())
    }

    /// Overwrite the cart entry for the record's item, keeping its position
    pub(crate) fn replace_cart(&mut self, record: LoanRecord) -> AppResult<()> {
        match self.cart.get_mut(&record.item_id()) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Item {} not found in cart of user {}",
                record.item_id(),
                self.id
            ))),
        }
    }

    /// Remove the cart entry for `item_id` and append it to history
    pub(crate) fn move_to_history(&mut self, item_id: i32) -> Option<&LoanRecord> {
        let record = self.cart.shift_remove(&item_id)?;
        self.history.push(record);
        self.history.last()
    }
}

/// Serialize the cart as an ordered array; the key is derived from each record.
mod cart_order {
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::models::loan::LoanRecord;

    pub fn serialize<S>(cart: &IndexMap<i32, LoanRecord>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(cart.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<IndexMap<i32, LoanRecord>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let records = Vec::<LoanRecord>::deserialize(deserializer)?;
        Ok(records.into_iter().map(|r| (r.item_id(), r)).collect())
    }
}

/// Profile data of a ledger user
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowerProfile {
    pub full_name: String,
    pub email: Option<String>,
    pub borrower: Borrower,
}

/// Register borrower request (admin only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterBorrower {
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub role: Role,
    /// Required for staff and admin
    pub staff_no: Option<String>,
    /// Required for students
    pub admission_no: Option<String>,
}

impl RegisterBorrower {
    pub fn into_profile(self) -> AppResult<BorrowerProfile> {
        self.validate()?;
        let borrower = Borrower::new(self.role, self.staff_no, self.admission_no)?;
        Ok(BorrowerProfile {
            full_name: self.full_name.trim().to_string(),
            email: self.email,
            borrower,
        })
    }
}

/// User ledger as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerView {
    pub id: i32,
    pub full_name: String,
    pub email: Option<String>,
    pub borrower: Borrower,
    /// True while any record of the user is an accepted loan
    pub is_borrowed: bool,
    pub cart: Vec<LoanRecordView>,
    pub history: Vec<LoanRecordView>,
}

impl From<&LedgerUser> for LedgerView {
    fn from(user: &LedgerUser) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            borrower: user.borrower.clone(),
            is_borrowed: crate::services::eligibility::derive_is_borrowed(user),
            cart: user.cart.values().map(LoanRecordView::from).collect(),
            history: user.history.iter().map(LoanRecordView::from).collect(),
        }
    }
}

/// Caller identity supplied by the session context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i32,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: i32, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// JWT claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Claims valid for `hours` from now
    pub fn new(user_id: i32, role: Role, hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            user_id,
            role,
            exp: (now + chrono::Duration::hours(hours)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Unauthorized("Administrator privileges required".to_string()))
        }
    }

    /// Require the caller to be `user_id` or an admin (read access)
    pub fn require_self_or_admin(&self, user_id: i32) -> Result<(), AppError> {
        if self.user_id == user_id || self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "Not allowed to read the loans of user {}",
                user_id
            )))
        }
    }
}
