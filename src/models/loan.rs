//! Loan record model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::enums::{LoanStatus, RenewalStatus, Role};
use crate::error::{AppError, AppResult};

const STAFF_NO_MAX_LEN: usize = 7;
const ADMISSION_NO_MAX_LEN: usize = 11;

/// Denormalized catalog data copied onto the record at borrow time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemRef {
    pub item_id: i32,
    pub title: String,
    pub author: String,
}

/// Borrower role together with its role-specific identity number
///
/// Students carry an admission number, staff and admins a staff number.
/// Deserialized values go through the same checks as `Borrower::new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "role", rename_all = "lowercase", try_from = "BorrowerRepr")]
pub enum Borrower {
    Student { admission_no: String },
    Staff { staff_no: String },
    Admin { staff_no: String },
}

/// Unchecked wire form of `Borrower`
#[derive(Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum BorrowerRepr {
    Student { admission_no: String },
    Staff { staff_no: String },
    Admin { staff_no: String },
}

impl TryFrom<BorrowerRepr> for Borrower {
    type Error = AppError;

    fn try_from(repr: BorrowerRepr) -> AppResult<Self> {
        match repr {
            BorrowerRepr::Student { admission_no } => Borrower::new(Role::Student, None, Some(admission_no)),
            BorrowerRepr::Staff { staff_no } => Borrower::new(Role::Staff, Some(staff_no), None),
            BorrowerRepr::Admin { staff_no } => Borrower::new(Role::Admin, Some(staff_no), None),
        }
    }
}

impl Borrower {
    /// Build a borrower identity from loose fields, rejecting any combination
    /// where the populated number does not match the role.
    pub fn new(role: Role, staff_no: Option<String>, admission_no: Option<String>) -> AppResult<Self> {
        let staff_no = staff_no.filter(|s| !s.trim().is_empty());
        let admission_no = admission_no.filter(|s| !s.trim().is_empty());

        match (role, staff_no, admission_no) {
            (Role::Student, None, Some(admission_no)) => {
                check_len("Admission number", &admission_no, ADMISSION_NO_MAX_LEN)?;
                Ok(Borrower::Student { admission_no })
            }
            (Role::Student, _, None) => Err(AppError::Validation(
                "Admission number is required for students".to_string(),
            )),
            (Role::Staff | Role::Admin, Some(staff_no), None) => {
                check_len("Staff number", &staff_no, STAFF_NO_MAX_LEN)?;
                Ok(match role {
                    Role::Admin => Borrower::Admin { staff_no },
                    _ => Borrower::Staff { staff_no },
                })
            }
            (Role::Staff | Role::Admin, None, _) => Err(AppError::Validation(format!(
                "Staff number is required for {}",
                role
            ))),
            (role, _, _) => Err(AppError::Validation(format!(
                "Exactly one identity number must be given for {}",
                role
            ))),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Borrower::Student { .. } => Role::Student,
            Borrower::Staff { .. } => Role::Staff,
            Borrower::Admin { .. } => Role::Admin,
        }
    }

    pub fn staff_no(&self) -> Option<&str> {
        match self {
            Borrower::Staff { staff_no } | Borrower::Admin { staff_no } => Some(staff_no),
            Borrower::Student { .. } => None,
        }
    }

    pub fn admission_no(&self) -> Option<&str> {
        match self {
            Borrower::Student { admission_no } => Some(admission_no),
            _ => None,
        }
    }
}

fn check_len(label: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            label, max
        )));
    }
    Ok(())
}

/// Checkout window; `return_date` never precedes `borrow_date`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "CheckoutFormRepr")]
pub struct CheckoutForm {
    borrow_date: DateTime<Utc>,
    return_date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CheckoutFormRepr {
    borrow_date: DateTime<Utc>,
    return_date: DateTime<Utc>,
}

impl TryFrom<CheckoutFormRepr> for CheckoutForm {
    type Error = AppError;

    fn try_from(repr: CheckoutFormRepr) -> AppResult<Self> {
        CheckoutForm::new(repr.borrow_date, repr.return_date)
    }
}

impl CheckoutForm {
    pub fn new(borrow_date: DateTime<Utc>, return_date: DateTime<Utc>) -> AppResult<Self> {
        if return_date < borrow_date {
            return Err(AppError::Validation(format!(
                "Return date {} is before borrow date {}",
                return_date, borrow_date
            )));
        }
        Ok(Self {
            borrow_date,
            return_date,
        })
    }

    pub fn borrow_date(&self) -> DateTime<Utc> {
        self.borrow_date
    }

    pub fn return_date(&self) -> DateTime<Utc> {
        self.return_date
    }

    /// Same window with a new return date
    pub fn with_return_date(&self, return_date: DateTime<Utc>) -> AppResult<Self> {
        Self::new(self.borrow_date, return_date)
    }
}

/// One checkout episode of one item by one user
///
/// Status and renewal fields are only changed by the transition engine;
/// `is_borrowed` is derived from the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub id: Uuid,
    pub item: ItemRef,
    pub borrower: Borrower,
    checkout_form: CheckoutForm,
    status: LoanStatus,
    #[serde(default)]
    renewal_status: RenewalStatus,
    /// Return date asked for by the pending renewal
    #[serde(default)]
    renewal_request_date: Option<DateTime<Utc>>,
}

impl LoanRecord {
    /// New pending record
    pub fn new(item: ItemRef, borrower: Borrower, checkout_form: CheckoutForm) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            borrower,
            checkout_form,
            status: LoanStatus::Pending,
            renewal_status: RenewalStatus::None,
            renewal_request_date: None,
        }
    }

    pub fn item_id(&self) -> i32 {
        self.item.item_id
    }

    pub fn checkout_form(&self) -> &CheckoutForm {
        &self.checkout_form
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn renewal_status(&self) -> RenewalStatus {
        self.renewal_status
    }

    pub fn renewal_request_date(&self) -> Option<DateTime<Utc>> {
        self.renewal_request_date
    }

    pub fn is_borrowed(&self) -> bool {
        self.status.is_active()
    }

    pub(crate) fn set_status(&mut self, status: LoanStatus) {
        self.status = status;
    }

    pub(crate) fn set_renewal(&mut self, status: RenewalStatus, requested: Option<DateTime<Utc>>) {
        self.renewal_status = status;
        self.renewal_request_date = requested;
    }

    pub(crate) fn set_checkout_form(&mut self, checkout_form: CheckoutForm) {
        self.checkout_form = checkout_form;
    }
}

/// Loan record as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanRecordView {
    pub id: Uuid,
    pub item: ItemRef,
    pub borrower: Borrower,
    pub checkout_form: CheckoutForm,
    pub status: LoanStatus,
    pub is_borrowed: bool,
    pub renewal_status: RenewalStatus,
    pub renewal_request_date: Option<DateTime<Utc>>,
}

impl From<&LoanRecord> for LoanRecordView {
    fn from(record: &LoanRecord) -> Self {
        Self {
            id: record.id,
            item: record.item.clone(),
            borrower: record.borrower.clone(),
            checkout_form: record.checkout_form.clone(),
            status: record.status,
            is_borrowed: record.is_borrowed(),
            renewal_status: record.renewal_status,
            renewal_request_date: record.renewal_request_date,
        }
    }
}

/// Borrow request payload accepted by the core
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub item_id: i32,
    /// Defaults to the creation time
    pub borrow_date: Option<DateTime<Utc>>,
    pub return_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_checkout_window_rejects_inverted_dates() {
        let borrow = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();

        assert!(matches!(CheckoutForm::new(borrow, before), Err(AppError::Validation(_))));
        assert!(CheckoutForm::new(borrow, borrow).is_ok());
    }

    #[test]
    fn test_stored_checkout_window_is_checked() {
        let form: CheckoutForm = serde_json::from_value(serde_json::json!({
            "borrow_date": "2024-01-01T00:00:00Z",
            "return_date": "2024-01-10T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(form.return_date(), Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());

        let inverted = serde_json::from_value::<CheckoutForm>(serde_json::json!({
            "borrow_date": "2024-01-10T00:00:00Z",
            "return_date": "2024-01-01T00:00:00Z"
        }));
        assert!(inverted.is_err());
    }

    #[test]
    fn test_stored_borrower_is_checked() {
        let staff: Borrower = serde_json::from_value(serde_json::json!({ "role": "staff", "staff_no": "ST001" })).unwrap();
        assert_eq!(staff.staff_no(), Some("ST001"));

        let too_long = serde_json::from_value::<Borrower>(serde_json::json!({ "role": "staff", "staff_no": "ST0000001" }));
        assert!(too_long.is_err());
        let blank = serde_json::from_value::<Borrower>(serde_json::json!({ "role": "student", "admission_no": " " }));
        assert!(blank.is_err());
        let serialized = serde_json::to_value(&staff).unwrap();
        assert_eq!(serialized, serde_json::json!({ "role": "staff", "staff_no": "ST001" }));
    }

    #[test]
    fn test_borrower_identity_matches_role() {
        let student = Borrower::new(Role::Student, None, Some("ADM2024001".into())).unwrap();
        assert_eq!(student.role(), Role::Student);
        assert_eq!(student.admission_no(), Some("ADM2024001"));
        assert_eq!(student.staff_no(), None);

        let admin = Borrower::new(Role::Admin, Some("ST001".into()), None).unwrap();
        assert_eq!(admin.role(), Role::Admin);
        assert_eq!(admin.staff_no(), Some("ST001"));
    }

    #[test]
    fn test_borrower_rejects_missing_or_double_identity() {
        assert!(Borrower::new(Role::Student, None, None).is_err());
        assert!(Borrower::new(Role::Staff, None, Some("ADM1".into())).is_err());
        assert!(Borrower::new(Role::Student, Some("ST1".into()), Some("ADM1".into())).is_err());
        assert!(Borrower::new(Role::Staff, Some("ST1".into()), Some("ADM1".into())).is_err());
        assert!(Borrower::new(Role::Staff, Some("ST-TOO-LONG".into()), None).is_err());
    }

    #[test]
    fn test_borrower_serializes_with_role_tag() {
        let staff = Borrower::new(Role::Staff, Some("ST042".into()), None).unwrap();
        let json = serde_json::to_value(&staff).unwrap();
        assert_eq!(json["role"], "staff");
        assert_eq!(json["staff_no"], "ST042");
    }

    #[test]
    fn test_new_record_is_pending_and_not_borrowed() {
        let borrow = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = LoanRecord::new(
            ItemRef { item_id: 7, title: "Dune".into(), author: "Frank Herbert".into() },
            Borrower::new(Role::Student, None, Some("ADM1".into())).unwrap(),
            CheckoutForm::new(borrow, borrow + chrono::Duration::days(14)).unwrap(),
        );
        assert_eq!(record.status(), LoanStatus::Pending);
        assert_eq!(record.renewal_status(), RenewalStatus::None);
        assert!(!record.is_borrowed());
    }
}
