//! DTOs for QR sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{RecyclingReceiptDto, RedemptionReceiptDto};
use crate::domain::{QrSession, RecyclingTerms, RedemptionTerms};
use crate::service::{ConfirmationOutcome, RecyclingReceipt, RedemptionReceipt};

/// Request body for `POST /sessions/redemption`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRedemptionSessionRequest {
    /// Product to redeem.
    pub product_id: i64,
    /// Units; values below 1 (or absent) mean 1.
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Request body for `POST /sessions/recycling`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRecyclingSessionRequest {
    /// Material.
    pub object_type_id: i64,
    /// Measured weight.
    pub weight: f64,
}

/// A QR session of either kind.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionDto {
    /// Token encoded in the QR code.
    pub id: uuid::Uuid,
    /// `redemption` or `recycling`.
    pub kind: String,
    /// Creating store.
    pub store_id: i64,
    /// Product, for redemption sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    /// Units, for redemption sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    /// Material, for recycling sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type_id: Option<i64>,
    /// Weight, for recycling sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Points to be debited or credited.
    pub points_required: i64,
    /// `PENDING`, `CONFIRMED` or `EXPIRED`.
    pub state: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Deadline.
    pub expires_at: DateTime<Utc>,
    /// Confirming user.
    pub confirmed_by: Option<i64>,
    /// Confirmation timestamp.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl SessionDto {
    fn base<T>(session: &QrSession<T>, kind: &str) -> Self {
        Self {
            id: *session.id.as_uuid(),
            kind: kind.to_string(),
            store_id: session.store_id.get(),
            product_id: None,
            quantity: None,
            object_type_id: None,
            weight: None,
            points_required: session.points_required,
            state: session.state.to_string(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            confirmed_by: session.confirmed_by.map(|u| u.get()),
            confirmed_at: session.confirmed_at,
        }
    }
}

impl From<QrSession<RedemptionTerms>> for SessionDto {
    fn from(s: QrSession<RedemptionTerms>) -> Self {
        Self {
            product_id: Some(s.terms.product_id.get()),
            quantity: Some(s.terms.quantity),
            ..Self::base(&s, "redemption")
        }
    }
}

impl From<QrSession<RecyclingTerms>> for SessionDto {
    fn from(s: QrSession<RecyclingTerms>) -> Self {
        Self {
            object_type_id: Some(s.terms.object_type_id.get()),
            weight: Some(s.terms.weight),
            ..Self::base(&s, "recycling")
        }
    }
}

/// Request body for `POST /sessions/redemption/{id}/confirm`.
///
/// The fields echo what the scanning device displayed; they must match the
/// session exactly.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConfirmRedemptionRequest {
    /// Store shown, if the client sends it.
    #[serde(default)]
    pub store_id: Option<i64>,
    /// Product shown.
    pub product_id: i64,
    /// Quantity shown.
    pub quantity: i64,
}

/// Request body for `POST /sessions/recycling/{id}/confirm`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConfirmRecyclingRequest {
    /// Store shown, if the client sends it.
    #[serde(default)]
    pub store_id: Option<i64>,
    /// Material shown.
    pub object_type_id: i64,
    /// Weight shown.
    pub weight: f64,
}

/// Result of a redemption confirmation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedemptionConfirmationDto {
    /// Session in its final state.
    pub session: SessionDto,
    /// Ledger effects; absent when the session had expired.
    pub receipt: Option<RedemptionReceiptDto>,
}

impl From<ConfirmationOutcome<RedemptionTerms, RedemptionReceipt>> for RedemptionConfirmationDto {
    fn from(outcome: ConfirmationOutcome<RedemptionTerms, RedemptionReceipt>) -> Self {
        match outcome {
            ConfirmationOutcome::Confirmed { session, receipt } => Self {
                session: session.into(),
                receipt: Some(receipt.into()),
            },
            ConfirmationOutcome::Expired { session } => Self {
                session: session.into(),
                receipt: None,
            },
        }
    }
}

/// Result of a recycling confirmation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecyclingConfirmationDto {
    /// Session in its final state.
    pub session: SessionDto,
    /// Ledger effects; absent when the session had expired.
    pub receipt: Option<RecyclingReceiptDto>,
}

impl From<ConfirmationOutcome<RecyclingTerms, RecyclingReceipt>> for RecyclingConfirmationDto {
    fn from(outcome: ConfirmationOutcome<RecyclingTerms, RecyclingReceipt>) -> Self {
        match outcome {
            ConfirmationOutcome::Confirmed { session, receipt } => Self {
                session: session.into(),
                receipt: Some(receipt.into()),
            },
            ConfirmationOutcome::Expired { session } => Self {
                session: session.into(),
                receipt: None,
            },
        }
    }
}
