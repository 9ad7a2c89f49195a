use std::fmt::Display;

use serde::{Deserialize, Serialize};
use vdp_common::Tenge;
use visit_dispatch_engine::db_types::{Attachment, OrderStatusType, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceOrderParams {
    pub target: OrderStatusType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageParams {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositParams {
    pub amount: Tenge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveDepositParams {
    pub approve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdateRequest {
    pub user_id: i64,
    #[serde(default)]
    pub apply: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}
