use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;
use visit_dispatch_engine::{
    gateway::GatewayError,
    traits::{AuthApiError, ChatApiError, LedgerApiError, OrderFlowError},
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Auth token signature invalid or not provided")]
    CouldNotDeserializeAuthToken,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
    #[error("{0}")]
    Chat(#[from] ChatApiError),
    #[error("{0}")]
    Ledger(#[from] LedgerApiError),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializeAuthToken => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
                AuthError::ValidationError(_) | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            },
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            // Losing the accept race is routine; it must stay distinguishable from a rule
            // violation so clients can show "someone else took this order".
            Self::OrderFlow(e) => match e {
                OrderFlowError::AlreadyAssigned(_) => StatusCode::CONFLICT,
                OrderFlowError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
                OrderFlowError::ValidationError(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::Forbidden(_) => StatusCode::FORBIDDEN,
                OrderFlowError::LedgerError(_) | OrderFlowError::DatabaseError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
            Self::Chat(e) => match e {
                ChatApiError::NotAParticipant(_, _) => StatusCode::FORBIDDEN,
                ChatApiError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                ChatApiError::EmptyMessage => StatusCode::BAD_REQUEST,
                ChatApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Ledger(e) => match e {
                LedgerApiError::EntryNotFound(_) => StatusCode::NOT_FOUND,
                LedgerApiError::NotAPendingDeposit(_) => StatusCode::CONFLICT,
                LedgerApiError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                LedgerApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Gateway(e) => match e {
                GatewayError::Unauthorized | GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
                GatewayError::UnknownConnection(_) => StatusCode::NOT_FOUND,
                GatewayError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                GatewayError::Chat(ChatApiError::NotAParticipant(_, _)) => StatusCode::FORBIDDEN,
                GatewayError::Chat(ChatApiError::EmptyMessage) => StatusCode::BAD_REQUEST,
                GatewayError::Chat(ChatApiError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
                GatewayError::Chat(ChatApiError::DatabaseError(_)) | GatewayError::Backend(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
            Self::InitializeError(_)
            | Self::BackendError(_)
            | Self::IOError(_)
            | Self::ConfigurationError(_)
            | Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Login token signature is invalid. {0}")]
    ValidationError(String),
    #[error("Login token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("The access token has expired.")]
    TokenExpired,
}

impl From<AuthApiError> for ServerError {
    fn from(e: AuthApiError) -> Self {
        match e {
            AuthApiError::InvalidNonce => Self::AuthenticationError(AuthError::ValidationError(e.to_string())),
            AuthApiError::RoleNotAllowed(_) => {
                Self::AuthenticationError(AuthError::InsufficientPermissions(e.to_string()))
            },
            AuthApiError::InvalidToken(msg) => Self::AuthenticationError(AuthError::ValidationError(msg)),
            AuthApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}
