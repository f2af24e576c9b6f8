use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::ValidationErrors;

/// Field name -> messages, the JSON stand-in for a re-rendered form
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Error body sent to clients
///
/// ```
/// {
///   "status": "fail",
///   "message": "Invalid form input",
///   "errors": { "password2": ["The two password fields didn't match."] }
/// }
/// ```
///
/// `errors` is only present for form validation failures.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Canned error texts shared by handlers and middleware
#[derive(Debug, PartialEq)]
pub enum ErrorMessage {
    // Password validation errors
    EmptyPassword,
    ExceededMaxPasswordLength(usize),
    InvalidHashFormat,
    HashingError,

    // Authentication errors
    InvalidToken,
    TokenNotProvided,
    UserNotAuthenticated,
    WrongCredentials,
    EmailNotVerified,
    InactiveAccount,
    InvalidVerificationToken,
    TooManyLoginAttempts,

    // Authorization errors
    PermissionDenied,
    AuthorRequired,

    // Lookups
    UserNoLongerExist,
    BlogNotFound,
    CategoryNotFound,
    AuthorNotFound,

    InvalidForm,
    ServerError,
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorMessage::UserNoLongerExist => {
                "User belonging to this token no longer exists".to_string()
            }
            ErrorMessage::EmptyPassword => "Password cannot be empty".to_string(),
            ErrorMessage::HashingError => "Error while hashing password".to_string(),
            ErrorMessage::InvalidHashFormat => "Invalid password hash format".to_string(),
            ErrorMessage::ExceededMaxPasswordLength(max_length) => {
                format!("Password must not be more than {} characters", max_length)
            }
            ErrorMessage::InvalidToken => "Token is invalid or expired".to_string(),
            ErrorMessage::TokenNotProvided => {
                "You are not logged in, please provide a token".to_string()
            }
            ErrorMessage::UserNotAuthenticated => {
                "Authentication required. Please log in.".to_string()
            }
            ErrorMessage::WrongCredentials => {
                "Please enter a correct username and password.".to_string()
            }
            ErrorMessage::EmailNotVerified => {
                "Please verify your email address before logging in.".to_string()
            }
            ErrorMessage::InactiveAccount => "This account is inactive.".to_string(),
            ErrorMessage::InvalidVerificationToken => "Invalid verification token.".to_string(),
            ErrorMessage::TooManyLoginAttempts => {
                "Too many login attempts. Please try again later.".to_string()
            }
            ErrorMessage::PermissionDenied => {
                "You are not allowed to perform this action".to_string()
            }
            ErrorMessage::AuthorRequired => {
                "You need to be an author to access this page.".to_string()
            }
            ErrorMessage::BlogNotFound => "Blog not found".to_string(),
            ErrorMessage::CategoryNotFound => "Category not found".to_string(),
            ErrorMessage::AuthorNotFound => "Author not found".to_string(),
            ErrorMessage::InvalidForm => "Invalid form input".to_string(),
            ErrorMessage::ServerError => "Server Error. Please try again later".to_string(),
        };
        write!(f, "{}", message)
    }
}

/// Error type returned by handlers, middleware and the request flows
///
/// Bundles the client message with its status code; axum turns it into a
/// JSON response through `IntoResponse`.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub message: String,
    pub status: StatusCode,
    pub errors: Option<FieldErrors>,
}

impl HttpError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        HttpError {
            message: message.into(),
            status,
            errors: None,
        }
    }

    /// 500, for database, mail and filesystem failures
    pub fn server_error(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// 400
    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::BAD_REQUEST)
    }

    /// 409, unique username/email/category name and the like
    pub fn unique_constraint_violation(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::CONFLICT)
    }

    /// 401 (unauthenticated)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::UNAUTHORIZED)
    }

    /// 403 (authenticated but not allowed)
    pub fn forbidden(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::FORBIDDEN)
    }

    /// 404
    pub fn not_found(message: impl Into<String>) -> Self {
        HttpError::new(message, StatusCode::NOT_FOUND)
    }

    /// 400 carrying per-field messages
    pub fn invalid_form(errors: FieldErrors) -> Self {
        HttpError {
            message: ErrorMessage::InvalidForm.to_string(),
            status: StatusCode::BAD_REQUEST,
            errors: Some(errors),
        }
    }

    /// Single field error, for checks done outside `validator`
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        HttpError::invalid_form(errors)
    }

    pub fn into_http_response(self) -> Response {
        let json_response = Json(ErrorResponse {
            status: "fail".to_string(),
            message: self.message,
            errors: self.errors,
        });

        (self.status, json_response).into_response()
    }
}

impl From<ValidationErrors> for HttpError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, field_errors) in errors.field_errors() {
            let messages = field_errors
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid value ({})", e.code),
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }
        HttpError::invalid_form(fields)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpError: message: {}, status: {}",
            self.message, self.status
        )
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}
