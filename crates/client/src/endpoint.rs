//! Typed endpoints of the class server.
//!
//! Each server operation is one [`Endpoint`] variant carrying its request
//! payload, so the method, path and body of every call are fixed at compile
//! time. Response payloads that the client interprets live here too.

use chrono::NaiveDate;
use classbook_core::{Email, NewClass, Reservation, UserId, UserProfile};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

pub const LOGIN_PATH: &str = "/auth/login";
pub const SIGNUP_PATH: &str = "/auth/signup";
pub const REFRESH_PATH: &str = "/auth/token";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const LIST_CLASSES_PATH: &str = "/class/list";
pub const CREATE_CLASS_PATH: &str = "/class/create";
pub const RESERVE_CLASS_PATH: &str = "/class/reserve";

/// Paths that never carry a bearer token and never trigger a refresh.
pub const AUTH_EXEMPT_PATHS: [&str; 3] = [LOGIN_PATH, SIGNUP_PATH, REFRESH_PATH];

/// Whether `path` is one of the authentication endpoints.
#[must_use]
pub fn is_auth_exempt_path(path: &str) -> bool {
    AUTH_EXEMPT_PATHS.contains(&path)
}

/// A call to the class server.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Login(LoginRequest),
    Signup(SignupRequest),
    RefreshToken(RefreshRequest),
    Logout(LogoutRequest),
    /// All classes, or only those on `date` when given.
    ListClasses { date: Option<NaiveDate> },
    CreateClass(NewClass),
    ReserveClass(Reservation),
}

impl Endpoint {
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Login(_) => LOGIN_PATH,
            Self::Signup(_) => SIGNUP_PATH,
            Self::RefreshToken(_) => REFRESH_PATH,
            Self::Logout(_) => LOGOUT_PATH,
            Self::ListClasses { .. } => LIST_CLASSES_PATH,
            Self::CreateClass(_) => CREATE_CLASS_PATH,
            Self::ReserveClass(_) => RESERVE_CLASS_PATH,
        }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::ListClasses { .. } => Method::GET,
            _ => Method::POST,
        }
    }

    /// Query string parameters.
    #[must_use]
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ListClasses { date: Some(date) } => {
                vec![("date", date.format("%Y-%m-%d").to_string())]
            }
            _ => Vec::new(),
        }
    }

    /// Login, sign-up and token refresh are exempt from bearer decoration
    /// and from the refresh-and-retry protocol.
    #[must_use]
    pub fn is_auth_exempt(&self) -> bool {
        is_auth_exempt_path(self.path())
    }

    /// JSON request body, if the endpoint sends one.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload fails to serialize.
    pub fn body(&self) -> Result<Option<Value>, serde_json::Error> {
        let body = match self {
            Self::Login(login) => json!({
                "email": login.email,
                "password": login.password.expose_secret(),
            }),
            Self::Signup(signup) => json!({
                "name": signup.name,
                "email": signup.email,
                "password": signup.password.expose_secret(),
            }),
            Self::RefreshToken(refresh) => json!({
                "refreshToken": refresh.refresh_token.expose_secret(),
            }),
            Self::Logout(logout) => json!({ "user_id": logout.user_id }),
            Self::ListClasses { .. } => return Ok(None),
            Self::CreateClass(new_class) => serde_json::to_value(new_class)?,
            Self::ReserveClass(reservation) => serde_json::to_value(reservation)?,
        };
        Ok(Some(body))
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: Email,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: Email,
    pub password: SecretString,
}

#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub refresh_token: SecretString,
}

#[derive(Debug, Clone, Copy)]
pub struct LogoutRequest {
    pub user_id: UserId,
}

/// Success body of `POST /auth/login`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

/// Success body of `POST /auth/signup`.
#[derive(Debug, Deserialize)]
pub struct SignupResponse {
    pub user: UserProfile,
}

/// Success body of `POST /auth/token`.
///
/// Servers that do not rotate refresh tokens may omit `refreshToken`; the
/// stored one is kept in that case.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
