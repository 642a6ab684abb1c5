//! Class listing, creation and reservation.
//!
//! Thin request functions over [`SessionManager::send`]. Any non-2xx status
//! that survives the refresh protocol becomes `ClientError::Server`.

use chrono::{DateTime, NaiveDate, Utc};
use classbook_core::validation::{validate_capacity, validate_title};
use classbook_core::{ClassId, ClassRecord, ClassStatus, NewClass, Reservation, UserProfile};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, instrument};

use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::session::SessionManager;
use crate::transport::ApiResponse;

/// Input of the class creation form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassForm {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub capacity: u32,
}

/// `GET /class/list` answers either with a bare array or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClassList {
    Bare(Vec<ClassRecord>),
    Wrapped { data: Vec<ClassRecord> },
}

impl From<ClassList> for Vec<ClassRecord> {
    fn from(list: ClassList) -> Self {
        match list {
            ClassList::Bare(classes) | ClassList::Wrapped { data: classes } => classes,
        }
    }
}

/// Class operations for the signed-in user.
#[derive(Debug, Clone)]
pub struct ClassesApi {
    session: SessionManager,
}

impl ClassesApi {
    #[must_use]
    pub const fn new(session: SessionManager) -> Self {
        Self { session }
    }

    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Every class the server knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the session has expired.
    #[instrument(skip(self))]
    pub async fn list_classes(&self) -> Result<Vec<ClassRecord>, ClientError> {
        self.fetch_classes(None).await
    }

    /// Classes starting on `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the session has expired.
    #[instrument(skip(self))]
    pub async fn list_classes_on(&self, date: NaiveDate) -> Result<Vec<ClassRecord>, ClientError> {
        self.fetch_classes(Some(date)).await
    }

    async fn fetch_classes(&self, date: Option<NaiveDate>) -> Result<Vec<ClassRecord>, ClientError> {
        let response = self.session.send(Endpoint::ListClasses { date }).await?;
        let list: ClassList = success_json(&response)?;
        Ok(list.into())
    }

    /// Create a class owned by the signed-in user.
    ///
    /// Returns the server's record of the new class as-is.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a blank title or a capacity
    /// outside 1..=30, and `ClientError::NotLoggedIn` without a cached profile.
    #[instrument(skip(self, form), fields(title = %form.title))]
    pub async fn create_class(&self, form: ClassForm) -> Result<Value, ClientError> {
        validate_title(&form.title)?;
        validate_capacity(form.capacity)?;
        let user = self.require_user().await?;

        let new_class = NewClass {
            title: form.title.trim().to_string(),
            creator_id: user.id,
            start_date: form.start,
            description: form.description,
            status: ClassStatus::Active,
            capacity: form.capacity,
        };
        let response = self.session.send(Endpoint::CreateClass(new_class)).await?;
        let created = success_body(&response)?;

        info!("Class created");
        Ok(created)
    }

    /// Reserve a seat in `class_id` for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotLoggedIn` without a cached profile and
    /// `ClientError::Server` if the server refuses the reservation.
    #[instrument(skip(self))]
    pub async fn reserve_class(&self, class_id: ClassId) -> Result<Value, ClientError> {
        let user = self.require_user().await?;
        let response = self
            .session
            .send(Endpoint::ReserveClass(Reservation {
                class_id,
                user_id: user.id,
            }))
            .await?;
        let reserved = success_body(&response)?;

        info!(%class_id, "Seat reserved");
        Ok(reserved)
    }

    async fn require_user(&self) -> Result<UserProfile, ClientError> {
        self.session
            .current_user()
            .await?
            .ok_or(ClientError::NotLoggedIn)
    }
}

fn ensure_success(response: &ApiResponse) -> Result<(), ClientError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ClientError::Server {
            status: response.status,
            message: response.error_message(),
        })
    }
}

fn success_json<T: DeserializeOwned>(response: &ApiResponse) -> Result<T, ClientError> {
    ensure_success(response)?;
    Ok(response.json()?)
}

/// Success body as opaque JSON; an empty body is `null`.
fn success_body(response: &ApiResponse) -> Result<Value, ClientError> {
    ensure_success(response)?;
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(response.json()?)
}
