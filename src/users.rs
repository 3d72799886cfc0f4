/// User account management for administrators
use log::info;
use regex::Regex;
use std::sync::OnceLock;

use crate::api::ApiClient;
use crate::error::UserError;
use crate::models::{NewUser, User};

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?\d{10,15}$").expect("valid phone pattern"))
}

/// Check a new account against the existing ones before it is sent
pub fn validate_new_user(user: &NewUser, existing: &[User]) -> Result<(), UserError> {
    if user.username.trim().is_empty() || user.email.trim().is_empty() || user.password.is_empty() {
        return Err(UserError::MissingField);
    }

    if let Some(phone) = user.phone_number.as_deref().filter(|p| !p.is_empty()) {
        if !phone_pattern().is_match(phone) {
            return Err(UserError::InvalidPhone);
        }
    }

    if let Some(device_id) = user.device_id.as_deref().filter(|d| !d.is_empty()) {
        if existing
            .iter()
            .any(|u| u.device_id.as_deref() == Some(device_id))
        {
            return Err(UserError::DeviceAssigned);
        }
    }

    Ok(())
}

/// Thin layer over the user endpoints
#[derive(Debug, Clone)]
pub struct UserDirectory {
    api: ApiClient,
}

impl UserDirectory {
    pub fn new(api: ApiClient) -> Self {
        UserDirectory { api }
    }

    pub async fn list(&self) -> Result<Vec<User>, UserError> {
        Ok(self.api.list_users().await?)
    }

    pub async fn count(&self) -> Result<usize, UserError> {
        Ok(self.list().await?.len())
    }

    /// Validate against the current user list, then create the account
    pub async fn create(&self, user: NewUser) -> Result<User, UserError> {
        let existing = self.list().await?;
        validate_new_user(&user, &existing)?;

        let created = self.api.create_user(&user).await?;
        info!("Created user {} ({})", created.username, created.id);
        Ok(created)
    }

    pub async fn delete(&self, user_id: &str) -> Result<(), UserError> {
        self.api.delete_user(user_id).await?;
        info!("Deleted user {}", user_id);
        Ok(())
    }
}
