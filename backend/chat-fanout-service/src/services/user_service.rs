use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::repository::ChatRepository;

const MIN_PHONE_DIGITS: usize = 3;
const MAX_PROFILE_FIELD_LEN: usize = 64;
const MAX_URL_LEN: usize = 2048;

/// Fields a user may change on their own profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub status: Option<String>,
}

fn bounded(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.len() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} bytes"
        )));
    }
    Ok(value.to_string())
}

/// Blank optional fields clear the stored value.
fn optional(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// How a discovery query is interpreted after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserQuery {
    PhoneDigits(String),
    Username(String),
}

impl UserQuery {
    /// `None` for a blank query.
    ///
    /// Mostly-digit input with at least three digits is a phone number
    /// fragment; formatting characters are stripped once here.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        let significant = trimmed.chars().filter(|c| !c.is_whitespace()).count();
        if digits.len() >= MIN_PHONE_DIGITS && digits.len() * 2 >= significant {
            Some(UserQuery::PhoneDigits(digits))
        } else {
            Some(UserQuery::Username(trimmed.to_string()))
        }
    }
}

pub struct UserDirectory {
    repo: Arc<dyn ChatRepository>,
}

impl UserDirectory {
    pub fn new(repo: Arc<dyn ChatRepository>) -> Self {
        Self { repo }
    }

    pub async fn me(&self, user_id: Uuid) -> AppResult<User> {
        self.repo
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))
    }

    /// Apply `update` to the acting user's own profile and refresh `last_seen`.
    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> AppResult<User> {
        let mut user = self.me(user_id).await?;

        if let Some(username) = update.username {
            let username = bounded("username", &username, MAX_PROFILE_FIELD_LEN)?;
            if username.is_empty() {
                return Err(AppError::Validation("username must not be blank".into()));
            }
            if let Some(existing) = self.repo.find_user_by_username(&username).await? {
                if existing.id != user_id {
                    return Err(AppError::Validation("username is already taken".into()));
                }
            }
            user.username = username;
        }
        if let Some(display_name) = update.display_name {
            let display_name = bounded("displayName", &display_name, MAX_PROFILE_FIELD_LEN)?;
            user.display_name = optional(display_name);
        }
        if let Some(url) = update.profile_picture_url {
            let url = bounded("profilePictureUrl", &url, MAX_URL_LEN)?;
            user.profile_picture_url = optional(url);
        }
        if let Some(status) = update.status {
            user.status = optional(bounded("status", &status, MAX_PROFILE_FIELD_LEN)?);
        }
        user.last_seen = Some(Utc::now());

        if !self.repo.update_user(&user).await? {
            return Err(AppError::NotFound("user"));
        }
        tracing::info!(user_id = %user_id, "profile updated");
        Ok(user)
    }

    /// One query against the store; the acting user is never returned.
    pub async fn search(&self, raw_query: &str, acting_user_id: Uuid) -> AppResult<Vec<User>> {
        let Some(query) = UserQuery::normalize(raw_query) else {
            return Ok(Vec::new());
        };

        let mut users = match &query {
            UserQuery::PhoneDigits(digits) => self.repo.find_users_by_phone_digits(digits).await?,
            UserQuery::Username(fragment) => self.repo.find_users_by_username(fragment).await?,
        };
        users.retain(|u| u.id != acting_user_id);
        users.sort_by(|a, b| a.username.cmp(&b.username));

        tracing::debug!(query = ?query, results = users.len(), "user search");
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    #[test]
    fn normalization_picks_one_strategy() {
        assert_eq!(UserQuery::normalize("   "), None);
        assert_eq!(
            UserQuery::normalize("+1 (555) 010"),
            Some(UserQuery::PhoneDigits("1555010".into()))
        );
        assert_eq!(
            UserQuery::normalize("alice99"),
            Some(UserQuery::Username("alice99".into()))
        );
        assert_eq!(
            UserQuery::normalize("12"),
            Some(UserQuery::Username("12".into()))
        );
    }

    #[tokio::test]
    async fn search_excludes_acting_user() {
        let repo = Arc::new(MemoryRepository::new());
        let me = User::new("alice", "+15550100");
        let other = User::new("alicia", "+15550199");
        repo.insert_user(&me).await.unwrap();
        repo.insert_user(&other).await.unwrap();

        let directory = UserDirectory::new(repo);
        let by_name = directory.search("ALI", me.id).await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, other.id);

        let by_phone = directory.search("555-01", me.id).await.unwrap();
        assert_eq!(by_phone.iter().map(|u| u.id).collect::<Vec<_>>(), vec![other.id]);
    }

    #[tokio::test]
    async fn profile_update_touches_only_given_fields() {
        let repo = Arc::new(MemoryRepository::new());
        let me = User::new("alice", "+15550100");
        let taken = User::new("bob", "+15550101");
        repo.insert_user(&me).await.unwrap();
        repo.insert_user(&taken).await.unwrap();
        let directory = UserDirectory::new(repo.clone());

        let updated = directory
            .update_profile(
                me.id,
                ProfileUpdate {
                    status: Some("  on a plane ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.status.as_deref(), Some("on a plane"));
        assert!(updated.last_seen.is_some());
        assert_eq!(repo.find_user(me.id).await.unwrap().unwrap(), updated);

        let clash = directory
            .update_profile(
                me.id,
                ProfileUpdate {
                    username: Some("BOB".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(clash, Err(AppError::Validation(_))));

        let blank = directory
            .update_profile(
                me.id,
                ProfileUpdate {
                    username: Some("  ".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let missing = directory.me(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound("user"))));
    }
}
