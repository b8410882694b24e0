use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::pagination::{Page, DEFAULT_PAGE_SIZE};
use super::repo_types::{Credentials, NewUser, Role, User, UserPatch};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 100;
const PASSWORD_MIN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_username(username: &str) -> Result<(), &'static str> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err("Username must be 3-100 characters");
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), &'static str> {
    if !is_valid_email(email) {
        return Err("Invalid email");
    }
    Ok(())
}

fn check_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < PASSWORD_MIN {
        return Err("Password too short");
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Request body for user registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl RegisterRequest {
    pub fn into_draft(self) -> Result<NewUser, &'static str> {
        let username = self.username.trim().to_string();
        let email = normalize_email(&self.email);
        check_username(&username)?;
        check_email(&email)?;
        check_password(&self.password)?;
        Ok(NewUser {
            username,
            email,
            password: self.password,
            role: self.role,
        })
    }
}

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn into_credentials(self) -> Result<Credentials, &'static str> {
        let username = self.username.trim().to_string();
        if username.is_empty() || self.password.is_empty() {
            return Err("Username and password are required");
        }
        Ok(Credentials {
            username,
            password: self.password,
        })
    }
}

/// Request body for a partial profile update. Omitted or empty fields are kept.
#[derive(Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl UpdateUserRequest {
    pub fn into_patch(self) -> Result<UserPatch, &'static str> {
        let username = self
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let email = self
            .email
            .map(|e| normalize_email(&e))
            .filter(|e| !e.is_empty());
        let password = self.password.filter(|p| !p.is_empty());

        if let Some(u) = &username {
            check_username(u)?;
        }
        if let Some(e) = &email {
            check_email(e)?;
        }
        if let Some(p) = &password {
            check_password(p)?;
        }
        Ok(UserPatch {
            username,
            email,
            password,
            role: self.role,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// Response returned after register or login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl From<Page<User>> for UserListResponse {
    fn from(p: Page<User>) -> Self {
        Self {
            users: p.items,
            total: p.total,
            page: p.page,
            page_size: p.page_size,
            total_pages: p.total_pages,
            has_next: p.has_next,
            has_prev: p.has_prev,
        }
    }
}
