//! # User Store
//!
//! The persistent side of the server: accounts, contact lists and the member directory.
//! Sessions consume it only through [`UserStore`]; [`memory::MemoryStore`] is an in-process
//! implementation used by tests and local runs.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ProtocolError;

pub use memory::MemoryStore;

/// Collaborator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid credentials")]
    AuthFailure,

    #[error("No such user: {0}")]
    NoSuchUser(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ProtocolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AuthFailure => ProtocolError::AuthenticationFailure,
            other => ProtocolError::Internal(other.to_string()),
        }
    }
}

impl From<ProtocolError> for StoreError {
    fn from(err: ProtocolError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: u32,
    pub login: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactGroup {
    pub id: u32,
    pub flags: u32,
    pub name: String,
}

/// One entry of a user's contact list as stored; presence is overlaid by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub id: u32,
    pub group_id: u32,
    pub flags: u32,
    pub login: String,
    pub nickname: String,
    pub server_flags: u32,
    pub phone: String,
}

/// Directory record returned by searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub login: String,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub sex: u32,
    pub birthday: String,
    pub city_id: u32,
    pub location: String,
    pub zodiac: u32,
    pub birth_month: u32,
    pub birth_day: u32,
    pub country_id: u32,
    pub phone: String,
    pub status: u32,
    pub age: Option<u32>,
}

/// Directory search criteria; every `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub user: Option<String>,
    pub domain: Option<String>,
    pub nickname: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sex: Option<u32>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub online_only: bool,
    pub city_id: Option<u32>,
    pub zodiac: Option<u32>,
    pub birth_month: Option<u32>,
    pub birth_day: Option<u32>,
    pub country_id: Option<u32>,
}

/// Contact to be added to a user's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub flags: u32,
    pub group_id: u32,
    pub login: String,
    pub nickname: String,
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Verify credentials. Unknown login and wrong password both yield `AuthFailure`.
    async fn authenticate(&self, login: &str, password: &str) -> StoreResult<Account>;

    async fn contact_groups(&self, user_id: u32) -> StoreResult<Vec<ContactGroup>>;

    async fn contacts(&self, user_id: u32) -> StoreResult<Vec<Contact>>;

    /// Persist the user's declared presence.
    async fn set_status(&self, user_id: u32, status: u32) -> StoreResult<()>;

    /// Directory search, at most `limit` rows.
    async fn search(&self, query: &SearchQuery, limit: usize) -> StoreResult<Vec<UserProfile>>;

    /// Add a contact (or, with the group flag, a group). Returns the new id.
    async fn add_contact(&self, user_id: u32, contact: NewContact) -> StoreResult<u32>;
}
