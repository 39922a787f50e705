//! In-memory [`UserStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    Account, Contact, ContactGroup, NewContact, SearchQuery, StoreError, StoreResult, UserProfile,
    UserStore,
};
use crate::protocol::commands::contact_oper::CONTACT_FLAG_GROUP;

/// Name of the group every account starts with.
pub const DEFAULT_GROUP: &str = "General";

#[derive(Debug)]
struct UserRecord {
    account: Account,
    password: String,
    profile: UserProfile,
    status: u32,
    groups: Vec<ContactGroup>,
    contacts: Vec<Contact>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<u32, UserRecord>,
    by_login: HashMap<String, u32>,
    next_user_id: u32,
    next_contact_id: u32,
}

/// Thread-safe store kept entirely in memory.
///
/// `set_unavailable(true)` makes every call fail with [`StoreError::Backend`], which lets tests
/// exercise the internal-error paths of the session.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account; returns its id.
    pub async fn add_user(&self, login: &str, password: &str, nickname: &str) -> StoreResult<u32> {
        let key = login.to_lowercase();
        let mut inner = self.inner.write().await;
        if inner.by_login.contains_key(&key) {
            return Err(StoreError::AlreadyExists(login.to_string()));
        }
        inner.next_user_id += 1;
        let user_id = inner.next_user_id;

        let account = Account {
            user_id,
            login: login.to_string(),
            nickname: nickname.to_string(),
        };
        let profile = UserProfile {
            login: login.to_string(),
            nickname: nickname.to_string(),
            ..UserProfile::default()
        };
        inner.users.insert(
            user_id,
            UserRecord {
                account,
                password: password.to_string(),
                profile,
                status: 0,
                groups: vec![ContactGroup {
                    id: 0,
                    flags: 0,
                    name: DEFAULT_GROUP.to_string(),
                }],
                contacts: Vec::new(),
            },
        );
        inner.by_login.insert(key, user_id);
        debug!(user_id, login, "account created");
        Ok(user_id)
    }

    /// Replace the directory profile of an account. The login is kept.
    pub async fn set_profile(&self, user_id: u32, profile: UserProfile) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NoSuchUser(user_id.to_string()))?;
        let login = record.account.login.clone();
        record.profile = UserProfile { login, ..profile };
        Ok(())
    }

    /// Last persisted status of an account.
    pub async fn status_of(&self, user_id: u32) -> Option<u32> {
        self.inner.read().await.users.get(&user_id).map(|u| u.status)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Backend("store offline".into()))
        } else {
            Ok(())
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn profile_matches(profile: &UserProfile, query: &SearchQuery) -> bool {
    let (user, domain) = profile
        .login
        .split_once('@')
        .unwrap_or((profile.login.as_str(), ""));

    let text_ok = |field: &str, wanted: &Option<String>, exact: bool| match wanted {
        None => true,
        Some(w) if w.is_empty() => true,
        Some(w) if exact => field.eq_ignore_ascii_case(w),
        Some(w) => contains_ci(field, w),
    };
    let num_ok = |field: u32, wanted: Option<u32>| wanted.map_or(true, |w| w == field);

    text_ok(user, &query.user, true)
        && text_ok(domain, &query.domain, true)
        && text_ok(&profile.nickname, &query.nickname, false)
        && text_ok(&profile.first_name, &query.first_name, false)
        && text_ok(&profile.last_name, &query.last_name, false)
        && num_ok(profile.sex, query.sex)
        && num_ok(profile.city_id, query.city_id)
        && num_ok(profile.zodiac, query.zodiac)
        && num_ok(profile.birth_month, query.birth_month)
        && num_ok(profile.birth_day, query.birth_day)
        && num_ok(profile.country_id, query.country_id)
        && query
            .min_age
            .map_or(true, |min| profile.age.is_some_and(|age| age >= min))
        && query
            .max_age
            .map_or(true, |max| profile.age.is_some_and(|age| age <= max))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn authenticate(&self, login: &str, password: &str) -> StoreResult<Account> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let record = inner
            .by_login
            .get(&login.to_lowercase())
            .and_then(|id| inner.users.get(id))
            .ok_or(StoreError::AuthFailure)?;
        if record.password != password {
            return Err(StoreError::AuthFailure);
        }
        Ok(record.account.clone())
    }

    async fn contact_groups(&self, user_id: u32) -> StoreResult<Vec<ContactGroup>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        inner
            .users
            .get(&user_id)
            .map(|u| u.groups.clone())
            .ok_or_else(|| StoreError::NoSuchUser(user_id.to_string()))
    }

    async fn contacts(&self, user_id: u32) -> StoreResult<Vec<Contact>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        inner
            .users
            .get(&user_id)
            .map(|u| u.contacts.clone())
            .ok_or_else(|| StoreError::NoSuchUser(user_id.to_string()))
    }

    async fn set_status(&self, user_id: u32, status: u32) -> StoreResult<()> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let record = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NoSuchUser(user_id.to_string()))?;
        record.status = status;
        record.profile.status = status;
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, limit: usize) -> StoreResult<Vec<UserProfile>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut ids: Vec<&u32> = inner.users.keys().collect();
        ids.sort_unstable();
        Ok(ids
            .into_iter()
            .filter_map(|id| inner.users.get(id))
            .filter(|u| profile_matches(&u.profile, query))
            .take(limit)
            .map(|u| u.profile.clone())
            .collect())
    }

    async fn add_contact(&self, user_id: u32, contact: NewContact) -> StoreResult<u32> {
        self.check_available()?;
        let mut inner = self.inner.write().await;

        if contact.flags & CONTACT_FLAG_GROUP != 0 {
            let record = inner
                .users
                .get_mut(&user_id)
                .ok_or_else(|| StoreError::NoSuchUser(user_id.to_string()))?;
            if record.groups.iter().any(|g| g.name == contact.nickname) {
                return Err(StoreError::AlreadyExists(contact.nickname));
            }
            let id = record.groups.len() as u32;
            record.groups.push(ContactGroup {
                id,
                flags: 0,
                name: contact.nickname,
            });
            return Ok(id);
        }

        if !inner.by_login.contains_key(&contact.login.to_lowercase()) {
            return Err(StoreError::NoSuchUser(contact.login));
        }
        inner.next_contact_id += 1;
        let id = inner.next_contact_id;

        let record = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NoSuchUser(user_id.to_string()))?;
        if !record.groups.iter().any(|g| g.id == contact.group_id) {
            return Err(StoreError::Invalid(format!(
                "unknown group {}",
                contact.group_id
            )));
        }
        if record
            .contacts
            .iter()
            .any(|c| c.login.eq_ignore_ascii_case(&contact.login))
        {
            return Err(StoreError::AlreadyExists(contact.login));
        }
        let nickname = if contact.nickname.is_empty() {
            contact.login.clone()
        } else {
            contact.nickname
        };
        record.contacts.push(Contact {
            id,
            group_id: contact.group_id,
            flags: contact.flags,
            login: contact.login,
            nickname,
            server_flags: 0,
            phone: String::new(),
        });
        Ok(id)
    }
}
