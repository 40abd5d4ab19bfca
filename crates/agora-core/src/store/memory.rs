//! In-memory storage backend
//!
//! Used for development and tests. Each collection sits behind a single
//! `RwLock`, so every check-and-mutate primitive runs under one write guard.

use super::{AccountRepository, NewAccount, SessionRecord, SessionRepository};
use crate::{fold_display_name, Account, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct AccountTable {
    by_id: HashMap<Uuid, Account>,
    email_index: HashMap<String, Uuid>,
    /// Case-folded display name -> account id
    name_index: HashMap<String, Uuid>,
}

impl AccountTable {
    fn name_owner(&self, display_name: &str) -> Option<Uuid> {
        self.name_index.get(&fold_display_name(display_name)).copied()
    }
}

/// In-memory account and session store
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<AccountTable>,
    sessions: RwLock<HashMap<Uuid, HashMap<String, SessionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        let mut table = self.accounts.write().await;

        if let Some(name) = &account.display_name {
            if table.name_owner(name).is_some() {
                return Err(StoreError::DisplayNameTaken);
            }
        }
        if table.email_index.contains_key(&account.email) {
            return Err(StoreError::EmailTaken);
        }

        let now = Utc::now();
        let created = Account {
            id: Uuid::new_v4(),
            email: account.email,
            display_name: account.display_name,
            password_hash: account.password_hash,
            avatar_url: account.avatar_url,
            created_at: now,
            updated_at: now,
        };

        table.email_index.insert(created.email.clone(), created.id);
        if let Some(name) = &created.display_name {
            table.name_index.insert(fold_display_name(name), created.id);
        }
        table.by_id.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.by_id.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let table = self.accounts.read().await;
        Ok(table
            .email_index
            .get(email)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>> {
        let table = self.accounts.read().await;
        Ok(table
            .name_owner(display_name)
            .and_then(|id| table.by_id.get(&id))
            .cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Account> {
        let mut table = self.accounts.write().await;

        if !table.by_id.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }

        if let Some(name) = display_name {
            match table.name_owner(name) {
                Some(owner) if owner != id => return Err(StoreError::DisplayNameTaken),
                _ => {}
            }
        }

        let previous_name = table.by_id.get(&id).and_then(|a| a.display_name.clone());
        if let Some(name) = display_name {
            if let Some(previous) = previous_name {
                table.name_index.remove(&fold_display_name(&previous));
            }
            table.name_index.insert(fold_display_name(name), id);
        }

        let account = table.by_id.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(name) = display_name {
            account.display_name = Some(name.to_string());
        }
        if let Some(url) = avatar_url {
            account.avatar_url = Some(url.to_string());
        }
        account.updated_at = Utc::now();

        Ok(account.clone())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn add(&self, record: SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .await
            .entry(record.account_id)
            .or_default()
            .insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn contains(&self, account_id: Uuid, token_hash: &str) -> Result<bool> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&account_id)
            .is_some_and(|set| set.contains_key(token_hash)))
    }

    async fn remove(&self, account_id: Uuid, token_hash: &str) -> Result<bool> {
        Ok(self
            .sessions
            .write()
            .await
            .get_mut(&account_id)
            .and_then(|set| set.remove(token_hash))
            .is_some())
    }

    async fn rotate(
        &self,
        account_id: Uuid,
        old_hash: &str,
        replacement: SessionRecord,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let Some(set) = sessions.get_mut(&account_id) else {
            return Ok(false);
        };
        if set.remove(old_hash).is_none() {
            return Ok(false);
        }
        set.insert(replacement.token_hash.clone(), replacement);
        Ok(true)
    }

    async fn revoke_all(&self, account_id: Uuid) -> Result<u64> {
        Ok(self
            .sessions
            .write()
            .await
            .remove(&account_id)
            .map(|set| set.len() as u64)
            .unwrap_or(0))
    }

    async fn list(&self, account_id: Uuid) -> Result<Vec<SessionRecord>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&account_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let mut purged = 0u64;
        for set in sessions.values_mut() {
            let before = set.len();
            set.retain(|_, record| !record.is_expired(now));
            purged += (before - set.len()) as u64;
        }
        sessions.retain(|_, set| !set.is_empty());
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_account(email: &str, name: Option<&str>) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            display_name: name.map(str::to_string),
            password_hash: "hash".to_string(),
            avatar_url: None,
        }
    }

    fn session(account_id: Uuid, hash: &str) -> SessionRecord {
        SessionRecord::new(account_id, hash.to_string(), Utc::now() + Duration::days(1))
    }

    #[tokio::test]
    async fn test_create_and_find_account() {
        let store = MemoryStore::new();
        let created = store
            .create_account(new_account("alice@x.com", Some("Alice")))
            .await
            .unwrap();

        let by_email = store.find_by_email("alice@x.com").await.unwrap().unwrap();
        let by_name = store.find_by_display_name("aLiCe").await.unwrap().unwrap();
        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(by_email.id, created.id);
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_id.display_name.as_deref(), Some("Alice"));
        assert!(store.find_by_email("ALICE@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_conflict_takes_precedence_over_email() {
        let store = MemoryStore::new();
        store
            .create_account(new_account("alice@x.com", Some("alice")))
            .await
            .unwrap();

        let both = store
            .create_account(new_account("alice@x.com", Some("ALICE")))
            .await;
        assert!(matches!(both, Err(StoreError::DisplayNameTaken)));

        let email_only = store
            .create_account(new_account("alice@x.com", Some("Bob")))
            .await;
        assert!(matches!(email_only, Err(StoreError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_display_name_lookup_is_literal() {
        let store = MemoryStore::new();
        store
            .create_account(new_account("dot@x.com", Some("a.b")))
            .await
            .unwrap();
        store
            .create_account(new_account("pct@x.com", Some("100%")))
            .await
            .unwrap();

        assert!(store.find_by_display_name("axb").await.unwrap().is_none());
        assert!(store.find_by_display_name("a.*").await.unwrap().is_none());
        assert!(store.find_by_display_name("100").await.unwrap().is_none());
        assert!(store.find_by_display_name("A.B").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_profile_moves_name_index() {
        let store = MemoryStore::new();
        let legacy = store
            .create_account(new_account("legacy@x.com", None))
            .await
            .unwrap();
        store
            .create_account(new_account("taken@x.com", Some("Taken")))
            .await
            .unwrap();

        let clash = store.update_profile(legacy.id, Some("taken"), None).await;
        assert!(matches!(clash, Err(StoreError::DisplayNameTaken)));

        let updated = store
            .update_profile(legacy.id, Some("Fresh"), Some("https://cdn/a.png"))
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Fresh"));
        assert_eq!(updated.avatar_url.as_deref(), Some("https://cdn/a.png"));
        assert!(store.find_by_display_name("fresh").await.unwrap().is_some());

        let missing = store.update_profile(Uuid::new_v4(), None, None).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_session_add_remove_is_per_token() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        store.add(session(account, "a")).await.unwrap();
        store.add(session(account, "b")).await.unwrap();

        assert!(store.remove(account, "a").await.unwrap());
        assert!(!store.remove(account, "a").await.unwrap());
        assert!(!store.contains(account, "a").await.unwrap());
        assert!(store.contains(account, "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_rotate_succeeds_once() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        store.add(session(account, "old")).await.unwrap();

        assert!(store.rotate(account, "old", session(account, "new")).await.unwrap());
        assert!(!store.rotate(account, "old", session(account, "newer")).await.unwrap());

        let hashes: Vec<String> = store
            .list(account)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.token_hash)
            .collect();
        assert_eq!(hashes, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_rotate_has_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let account = Uuid::new_v4();
        store.add(session(account, "shared")).await.unwrap();

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .rotate(account, "shared", session(account, &format!("next-{i}")))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let results = futures::future::join_all(attempts).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

        assert_eq!(winners, 1);
        assert_eq!(store.list(account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_all_only_touches_one_account() {
        let store = MemoryStore::new();
        let victim = Uuid::new_v4();
        let bystander = Uuid::new_v4();
        store.add(session(victim, "v1")).await.unwrap();
        store.add(session(victim, "v2")).await.unwrap();
        store.add(session(bystander, "b1")).await.unwrap();

        assert_eq!(store.revoke_all(victim).await.unwrap(), 2);
        assert!(store.list(victim).await.unwrap().is_empty());
        assert!(store.contains(bystander, "b1").await.unwrap());
        assert_eq!(store.revoke_all(victim).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        let now = Utc::now();
        store
            .add(SessionRecord::new(account, "stale".into(), now - Duration::seconds(1)))
            .await
            .unwrap();
        store.add(session(account, "live")).await.unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(!store.contains(account, "stale").await.unwrap());
        assert!(store.contains(account, "live").await.unwrap());
    }
}
