use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::query::{Example, Page, PageRequest, Sort};
use super::repo::{RepoResult, UserRepository};
use super::repo_types::{now_micros, truncate_micros, User};
use crate::error::RepoError;

#[derive(Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, User>,
}

/// In-process repository with the same contract as the Postgres one.
/// Rows iterate in id order, which is the default ordering.
#[derive(Default)]
pub struct MemoryUserRepository {
    table: RwLock<Table>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut users: Vec<User>, sort: &Sort) -> Vec<User> {
    if !sort.is_unsorted() {
        users.sort_by(|a, b| sort.compare(a, b));
    }
    users
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_all(&self, sort: &Sort) -> RepoResult<Vec<User>> {
        let table = self.table.read().await;
        Ok(sorted(table.rows.values().cloned().collect(), sort))
    }

    async fn find_all_by_id(&self, ids: &[i64]) -> RepoResult<Vec<User>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|u| u.id.is_some_and(|id| ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    #[instrument(skip(self, user), fields(id = ?user.id))]
    async fn save(&self, mut user: User) -> RepoResult<User> {
        user.validate()?;
        let now = now_micros();
        let mut table = self.table.write().await;

        match user.id {
            None => {
                table.last_id += 1;
                let id = table.last_id;
                user.id = Some(id);
                user.created_at = Some(user.created_at.map_or(now, truncate_micros));
                user.updated_at = Some(now);
                table.rows.insert(id, user.clone());
                info!(id, "user inserted");
            }
            Some(id) => {
                let existing = table.rows.get_mut(&id).ok_or(RepoError::NotFound { id })?;
                user.created_at = user.created_at.map(truncate_micros).or(existing.created_at);
                user.updated_at = Some(now);
                *existing = user.clone();
                info!(id, "user updated");
            }
        }
        Ok(user)
    }

    async fn count(&self) -> RepoResult<u64> {
        Ok(self.table.read().await.rows.len() as u64)
    }

    async fn exists_by_id(&self, id: i64) -> RepoResult<bool> {
        Ok(self.table.read().await.rows.contains_key(&id))
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> RepoResult<()> {
        let mut table = self.table.write().await;
        if table.rows.remove(&id).is_none() {
            return Err(RepoError::NotFound { id });
        }
        info!(id, "user deleted");
        Ok(())
    }

    async fn delete_all(&self) -> RepoResult<u64> {
        let mut table = self.table.write().await;
        let removed = table.rows.len() as u64;
        table.rows.clear();
        Ok(removed)
    }

    #[instrument(skip(self, users), fields(count = users.len()))]
    async fn delete_all_of(&self, users: &[User]) -> RepoResult<u64> {
        let mut table = self.table.write().await;
        let mut ids = HashSet::with_capacity(users.len());
        for user in users {
            let id = user
                .id
                .ok_or_else(|| RepoError::validation("cannot delete a user without an id"))?;
            // a repeated id is already gone by its second delete
            if !table.rows.contains_key(&id) || !ids.insert(id) {
                return Err(RepoError::NotFound { id });
            }
        }
        for id in &ids {
            table.rows.remove(id);
        }
        Ok(ids.len() as u64)
    }

    async fn delete_all_by_id_in_batch(&self, ids: &[i64]) -> RepoResult<u64> {
        let mut table = self.table.write().await;
        let removed = ids
            .iter()
            .filter(|id| table.rows.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn find_by_name(&self, name: &str) -> RepoResult<Vec<User>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|u| u.name == name)
            .cloned()
            .collect())
    }

    async fn find_top_by_name(&self, name: &str, limit: u32) -> RepoResult<Vec<User>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|u| u.name == name)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let table = self.table.read().await;
        Ok(table.rows.values().find(|u| u.email == email).cloned())
    }

    #[instrument(skip(self))]
    async fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<User>> {
        let all = self.find_all(request.sort()).await?;
        let total = all.len() as u64;
        let content: Vec<User> = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.size() as usize)
            .collect();
        debug!(total, returned = content.len(), "find_all_paged");
        Ok(Page::new(content, request, total))
    }

    async fn find_all_by_example(&self, example: &Example) -> RepoResult<Vec<User>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|u| example.matches(u))
            .cloned()
            .collect())
    }

    async fn count_by_example(&self, example: &Example) -> RepoResult<u64> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|u| example.matches(u)).count() as u64)
    }
}
