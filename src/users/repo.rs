use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use super::query::{Example, Page, PageRequest, Predicate, Sort, StringMatcher};
use super::repo_types::{now_micros, User};
use crate::error::RepoError;

pub type RepoResult<T> = Result<T, RepoError>;

const SELECT_USERS: &str = "SELECT id, name, email, created_at, updated_at FROM users";

/// Data access over the `users` table.
///
/// Lookups that may hit several rows without an explicit [`Sort`] return
/// them in ascending id order, so first-N / top-N and email lookups are
/// deterministic even though email carries no uniqueness constraint.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_all(&self, sort: &Sort) -> RepoResult<Vec<User>>;

    /// Ids without a matching row are skipped.
    async fn find_all_by_id(&self, ids: &[i64]) -> RepoResult<Vec<User>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<User>>;

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        self.find_by_id(id).await
    }

    /// Inserts when `user.id` is `None`, otherwise updates that row.
    async fn save(&self, user: User) -> RepoResult<User>;

    async fn save_all(&self, users: Vec<User>) -> RepoResult<Vec<User>> {
        let mut saved = Vec::with_capacity(users.len());
        for user in users {
            saved.push(self.save(user).await?);
        }
        Ok(saved)
    }

    async fn count(&self) -> RepoResult<u64>;

    async fn exists_by_id(&self, id: i64) -> RepoResult<bool>;

    async fn delete(&self, user: &User) -> RepoResult<()> {
        let id = user
            .id
            .ok_or_else(|| RepoError::validation("cannot delete a user without an id"))?;
        self.delete_by_id(id).await
    }

    async fn delete_by_id(&self, id: i64) -> RepoResult<()>;

    async fn delete_all(&self) -> RepoResult<u64>;

    /// Removes all of `users` or, if any is missing, none of them.
    async fn delete_all_of(&self, users: &[User]) -> RepoResult<u64>;

    /// One batch delete with no existence check; missing ids are ignored.
    async fn delete_all_by_id_in_batch(&self, ids: &[i64]) -> RepoResult<u64>;

    async fn find_by_name(&self, name: &str) -> RepoResult<Vec<User>>;

    async fn find_top_by_name(&self, name: &str, limit: u32) -> RepoResult<Vec<User>>;

    async fn find_first1_by_name(&self, name: &str) -> RepoResult<Vec<User>> {
        self.find_top_by_name(name, 1).await
    }

    async fn find_top2_by_name(&self, name: &str) -> RepoResult<Vec<User>> {
        self.find_top_by_name(name, 2).await
    }

    /// Lowest-id user with exactly this email.
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_by_email(email).await
    }

    async fn read_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_by_email(email).await
    }

    async fn query_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_by_email(email).await
    }

    async fn search_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_by_email(email).await
    }

    async fn stream_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_by_email(email).await
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_by_email(email).await
    }

    async fn find_something_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_by_email(email).await
    }

    async fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<User>>;

    async fn find_all_by_example(&self, example: &Example) -> RepoResult<Vec<User>>;

    async fn count_by_example(&self, example: &Example) -> RepoResult<u64>;
}

/// Postgres-backed repository.
#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_order_by(qb: &mut QueryBuilder<'_, Postgres>, sort: &Sort) {
    qb.push(" ORDER BY ");
    let mut sep = qb.separated(", ");
    for order in sort.with_tiebreak() {
        sep.push(format!("{} {}", order.field.column(), order.direction.keyword()));
    }
}

/// `head` followed by a WHERE clause for every active predicate of `example`.
pub(crate) fn example_query(head: &str, example: &Example) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(head);
    for (i, predicate) in example.predicates().into_iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match predicate {
            Predicate::Id(id) => {
                qb.push("id = ").push_bind(id);
            }
            Predicate::Text {
                field,
                value,
                matcher: StringMatcher::Exact,
                ignore_case,
            } => {
                if ignore_case {
                    qb.push(format!("LOWER({}) = LOWER(", field.column()))
                        .push_bind(value)
                        .push(")");
                } else {
                    qb.push(format!("{} = ", field.column())).push_bind(value);
                }
            }
            Predicate::Text {
                field,
                value,
                matcher,
                ignore_case,
            } => {
                let op = if ignore_case { "ILIKE" } else { "LIKE" };
                qb.push(format!("{} {} ", field.column(), op))
                    .push_bind(matcher.like_pattern(&value))
                    .push(" ESCAPE '\\'");
            }
            Predicate::Timestamp { field, value } => {
                qb.push(format!("{} = ", field.column())).push_bind(value);
            }
        }
    }
    qb
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn find_all(&self, sort: &Sort) -> RepoResult<Vec<User>> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_USERS);
        push_order_by(&mut qb, sort);
        let users = qb.build_query_as::<User>().fetch_all(&self.db).await?;
        debug!(count = users.len(), "find_all");
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn find_all_by_id(&self, ids: &[i64]) -> RepoResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM users
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self, user), fields(id = ?user.id))]
    async fn save(&self, user: User) -> RepoResult<User> {
        user.validate()?;
        let now = now_micros();

        let Some(id) = user.id else {
            let saved = sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (name, email, created_at, updated_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, name, email, created_at, updated_at
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.created_at.unwrap_or(now))
            .bind(now)
            .fetch_one(&self.db)
            .await?;
            info!(id = ?saved.id, "user inserted");
            return Ok(saved);
        };

        let saved = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = $2,
                   email = $3,
                   created_at = COALESCE($4, created_at),
                   updated_at = $5
             WHERE id = $1
            RETURNING id, name, email, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.created_at)
        .bind(now)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepoError::NotFound { id })?;
        info!(id, "user updated");
        Ok(saved)
    }

    async fn count(&self) -> RepoResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(n as u64)
    }

    async fn exists_by_id(&self, id: i64) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: i64) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound { id });
        }
        info!(id, "user deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_all(&self) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM users").execute(&self.db).await?;
        info!(removed = res.rows_affected(), "all users deleted");
        Ok(res.rows_affected())
    }

    #[instrument(skip(self, users), fields(count = users.len()))]
    async fn delete_all_of(&self, users: &[User]) -> RepoResult<u64> {
        let mut tx = self.db.begin().await?;
        let mut removed = 0;
        for user in users {
            let id = user
                .id
                .ok_or_else(|| RepoError::validation("cannot delete a user without an id"))?;
            let res = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound { id });
            }
            removed += res.rows_affected();
        }
        tx.commit().await?;
        info!(removed, "users deleted");
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn delete_all_by_id_in_batch(&self, ids: &[i64]) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.db)
            .await?;
        info!(removed = res.rows_affected(), "batch delete");
        Ok(res.rows_affected())
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> RepoResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM users
            WHERE name = $1
            ORDER BY id ASC
            "#,
        )
        .bind(name)
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn find_top_by_name(&self, name: &str, limit: u32) -> RepoResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM users
            WHERE name = $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(name)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, created_at, updated_at
            FROM users
            WHERE email = $1
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<User>> {
        let total = self.count().await?;

        let mut qb = QueryBuilder::<Postgres>::new(SELECT_USERS);
        push_order_by(&mut qb, request.sort());
        qb.push(" LIMIT ")
            .push_bind(i64::from(request.size()))
            .push(" OFFSET ")
            .push_bind(request.offset() as i64);
        let content = qb.build_query_as::<User>().fetch_all(&self.db).await?;

        debug!(total, returned = content.len(), "find_all_paged");
        Ok(Page::new(content, request, total))
    }

    #[instrument(skip(self))]
    async fn find_all_by_example(&self, example: &Example) -> RepoResult<Vec<User>> {
        let mut qb = example_query(SELECT_USERS, example);
        qb.push(" ORDER BY id ASC");
        let users = qb.build_query_as::<User>().fetch_all(&self.db).await?;
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn count_by_example(&self, example: &Example) -> RepoResult<u64> {
        let mut qb = example_query("SELECT COUNT(*) FROM users", example);
        let n: i64 = qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::query::{Direction, ExampleMatcher, UserField};

    #[test]
    fn order_by_appends_id_tiebreak() {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_USERS);
        push_order_by(&mut qb, &Sort::by(Direction::Desc, UserField::Name));
        assert_eq!(
            qb.sql(),
            "SELECT id, name, email, created_at, updated_at FROM users ORDER BY name DESC, id ASC"
        );
    }

    #[test]
    fn unsorted_orders_by_id() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        push_order_by(&mut qb, &Sort::unsorted());
        assert_eq!(qb.sql(), "SELECT 1 ORDER BY id ASC");
    }

    #[test]
    fn example_with_ignored_name_and_email_suffix() {
        let matcher = ExampleMatcher::matching()
            .with_ignore_paths([UserField::Name])
            .with_matcher(UserField::Email, StringMatcher::EndsWith);
        let example = Example::of(User::new("ma", "email.com"), matcher);

        let qb = example_query(SELECT_USERS, &example);
        assert_eq!(
            qb.sql(),
            "SELECT id, name, email, created_at, updated_at FROM users WHERE email LIKE $1 ESCAPE '\\'"
        );
    }

    #[test]
    fn example_exact_fields_are_anded() {
        let example = Example::of(
            User::new("jack", "jack@email.com").with_id(4),
            ExampleMatcher::matching().with_ignore_case(),
        );
        let qb = example_query("SELECT COUNT(*) FROM users", &example);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM users WHERE id = $1 AND LOWER(name) = LOWER($2) AND LOWER(email) = LOWER($3)"
        );
    }

    #[test]
    fn example_contains_ignore_case_uses_ilike() {
        let example = Example::of(
            User::new("art", ""),
            ExampleMatcher::matching()
                .with_ignore_paths([UserField::Email])
                .with_matcher(UserField::Name, StringMatcher::Contains)
                .with_ignore_case(),
        );
        let qb = example_query("SELECT 1 FROM users", &example);
        assert_eq!(qb.sql(), "SELECT 1 FROM users WHERE name ILIKE $1 ESCAPE '\\'");
    }
}
