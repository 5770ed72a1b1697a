use axum::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::StoreError,
    users::repo_types::{NewUser, User, UserScope, UserStats},
};

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a new user; duplicate email, username or google id signal `StoreError::Conflict`.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid, scope: UserScope) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str, scope: UserScope)
        -> Result<Option<User>, StoreError>;

    async fn find_by_username(
        &self,
        username: &str,
        scope: UserScope,
    ) -> Result<Option<User>, StoreError>;

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>, StoreError>;

    /// Persist every mutable column of `user` and bump `updated_at`.
    /// Only admin edits write the whole row; owner flows use the narrow
    /// writes below so they cannot undo a concurrent admin change.
    async fn update(&self, user: &User) -> Result<User, StoreError>;

    /// Write only the owner-editable profile columns of `user`.
    async fn update_profile(&self, user: &User) -> Result<User, StoreError>;

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<User, StoreError>;

    /// Write the columns a google login refreshes: email, google id,
    /// provider, full name and picture.
    async fn link_google(&self, user: &User) -> Result<User, StoreError>;

    /// Newest first.
    async fn list(
        &self,
        scope: UserScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), StoreError>;

    /// Case-insensitive substring match on username, email and full name
    /// over active users, ordered by username.
    async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), StoreError>;

    async fn stats(&self, created_since: OffsetDateTime) -> Result<UserStats, StoreError>;
}

const USER_COLUMNS: &str = "id, email, username, password_hash, full_name, phone, role, \
     bank_account_number, bank_code, google_id, auth_provider, profile_picture, is_active, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(
        &self,
        column: &str,
        value: &str,
        scope: UserScope,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1 AND {}",
            scope.predicate()
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('%');
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, username, password_hash, full_name, phone, role,
                               google_id, auth_provider, profile_picture)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(&user.phone)
            .bind(user.role)
            .bind(&user.google_id)
            .bind(user.auth_provider)
            .bind(&user.profile_picture)
            .fetch_one(&self.db)
            .await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid, scope: UserScope) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND {}",
            scope.predicate()
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(
        &self,
        email: &str,
        scope: UserScope,
    ) -> Result<Option<User>, StoreError> {
        self.find_one("email", email, scope).await
    }

    async fn find_by_username(
        &self,
        username: &str,
        scope: UserScope,
    ) -> Result<Option<User>, StoreError> {
        self.find_one("username", username, scope).await
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>, StoreError> {
        self.find_one("google_id", google_id, UserScope::Any).await
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = $2, password_hash = $3, full_name = $4, phone = $5, role = $6,
                   bank_account_number = $7, bank_code = $8, google_id = $9,
                   auth_provider = $10, profile_picture = $11, is_active = $12,
                   updated_at = now()
             WHERE id = $1
         RETURNING {USER_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(&user.phone)
            .bind(user.role)
            .bind(&user.bank_account_number)
            .bind(&user.bank_code)
            .bind(&user.google_id)
            .bind(user.auth_provider)
            .bind(&user.profile_picture)
            .bind(user.is_active)
            .fetch_optional(&self.db)
            .await?;
        updated.ok_or(StoreError::NotFound)
    }

    async fn update_profile(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET full_name = $2, phone = $3, bank_account_number = $4, bank_code = $5,
                   updated_at = now()
             WHERE id = $1
         RETURNING {USER_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.full_name)
            .bind(&user.phone)
            .bind(&user.bank_account_number)
            .bind(&user.bank_code)
            .fetch_optional(&self.db)
            .await?;
        updated.ok_or(StoreError::NotFound)
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<User, StoreError> {
        let sql = format!(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(password_hash)
            .fetch_optional(&self.db)
            .await?;
        updated.ok_or(StoreError::NotFound)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<User, StoreError> {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(&self.db)
            .await?;
        updated.ok_or(StoreError::NotFound)
    }

    async fn link_google(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = $2, google_id = $3, auth_provider = $4, full_name = $5,
                   profile_picture = $6, updated_at = now()
             WHERE id = $1
         RETURNING {USER_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.google_id)
            .bind(user.auth_provider)
            .bind(&user.full_name)
            .bind(&user.profile_picture)
            .fetch_optional(&self.db)
            .await?;
        updated.ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        scope: UserScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            scope.predicate()
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {}", scope.predicate());
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&self.db).await?;
        Ok((rows, total))
    }

    async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), StoreError> {
        let pattern = escape_like(query);
        let filter = format!(
            "{} AND (username ILIKE $1 OR email ILIKE $1 OR full_name ILIKE $1)",
            UserScope::Active.predicate()
        );
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {filter} ORDER BY username ASC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {filter}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&pattern)
            .fetch_one(&self.db)
            .await?;
        Ok((rows, total))
    }

    async fn stats(&self, created_since: OffsetDateTime) -> Result<UserStats, StoreError> {
        let (total, active, recent): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE is_active),
                   COUNT(*) FILTER (WHERE created_at >= $1)
              FROM users
            "#,
        )
        .bind(created_since)
        .fetch_one(&self.db)
        .await?;
        Ok(UserStats {
            total,
            active,
            inactive: total - active,
            recent,
        })
    }
}
