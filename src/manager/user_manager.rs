use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use super::{count_referencing, exists, User, UserType, WriteTx};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_type: Option<UserType>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.user_type.is_none()
    }
}

#[derive(Clone)]
pub struct UserManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> UserManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

fn email_taken(email: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |err| match Error::from(err) {
        Error::Conflict(_) => Error::Conflict(format!("email {email} is already registered")),
        other => other,
    }
}

impl UserManager<'_> {
    pub async fn list(&self) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM User ORDER BY id")
            .fetch_all(self.pool)
            .await?)
    }

    pub async fn get(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM User WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| Error::not_found("user", id))
    }

    pub async fn by_ids(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM User WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        Ok(builder.build_query_as::<User>().fetch_all(self.pool).await?)
    }

    pub async fn create(&self, user: &NewUser) -> Result<User> {
        let created = sqlx::query_as::<_, User>(
            "INSERT INTO User(email, first_name, last_name, user_type) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.user_type)
        .fetch_one(self.pool)
        .await
        .map_err(email_taken(&user.email))?;

        info!("created user {} <{}>", created.id, created.email);
        Ok(created)
    }

    /// Inserts the user, or updates the names and type of the user already
    /// registered under the same email. The flag is `true` when a row was created.
    pub async fn upsert(&self, user: &NewUser) -> Result<(User, bool)> {
        let mut tx = WriteTx::begin(self.pool).await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM User WHERE email = ?")
            .bind(&user.email)
            .fetch_optional(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, User>(
            "INSERT INTO User(email, first_name, last_name, user_type) VALUES (?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                user_type = excluded.user_type
             RETURNING *",
        )
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.user_type)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let created = existing.is_none();
        info!(
            "upserted user {} <{}> ({})",
            row.id,
            row.email,
            if created { "created" } else { "updated" }
        );
        Ok((row, created))
    }

    pub async fn update(&self, id: i64, patch: UserPatch) -> Result<User> {
        if patch.is_empty() {
            return self.get(id).await;
        }

        let email = patch.email.clone().unwrap_or_default();
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE User SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(email) = patch.email {
                fields.push("email = ").push_bind_unseparated(email);
            }
            if let Some(first_name) = patch.first_name {
                fields.push("first_name = ").push_bind_unseparated(first_name);
            }
            if let Some(last_name) = patch.last_name {
                fields.push("last_name = ").push_bind_unseparated(last_name);
            }
            if let Some(user_type) = patch.user_type {
                fields.push("user_type = ").push_bind_unseparated(user_type);
            }
        }
        builder.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let updated = builder
            .build_query_as::<User>()
            .fetch_optional(self.pool)
            .await
            .map_err(email_taken(&email))?
            .ok_or_else(|| Error::not_found("user", id))?;

        info!("updated user {id}");
        Ok(updated)
    }

    /// Refuses while any feedback is authored by the user.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = WriteTx::begin(self.pool).await?;

        if !exists(&mut *tx, "User", id).await? {
            return Err(Error::not_found("user", id));
        }

        let authored = count_referencing(&mut *tx, "Feedback", "user_id", id).await?;
        if authored > 0 {
            return Err(Error::Conflict(format!(
                "user {id} still has {authored} feedback entries"
            )));
        }

        sqlx::query("DELETE FROM User WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("deleted user {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            user_type: UserType::Student,
        }
    }

    #[sqlx::test]
    async fn ok_create_and_get_user(pool: sqlx::SqlitePool) {
        let manager = UserManager::new(&pool);
        let created = manager.create(&new_user("a@b.com")).await.unwrap();

        assert_eq!(manager.get(created.id).await.unwrap(), created);
        assert_eq!(created.user_type, UserType::Student);
    }

    #[sqlx::test(fixtures("users"))]
    async fn duplicate_email_is_a_conflict(pool: sqlx::SqlitePool) {
        let err = UserManager::new(&pool)
            .create(&new_user("test123@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
    }

    #[sqlx::test(fixtures("users"))]
    async fn empty_patch_returns_current_row(pool: sqlx::SqlitePool) {
        let manager = UserManager::new(&pool);
        let before = manager.get(1).await.unwrap();
        let after = manager.update(1, UserPatch::default()).await.unwrap();

        assert_eq!(before, after);
    }

    #[sqlx::test(fixtures("users"))]
    async fn patch_only_touches_given_fields(pool: sqlx::SqlitePool) {
        let updated = UserManager::new(&pool)
            .update(
                1,
                UserPatch {
                    last_name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.last_name, "Renamed");
        assert_eq!(updated.email, "test123@example.com");
    }

    #[sqlx::test]
    async fn update_missing_user_is_not_found(pool: sqlx::SqlitePool) {
        let err = UserManager::new(&pool)
            .update(
                42,
                UserPatch {
                    first_name: Some("Nobody".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
    }

    #[sqlx::test(fixtures("users"))]
    async fn upsert_reports_created_or_updated(pool: sqlx::SqlitePool) {
        let manager = UserManager::new(&pool);

        let (fresh, created) = manager.upsert(&new_user("new@example.com")).await.unwrap();
        assert!(created);

        let mut changed = new_user("new@example.com");
        changed.user_type = UserType::Alumni;
        let (again, created) = manager.upsert(&changed).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, fresh.id);
        assert_eq!(again.user_type, UserType::Alumni);
    }

    #[sqlx::test(fixtures("users", "speakers", "chapel_sessions", "feedback"))]
    async fn user_with_feedback_cannot_be_deleted(pool: sqlx::SqlitePool) {
        let manager = UserManager::new(&pool);

        assert!(matches!(
            manager.delete(1).await.unwrap_err(),
            Error::Conflict(_)
        ));
        assert!(manager.get(1).await.is_ok());
    }

    #[sqlx::test(fixtures("users"))]
    async fn delete_twice_is_not_found(pool: sqlx::SqlitePool) {
        let manager = UserManager::new(&pool);

        manager.delete(2).await.unwrap();
        assert!(matches!(
            manager.delete(2).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
