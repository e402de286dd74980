//! Account registration, sign-in and password changes.

use super::{
    error::{ServiceError, ServiceResult, conflict_on_unique},
    password::{hash_password, verify_password},
    token_service::{IssuedToken, TokenService},
    user_service::{USER_COLUMNS, ensure_username_valid, fetch_active_user},
};
use crate::{
    db,
    models::{
        actor::Actor,
        user::{ChangePasswordRequest, LoginRequest, RegisterRequest, User, UserStatus},
    },
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const PASSWORD_MIN_LEN: usize = 6;
const INVALID_CREDENTIALS: &str = "invalid username or password";

#[derive(Clone)]
pub struct AuthService {
    pub db: Arc<SqlitePool>,
    pub tokens: TokenService,
}

impl AuthService {
    pub fn new(db: Arc<SqlitePool>, tokens: TokenService) -> Self {
        Self { db, tokens }
    }

    /// Create an account and sign it in.
    ///
    /// Only a root caller may create another root account.
    pub async fn register(
        &self,
        caller: Option<&Actor>,
        req: RegisterRequest,
    ) -> ServiceResult<(User, IssuedToken)> {
        ensure_username_valid(&req.username)?;
        ensure_password_valid(&req.password)?;
        if req.is_root && !caller.is_some_and(|actor| actor.is_root) {
            return Err(ServiceError::Denied(
                "permission denied: only root may create root users".into(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: req.username,
            password_hash: hash_password(&req.password)?,
            is_root: req.is_root,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, is_root, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.is_root)
        .bind(user.status)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.db)
        .await
        .map_err(|err| {
            conflict_on_unique(err, || format!("username `{}` is taken", user.username))
        })?;

        let token = self.tokens.issue(&user)?;
        info!("registered user {} ({})", user.username, user.id);
        Ok((user, token))
    }

    /// Exchange credentials for a session token.
    ///
    /// Unknown users, wrong passwords and inactive accounts all fail the same
    /// way.
    pub async fn login(&self, req: LoginRequest) -> ServiceResult<(User, IssuedToken)> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = ? AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(&req.username)
        .fetch_optional(&*self.db)
        .await?
        .filter(|user| user.is_active() && verify_password(&req.password, &user.password_hash))
        .ok_or_else(|| ServiceError::Unauthenticated(INVALID_CREDENTIALS.into()))?;

        let token = self.tokens.issue(&user)?;
        info!("user {} signed in", user.username);
        Ok((user, token))
    }

    pub async fn change_password(&self, actor: &Actor, req: ChangePasswordRequest) -> ServiceResult<()> {
        ensure_password_valid(&req.new_password)?;

        let mut tx = db::begin_write(&self.db).await?;
        let user = fetch_active_user(&mut tx, actor.user_id).await?;
        if !verify_password(&req.current_password, &user.password_hash) {
            return Err(ServiceError::Unauthenticated(
                "current password is incorrect".into(),
            ));
        }

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash_password(&req.new_password)?)
            .bind(Utc::now())
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("user {} changed their password", user.username);
        Ok(())
    }
}

fn ensure_password_valid(password: &str) -> ServiceResult<()> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ServiceError::InvalidInput(
            "password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;
    use chrono::Duration;

    async fn service() -> AuthService {
        AuthService::new(
            memory_pool().await,
            TokenService::new("test-secret", Duration::hours(1)),
        )
    }

    fn register_req(username: &str, password: &str, is_root: bool) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            password: password.into(),
            is_root,
        }
    }

    fn login_req(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = service().await;
        let (user, token) = auth
            .register(None, register_req("alice", "hunter22", false))
            .await
            .unwrap();
        assert!(!user.is_root);
        let claims = auth.tokens.verify(&token.token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);

        let (signed_in, _) = auth.login(login_req("alice", "hunter22")).await.unwrap();
        assert_eq!(signed_in.id, user.id);

        let wrong_password = auth.login(login_req("alice", "nope-nope")).await.unwrap_err();
        let unknown_user = auth.login(login_req("nobody", "hunter22")).await.unwrap_err();
        assert!(matches!(wrong_password, ServiceError::Unauthenticated(_)));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn registration_rules() {
        let auth = service().await;
        assert!(matches!(
            auth.register(None, register_req("al", "hunter22", false)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.register(None, register_req("alice", "short", false)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.register(None, register_req("admin", "hunter22", true)).await,
            Err(ServiceError::Denied(_))
        ));

        let (alice, _) = auth
            .register(None, register_req("alice", "hunter22", false))
            .await
            .unwrap();
        assert!(matches!(
            auth.register(None, register_req("alice", "hunter22", false)).await,
            Err(ServiceError::Conflict(_))
        ));

        let alice = Actor::new(alice.id, "alice", false);
        assert!(matches!(
            auth.register(Some(&alice), register_req("admin", "hunter22", true))
                .await,
            Err(ServiceError::Denied(_))
        ));

        let root = Actor::new(Uuid::new_v4(), "root", true);
        let (admin, _) = auth
            .register(Some(&root), register_req("admin", "hunter22", true))
            .await
            .unwrap();
        assert!(admin.is_root);
    }

    #[tokio::test]
    async fn inactive_users_cannot_sign_in() {
        let auth = service().await;
        let (user, _) = auth
            .register(None, register_req("alice", "hunter22", false))
            .await
            .unwrap();
        sqlx::query("UPDATE users SET status = 'inactive' WHERE id = ?")
            .bind(user.id)
            .execute(&*auth.db)
            .await
            .unwrap();

        assert!(matches!(
            auth.login(login_req("alice", "hunter22")).await,
            Err(ServiceError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn change_password_requires_the_current_one() {
        let auth = service().await;
        let (user, _) = auth
            .register(None, register_req("alice", "hunter22", false))
            .await
            .unwrap();
        let actor = Actor::new(user.id, "alice", false);

        let bad = ChangePasswordRequest {
            current_password: "wrong-one".into(),
            new_password: "correct-horse".into(),
        };
        assert!(matches!(
            auth.change_password(&actor, bad).await,
            Err(ServiceError::Unauthenticated(_))
        ));

        let good = ChangePasswordRequest {
            current_password: "hunter22".into(),
            new_password: "correct-horse".into(),
        };
        auth.change_password(&actor, good).await.unwrap();
        assert!(auth.login(login_req("alice", "hunter22")).await.is_err());
        auth.login(login_req("alice", "correct-horse")).await.unwrap();
    }
}
