use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::{AccessClaims, RefreshClaims},
        dto::{ChangePasswordRequest, LoginRequest, RegisterRequest},
        jwt::{JwtKeys, TokenPair},
        password::{hash_password, verify_password},
        strategy::Credentials,
    },
    error::AppError,
    state::AppState,
    users::repo_types::{NewUser, User, UserScope},
    validation::{
        is_valid_email, is_valid_phone, is_valid_username, normalize_email, Validator,
        MIN_PASSWORD_LEN,
    },
};

fn check_new_password(v: &mut Validator, field: &str, password: &str) {
    v.check(
        password.chars().count() >= MIN_PASSWORD_LEN,
        field,
        "TOO_SHORT",
        "password must be at least 6 characters",
    );
}

/// Create a local account and sign its first token pair. Nothing is issued
/// unless the insert went through.
#[instrument(skip(state, req))]
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<(User, TokenPair), AppError> {
    let email = normalize_email(&req.email);
    let username = req.username.trim().to_string();
    let full_name = req.full_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let phone = req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

    let mut v = Validator::new();
    v.check(is_valid_email(&email), "email", "INVALID_FORMAT", "email is not valid")
        .check(
            is_valid_username(&username),
            "username",
            "INVALID_FORMAT",
            "username must be 3-100 letters, digits or underscores",
        );
    check_new_password(&mut v, "password", &req.password);
    if let Some(name) = &full_name {
        v.check(
            name.chars().count() <= 200,
            "fullName",
            "TOO_LONG",
            "full name must be at most 200 characters",
        );
    }
    if let Some(phone) = &phone {
        v.check(
            is_valid_phone(phone),
            "phone",
            "INVALID_FORMAT",
            "phone must be 7 to 15 digits, optionally prefixed with +",
        );
    }
    v.finish()?;

    let hash = hash_password(&req.password)?;
    let mut new = NewUser::local(email, username, hash);
    new.full_name = full_name;
    new.phone = phone;

    let user = state.users.insert(new).await.map_err(|e| {
        warn!(error = %e, "registration rejected");
        AppError::from(e)
    })?;
    let tokens = JwtKeys::new(&state.config.jwt).issue_pair(&user)?;
    info!(user_id = %user.id, "user registered");
    Ok((user, tokens))
}

#[instrument(skip(state, req))]
pub async fn login(state: &AppState, req: LoginRequest) -> Result<(User, TokenPair), AppError> {
    let identifier = req
        .email
        .filter(|e| !e.trim().is_empty())
        .or(req.username)
        .unwrap_or_default();
    if identifier.trim().is_empty() {
        return Err(AppError::invalid(
            "email",
            "REQUIRED",
            "email or username is required",
        ));
    }
    let user = state
        .auth
        .verify_credentials(&Credentials {
            identifier,
            password: req.password,
        })
        .await?;
    let tokens = JwtKeys::new(&state.config.jwt).issue_pair(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, tokens))
}

/// Rotate: a valid refresh token for an existing, active user buys a new pair.
/// Previously issued tokens stay valid until they expire on their own.
#[instrument(skip_all)]
pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<(User, TokenPair), AppError> {
    let keys = JwtKeys::new(&state.config.jwt);
    let claims: RefreshClaims = keys.verify(refresh_token)?;
    let user = state
        .users
        .find_by_id(claims.user_id, UserScope::Any)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| {
            warn!(user_id = %claims.user_id, "refresh for missing or inactive user");
            AppError::AuthenticationFailed
        })?;
    let tokens = keys.issue_pair(&user)?;
    info!(user_id = %user.id, "tokens rotated");
    Ok((user, tokens))
}

#[instrument(skip(state, user, req), fields(user_id = %user.id))]
pub async fn change_password(
    state: &AppState,
    user: User,
    req: ChangePasswordRequest,
) -> Result<(), AppError> {
    let mut v = Validator::new();
    check_new_password(&mut v, "newPassword", &req.new_password);
    match &req.confirm_password {
        Some(confirm) => v.check(
            *confirm == req.new_password,
            "confirmPassword",
            "MISMATCH",
            "password confirmation does not match",
        ),
        None => v.check(
            false,
            "confirmPassword",
            "REQUIRED",
            "password confirmation is required",
        ),
    };
    v.finish()?;

    let current_ok = match user.password_hash.as_deref() {
        Some(hash) => verify_password(&req.current_password, hash)?,
        None => false,
    };
    if !current_ok {
        warn!("change password with wrong current password");
        return Err(AppError::invalid(
            "currentPassword",
            "INCORRECT",
            "Current password is incorrect",
        ));
    }

    let hash = hash_password(&req.new_password)?;
    state.users.set_password(user.id, &hash).await?;
    info!("password changed");
    Ok(())
}

/// Resolve a bearer access token to its user. The stored active flag decides,
/// not the snapshot in the token.
pub async fn authenticate_access(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims: AccessClaims = JwtKeys::new(&state.config.jwt).verify(token)?;
    let user = state
        .users
        .find_by_id(claims.user_id, UserScope::Any)
        .await?
        .ok_or(AppError::AuthenticationFailed)?;
    if !user.is_active {
        warn!(user_id = %user.id, "token presented for deactivated account");
        return Err(AppError::forbidden("Account is deactivated"));
    }
    Ok(user)
}

/// Like [`authenticate_access`], but an expired access token plus a valid
/// refresh token still gets through. The new pair is returned so the caller
/// can hand it back to the client.
pub async fn authenticate_with_renewal(
    state: &AppState,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Result<(User, Option<TokenPair>), AppError> {
    match authenticate_access(state, access_token).await {
        Ok(user) => Ok((user, None)),
        Err(AppError::TokenExpired) => match refresh_token {
            Some(refresh_token) => {
                let (user, tokens) = refresh(state, refresh_token).await?;
                info!(user_id = %user.id, "expired access token renewed");
                Ok((user, Some(tokens)))
            }
            None => Err(AppError::TokenExpired),
        },
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{fake_state, seed_user};
    use crate::users::repo_types::Role;
    use time::{Duration, OffsetDateTime};

    async fn user_count(state: &AppState) -> i64 {
        state.users.list(UserScope::Any, 100, 0).await.unwrap().1
    }

    fn register_req(email: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            username: username.into(),
            password: "secret1".into(),
            full_name: None,
            phone: None,
        }
    }

    #[tokio::test]
    async fn register_issues_tokens_for_plain_users() {
        let state = fake_state();
        let (user, tokens) = register(&state, register_req("Mai@Example.com", "mai"))
            .await
            .unwrap();
        assert_eq!(user.email, "mai@example.com");
        assert_eq!(user.role, Role::User);
        let me = authenticate_access(&state, &tokens.access_token).await.unwrap();
        assert_eq!(me.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict_without_new_row() {
        let state = fake_state();
        register(&state, register_req("mai@example.com", "mai")).await.unwrap();
        let before = user_count(&state).await;
        let err = register(&state, register_req("MAI@example.com", "mai2"))
            .await
            .unwrap_err();
        match err {
            AppError::Conflict { field, .. } => assert_eq!(field, "email"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(user_count(&state).await, before);
    }

    #[tokio::test]
    async fn register_validates_every_field() {
        let state = fake_state();
        let err = register(
            &state,
            RegisterRequest {
                email: "nope".into(),
                username: "a".into(),
                password: "123".into(),
                full_name: None,
                phone: Some("12".into()),
            },
        )
        .await
        .unwrap_err();
        match err {
            AppError::Validation(errs) => assert_eq!(errs.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_password_on_known_username_is_generic() {
        let state = fake_state();
        seed_user(&state, "mai@example.com", "mai", "secret1").await;
        let err = login(
            &state,
            LoginRequest {
                email: None,
                username: Some("mai".into()),
                password: "wrong!".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::AuthenticationFailed));
        assert_eq!(err.to_string(), "invalid credentials");
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_access_tokens() {
        let state = fake_state();
        let (_, tokens) = register(&state, register_req("mai@example.com", "mai"))
            .await
            .unwrap();
        let (_, rotated) = refresh(&state, &tokens.refresh_token).await.unwrap();
        assert!(authenticate_access(&state, &rotated.access_token).await.is_ok());
        // old access token is not revoked
        assert!(authenticate_access(&state, &tokens.access_token).await.is_ok());

        let err = refresh(&state, &tokens.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));
        let err = authenticate_access(&state, &tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));
    }

    #[tokio::test]
    async fn deactivated_user_loses_access_immediately() {
        let state = fake_state();
        let (user, tokens) = register(&state, register_req("mai@example.com", "mai"))
            .await
            .unwrap();
        crate::users::services::set_active(&state, user.id, false)
            .await
            .unwrap();
        let err = authenticate_access(&state, &tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = refresh(&state, &tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn renewal_only_kicks_in_for_expired_access() {
        let state = fake_state();
        let (user, tokens) = register(&state, register_req("mai@example.com", "mai"))
            .await
            .unwrap();
        let keys = JwtKeys::new(&state.config.jwt);
        let expired = keys
            .sign_at(
                &AccessClaims::from(&user),
                Duration::minutes(15),
                OffsetDateTime::now_utc() - Duration::hours(1),
            )
            .unwrap();

        let (who, renewed) =
            authenticate_with_renewal(&state, &expired, Some(&tokens.refresh_token))
                .await
                .unwrap();
        assert_eq!(who.id, user.id);
        assert!(renewed.is_some());

        let (_, none) =
            authenticate_with_renewal(&state, &tokens.access_token, Some(&tokens.refresh_token))
                .await
                .unwrap();
        assert!(none.is_none());

        let err = authenticate_with_renewal(&state, &expired, None).await.unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));

        let err = authenticate_with_renewal(&state, "garbage", Some(&tokens.refresh_token))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid));
    }

    #[tokio::test]
    async fn change_password_checks_current() {
        let state = fake_state();
        let user = seed_user(&state, "mai@example.com", "mai", "secret1").await;
        let err = change_password(
            &state,
            user.clone(),
            ChangePasswordRequest {
                current_password: "nope".into(),
                new_password: "secret2".into(),
                confirm_password: Some("secret2".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        change_password(
            &state,
            user,
            ChangePasswordRequest {
                current_password: "secret1".into(),
                new_password: "secret2".into(),
                confirm_password: Some("secret2".into()),
            },
        )
        .await
        .unwrap();
        let ok = login(
            &state,
            LoginRequest {
                email: Some("mai@example.com".into()),
                username: None,
                password: "secret2".into(),
            },
        )
        .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn change_password_requires_confirmation() {
        let state = fake_state();
        let user = seed_user(&state, "mai@example.com", "mai", "secret1").await;
        let err = change_password(
            &state,
            user,
            ChangePasswordRequest {
                current_password: "secret1".into(),
                new_password: "secret2".into(),
                confirm_password: None,
            },
        )
        .await
        .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors
            .iter()
            .any(|e| e.field.as_deref() == Some("confirmPassword") && e.code == "REQUIRED"));

        let still_old = login(
            &state,
            LoginRequest {
                email: Some("mai@example.com".into()),
                username: None,
                password: "secret1".into(),
            },
        )
        .await;
        assert!(still_old.is_ok());
    }
}
