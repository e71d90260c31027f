//! Player profiles, created on first self lookup with a username taken from
//! the caller's email.

use std::time::SystemTime;

use tracing::{debug, info};

use crate::{
    dao::{
        game_store::GameStore,
        models::{UserEntity, UsernameEntity},
    },
    dto::validation::{email_local_part, validate_username},
    error::ServiceError,
    services::identity_service::Caller,
    state::{SharedState, game::UserId},
};

/// Suffixes tried after the bare name before giving up on a username.
const MAX_USERNAME_SUFFIX: u32 = 1000;

/// Username candidate for `email`: its local part, when that is a valid username.
pub fn username_from_email(email: &str) -> Option<String> {
    let local = email_local_part(email)?;
    validate_username(local).ok()?;
    Some(local.to_owned())
}

/// Look up `user_id`, creating the profile when the caller is asking about
/// themselves and none exists yet.
pub async fn resolve_user(
    state: &SharedState,
    user_id: &UserId,
    caller: Option<&Caller>,
) -> Result<Option<UserEntity>, ServiceError> {
    let store = state.require_game_store().await?;
    if let Some(user) = store.find_user(user_id.clone()).await? {
        return Ok(Some(user));
    }

    match caller {
        Some(caller) if caller.user_id == *user_id => create_user(&*store, caller).await.map(Some),
        _ => Ok(None),
    }
}

async fn create_user(store: &dyn GameStore, caller: &Caller) -> Result<UserEntity, ServiceError> {
    let username = match caller.email.as_deref().and_then(username_from_email) {
        Some(base) => Some(claim_username(store, &base, &caller.user_id).await?),
        None => None,
    };

    let user = UserEntity {
        user_id: caller.user_id.clone(),
        username,
        email: caller.email.clone(),
        created_at: SystemTime::now(),
    };

    match store.insert_user(user.clone()).await {
        Ok(()) => {
            info!(
                user_id = %user.user_id,
                username = user.username.as_deref().unwrap_or_default(),
                "user created"
            );
            Ok(user)
        }
        Err(err) if err.is_conflict() => {
            debug!(user_id = %caller.user_id, "user created concurrently");
            store
                .find_user(caller.user_id.clone())
                .await?
                .ok_or_else(|| ServiceError::Internal(format!("user `{}` vanished", caller.user_id)))
        }
        Err(err) => Err(err.into()),
    }
}

/// Reserve `base`, then `base1`, `base2`, ... for `user_id`.
///
/// A name already reserved by `user_id` itself is reused.
async fn claim_username(
    store: &dyn GameStore,
    base: &str,
    user_id: &UserId,
) -> Result<String, ServiceError> {
    for suffix in 0..=MAX_USERNAME_SUFFIX {
        let candidate = if suffix == 0 {
            base.to_owned()
        } else {
            format!("{base}{suffix}")
        };

        let claim = UsernameEntity {
            username: candidate.clone(),
            user_id: user_id.clone(),
        };
        match store.insert_username(claim).await {
            Ok(()) => return Ok(candidate),
            Err(err) if err.is_conflict() => {
                let owner = store.find_username(candidate.clone()).await?;
                if owner.is_some_and(|owner| owner.user_id == *user_id) {
                    return Ok(candidate);
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Internal(format!("no free username derived from `{base}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{caller, caller_with_email, test_state};

    #[test]
    fn username_comes_from_the_local_part() {
        assert_eq!(username_from_email("alice@example.com").as_deref(), Some("alice"));
        assert_eq!(username_from_email("not-an-email"), None);
        assert_eq!(username_from_email("alice@localhost"), None);
    }

    #[tokio::test]
    async fn first_self_lookup_creates_the_user() {
        let state = test_state().await;
        let alice = caller_with_email("alice", "alice@example.com");

        let user = resolve_user(&state, &alice.user_id, Some(&alice))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.username.as_deref(), Some("alice"));
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));

        let again = resolve_user(&state, &alice.user_id, Some(&alice))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again, user);
    }

    #[tokio::test]
    async fn looking_up_someone_else_creates_nothing() {
        let state = test_state().await;
        let bob = caller_with_email("bob", "bob@example.com");

        let found = resolve_user(&state, &bob.user_id, Some(&caller("alice")))
            .await
            .unwrap();
        assert!(found.is_none());
        assert!(resolve_user(&state, &bob.user_id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn taken_usernames_get_a_numeric_suffix() {
        let state = test_state().await;
        let first = caller_with_email("first", "alice@example.com");
        let second = caller_with_email("second", "alice@example.org");
        let third = caller_with_email("third", "alice@example.net");

        let mut names = Vec::new();
        for caller in [&first, &second, &third] {
            let user = resolve_user(&state, &caller.user_id, Some(caller))
                .await
                .unwrap()
                .unwrap();
            names.push(user.username.unwrap());
        }

        assert_eq!(names, ["alice", "alice1", "alice2"]);
    }

    #[tokio::test]
    async fn unusable_email_leaves_username_empty() {
        let state = test_state().await;
        for caller in [caller("nomail"), caller_with_email("local", "root@localhost")] {
            let user = resolve_user(&state, &caller.user_id, Some(&caller))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(user.username, None);
        }
    }

    #[tokio::test]
    async fn concurrent_first_lookups_agree() {
        let state = test_state().await;
        let alice = caller_with_email("alice", "alice@example.com");

        let (left, right) = tokio::join!(
            resolve_user(&state, &alice.user_id, Some(&alice)),
            resolve_user(&state, &alice.user_id, Some(&alice)),
        );

        let left = left.unwrap().unwrap();
        assert_eq!(left.username.as_deref(), Some("alice"));
        assert_eq!(left, right.unwrap().unwrap());
    }
}
