//! Cookie sessions.
//!
//! Every request carries a `token` cookie. The token is looked up in a
//! [`SessionStore`]; unknown or expired tokens are replaced by a fresh
//! anonymous session. Handlers read the result through the [`Session`] and
//! [`SignedIn`] extractors.

use crate::{
    auth,
    error::{AppError, AppResult},
    schema::sessions,
    DbPool,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{NaiveDateTime, Utc};
use diesel::{upsert::excluded, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

pub const COOKIE_NAME: &str = "token";
pub const SESSION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(i32),
}

impl Identity {
    pub fn user_id(self) -> Option<i32> {
        match self {
            Identity::Anonymous => None,
            Identity::User(id) => Some(id),
        }
    }
}

impl From<Option<i32>> for Identity {
    fn from(user_id: Option<i32>) -> Self {
        user_id.map_or(Identity::Anonymous, Identity::User)
    }
}

pub fn session_expiry() -> NaiveDateTime {
    (Utc::now() + chrono::Duration::days(SESSION_DAYS)).naive_utc()
}

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Persists a new anonymous session.
    async fn open(&self, token: &str, expires_at: NaiveDateTime) -> anyhow::Result<()>;

    /// `None` when the token is unknown or has expired.
    async fn lookup(&self, token: &str) -> anyhow::Result<Option<Identity>>;

    /// Points the session at `identity`, creating it if it is missing.
    async fn bind(&self, token: &str, identity: Identity) -> anyhow::Result<()>;

    async fn purge_expired(&self) -> anyhow::Result<usize>;
}

pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn open(&self, token: &str, expires_at: NaiveDateTime) -> anyhow::Result<()> {
        let conn = &mut self.pool.get().await?;

        diesel::insert_into(sessions::table)
            .values((
                sessions::token_digest.eq(auth::token_digest(token)),
                sessions::user_id.eq(None::<i32>),
                sessions::expires_at.eq(expires_at),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    async fn lookup(&self, token: &str) -> anyhow::Result<Option<Identity>> {
        let conn = &mut self.pool.get().await?;

        let user_id = sessions::table
            .filter(sessions::token_digest.eq(auth::token_digest(token)))
            .filter(sessions::expires_at.gt(Utc::now().naive_utc()))
            .select(sessions::user_id)
            .first::<Option<i32>>(conn)
            .await
            .optional()?;

        Ok(user_id.map(Identity::from))
    }

    async fn bind(&self, token: &str, identity: Identity) -> anyhow::Result<()> {
        let conn = &mut self.pool.get().await?;

        diesel::insert_into(sessions::table)
            .values((
                sessions::token_digest.eq(auth::token_digest(token)),
                sessions::user_id.eq(identity.user_id()),
                sessions::expires_at.eq(session_expiry()),
            ))
            .on_conflict(sessions::token_digest)
            .do_update()
            .set(sessions::user_id.eq(excluded(sessions::user_id)))
            .execute(conn)
            .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let conn = &mut self.pool.get().await?;

        Ok(diesel::delete(sessions::table)
            .filter(sessions::expires_at.le(Utc::now().naive_utc()))
            .execute(conn)
            .await?)
    }
}

/// Keeps sessions in process memory. Used by tests and single-node setups
/// that can afford to log everyone out on restart.
#[derive(Default)]
pub struct MemorySessionStore(Mutex<HashMap<String, (Identity, NaiveDateTime)>>);

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn open(&self, token: &str, expires_at: NaiveDateTime) -> anyhow::Result<()> {
        self.0
            .lock()
            .await
            .insert(auth::token_digest(token), (Identity::Anonymous, expires_at));
        Ok(())
    }

    async fn lookup(&self, token: &str) -> anyhow::Result<Option<Identity>> {
        let now = Utc::now().naive_utc();
        Ok(self
            .0
            .lock()
            .await
            .get(&auth::token_digest(token))
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(identity, _)| *identity))
    }

    async fn bind(&self, token: &str, identity: Identity) -> anyhow::Result<()> {
        self.0
            .lock()
            .await
            .entry(auth::token_digest(token))
            .and_modify(|entry| entry.0 = identity)
            .or_insert_with(|| (identity, session_expiry()));
        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = Utc::now().naive_utc();
        let mut sessions = self.0.lock().await;
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - sessions.len())
    }
}

/// The session attached to the current request.
#[derive(Clone)]
pub struct Session {
    token: String,
    identity: Identity,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn user_id(&self) -> Option<i32> {
        self.identity.user_id()
    }

    pub async fn sign_in(&mut self, user_id: i32) -> anyhow::Result<()> {
        self.store.bind(&self.token, Identity::User(user_id)).await?;
        self.identity = Identity::User(user_id);
        Ok(())
    }

    pub async fn sign_out(&mut self) -> anyhow::Result<()> {
        self.store.bind(&self.token, Identity::Anonymous).await?;
        self.identity = Identity::Anonymous;
        Ok(())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> AppResult<Self> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("session middleware is not installed").into())
    }
}

/// Extracts the signed-in user's id, rejecting anonymous sessions with
/// `logged_out`.
pub struct SignedIn(pub i32);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SignedIn {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> AppResult<Self> {
        let session = Session::from_request_parts(parts, state).await?;
        session
            .user_id()
            .map(SignedIn)
            .ok_or_else(|| AppError::unauthorized("logged_out"))
    }
}

pub async fn attach_session(
    State(store): State<Arc<dyn SessionStore>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> AppResult<(CookieJar, Response)> {
    let known = match jar.get(COOKIE_NAME) {
        Some(cookie) => {
            let token = cookie.value().to_string();
            store
                .lookup(&token)
                .await?
                .map(|identity| (token, identity))
        }
        None => None,
    };

    let (token, identity, jar) = match known {
        Some((token, identity)) => (token, identity, jar),
        None => {
            let token = auth::generate_token();
            store.open(&token, session_expiry()).await?;
            tracing::debug!("opened anonymous session");

            let cookie = Cookie::build((COOKIE_NAME, token.clone()))
                .path("/")
                .http_only(true)
                .max_age(time::Duration::days(SESSION_DAYS));
            (token, Identity::Anonymous, jar.add(cookie))
        }
    };

    request.extensions_mut().insert(Session {
        token,
        identity,
        store,
    });

    Ok((jar, next.run(request).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_sessions_are_anonymous() {
        let store = MemorySessionStore::default();
        store.open("abc", session_expiry()).await.unwrap();
        assert_eq!(store.lookup("abc").await.unwrap(), Some(Identity::Anonymous));
        assert_eq!(store.lookup("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bind_switches_user() {
        let store = MemorySessionStore::default();
        store.open("abc", session_expiry()).await.unwrap();

        store.bind("abc", Identity::User(12)).await.unwrap();
        assert_eq!(store.lookup("abc").await.unwrap(), Some(Identity::User(12)));

        store.bind("abc", Identity::Anonymous).await.unwrap();
        assert_eq!(store.lookup("abc").await.unwrap(), Some(Identity::Anonymous));
    }

    #[tokio::test]
    async fn bind_creates_missing_sessions() {
        let store = MemorySessionStore::default();
        store.bind("fresh", Identity::User(3)).await.unwrap();
        assert_eq!(store.lookup("fresh").await.unwrap(), Some(Identity::User(3)));
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_purged() {
        let store = MemorySessionStore::default();
        let past = (Utc::now() - chrono::Duration::minutes(1)).naive_utc();
        store.open("old", past).await.unwrap();
        store.open("new", session_expiry()).await.unwrap();

        assert_eq!(store.lookup("old").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.lookup("new").await.unwrap(), Some(Identity::Anonymous));
    }

    #[test]
    fn identity_from_nullable_column() {
        assert_eq!(Identity::from(None), Identity::Anonymous);
        assert_eq!(Identity::from(Some(5)), Identity::User(5));
        assert_eq!(Identity::User(5).user_id(), Some(5));
    }
}
