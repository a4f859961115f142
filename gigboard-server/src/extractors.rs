use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path},
    http::{self, request, Request},
    Json,
};
use gigboard_api::{AuthToken, CommentId, Error as ApiError, GigId, UserId, Uuid};

use crate::{db, Error};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: PgPool,
    pub admin_token: Option<AuthToken>,
}

#[derive(Clone)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    pub fn new(pool: sqlx::PgPool) -> PgPool {
        PgPool(pool)
    }

    pub async fn acquire(&self) -> Result<PgConn, Error> {
        Ok(PgConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }

    pub fn num_idle(&self) -> usize {
        self.0.num_idle()
    }
}

pub struct PgConn(sqlx::pool::PoolConnection<sqlx::Postgres>);

#[async_trait]
impl FromRequestParts<AppState> for PgConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<PgConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for PgConn {
    type Target = sqlx::PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PgConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::not_authenticated()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::not_authenticated())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::not_authenticated())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::not_authenticated());
                }
                let token = auth.next().ok_or(Error::not_authenticated())?;
                if auth.next().is_some() {
                    return Err(Error::not_authenticated());
                }
                let token = Uuid::try_from(token).map_err(|_| Error::not_authenticated())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

pub struct Auth(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let mut conn = PgConn::from_request_parts(req, state).await?;
        Ok(Auth(db::recover_session(&mut *conn, token).await?))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}

/// Gig id taken from a `/:gig` path segment
pub struct GigPath(pub GigId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for GigPath {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<GigPath, Error> {
        let Path(gig) = Path::<String>::from_request_parts(req, state)
            .await
            .map_err(|rej| Error::Api(ApiError::InvalidId(rej.body_text())))?;
        Ok(GigPath(GigId::parse(&gig)?))
    }
}

/// Gig and comment ids taken from `/:gig/.../:comment` path segments
pub struct CommentPath(pub GigId, pub CommentId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CommentPath {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &S,
    ) -> Result<CommentPath, Error> {
        let Path((gig, comment)) = Path::<(String, String)>::from_request_parts(req, state)
            .await
            .map_err(|rej| Error::Api(ApiError::InvalidId(rej.body_text())))?;
        Ok(CommentPath(GigId::parse(&gig)?, CommentId::parse(&comment)?))
    }
}

/// Json body whose parsing failures are rendered like all other client errors
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for JsonBody<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Error;

    async fn from_request(req: Request<B>, state: &S) -> Result<JsonBody<T>, Error> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(v)) => Ok(JsonBody(v)),
            Err(rej) => Err(Error::Api(ApiError::InvalidBody(rej.body_text()))),
        }
    }
}
