use anyhow::Context;
use axum::{http::StatusCode, Json};
use gigboard_api::{
    comments, AuthToken, Comment, CommentDeleted, CommentNode, EditComment, Gig, GigId,
    NewComment, NewGig, NewSession, NewUser, UserId,
};
use sqlx::Connection;

use crate::{db, extractors::*, Error};

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    JsonBody(data): JsonBody<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    let name = data.name.clone();
    db::create_user(&mut *conn, data).await?;
    tracing::info!(?name, "created user");
    Ok(())
}

pub async fn auth(
    mut conn: PgConn,
    JsonBody(data): JsonBody<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn unauth(user: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::not_authenticated()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<UserId> {
    Json(user)
}

pub async fn fetch_gigs(Auth(user): Auth, mut conn: PgConn) -> Result<Json<Vec<Gig>>, Error> {
    Ok(Json(
        db::fetch_gigs(&mut *conn)
            .await
            .with_context(|| format!("fetching gig list for {:?}", user))?,
    ))
}

pub async fn fetch_gig(
    Auth(_): Auth,
    mut conn: PgConn,
    GigPath(gig): GigPath,
) -> Result<Json<Gig>, Error> {
    Ok(Json(
        db::fetch_gig(&mut *conn, gig)
            .await?
            .ok_or(gigboard_api::Error::GigNotFound(gig))?,
    ))
}

pub async fn create_gig(
    Auth(user): Auth,
    mut conn: PgConn,
    JsonBody(data): JsonBody<NewGig>,
) -> Result<(StatusCode, Json<Gig>), Error> {
    data.validate()?;
    let gig = db::create_gig(&mut *conn, user, data)
        .await
        .with_context(|| format!("creating gig for {:?}", user))?;
    tracing::debug!(gig=?gig.id, owner=?user, "created gig");
    Ok((StatusCode::CREATED, Json(gig)))
}

/// Fetches `gig` for modification by `user`, locking it until `conn`'s transaction ends
async fn gig_for_owner(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    gig: GigId,
) -> Result<Gig, Error> {
    let owner = gigboard_api::Db::lock_gig(&mut db::PostgresDb { conn: &mut *conn }, gig)
        .await?
        .ok_or(gigboard_api::Error::GigNotFound(gig))?;
    if owner != user {
        return Err(Error::permission_denied());
    }
    Ok(db::fetch_gig(conn, gig)
        .await?
        .ok_or(gigboard_api::Error::GigNotFound(gig))?)
}

pub async fn update_gig(
    Auth(user): Auth,
    mut conn: PgConn,
    GigPath(gig): GigPath,
    JsonBody(data): JsonBody<NewGig>,
) -> Result<Json<Gig>, Error> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    gig_for_owner(&mut *tx, user, gig).await?;
    data.validate()?;
    let res = db::update_gig(&mut *tx, gig, data).await?;
    tx.commit().await.context("committing gig update")?;
    Ok(Json(res))
}

pub async fn delete_gig(
    Auth(user): Auth,
    mut conn: PgConn,
    GigPath(gig): GigPath,
) -> Result<Json<Gig>, Error> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    let res = gig_for_owner(&mut *tx, user, gig).await?;
    db::delete_gig(&mut *tx, gig).await?;
    tx.commit().await.context("committing gig deletion")?;
    tracing::debug!(?gig, "deleted gig");
    Ok(Json(res))
}

pub async fn fetch_comments(
    Auth(user): Auth,
    mut conn: PgConn,
    GigPath(gig): GigPath,
) -> Result<Json<Vec<CommentNode>>, Error> {
    let mut db = db::PostgresDb { conn: &mut *conn };
    Ok(Json(
        comments::list(&mut db, user, gig)
            .await
            .with_context(|| format!("fetching comments of {:?} for {:?}", gig, user))??,
    ))
}

pub async fn post_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    GigPath(gig): GigPath,
    JsonBody(data): JsonBody<NewComment>,
) -> Result<(StatusCode, Json<Comment>), Error> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    let res = comments::post(&mut db::PostgresDb { conn: &mut *tx }, user, gig, data)
        .await
        .with_context(|| format!("posting comment on {:?} for {:?}", gig, user))??;
    tx.commit().await.context("committing new comment")?;
    tracing::debug!(comment=?res.id, parent=?res.parent_id, ?gig, "posted comment");
    Ok((StatusCode::CREATED, Json(res)))
}

pub async fn edit_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    CommentPath(gig, comment): CommentPath,
    JsonBody(data): JsonBody<EditComment>,
) -> Result<Json<Comment>, Error> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    let res = comments::edit(&mut db::PostgresDb { conn: &mut *tx }, user, gig, comment, data)
        .await
        .with_context(|| format!("editing comment {:?} for {:?}", comment, user))??;
    tx.commit().await.context("committing comment edit")?;
    Ok(Json(res))
}

pub async fn delete_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    CommentPath(gig, comment): CommentPath,
) -> Result<Json<CommentDeleted>, Error> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    let deleted = comments::delete(&mut db::PostgresDb { conn: &mut *tx }, user, gig, comment)
        .await
        .with_context(|| format!("deleting comment {:?} for {:?}", comment, user))??;
    tx.commit().await.context("committing comment deletion")?;
    tracing::debug!(?comment, count = deleted.len(), "deleted comment subtree");
    Ok(Json(CommentDeleted::new()))
}
