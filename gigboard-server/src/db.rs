use std::collections::HashSet;

use anyhow::{anyhow, Context};
use axum::async_trait;
use gigboard_api::{
    AuthToken, Category, Comment, CommentId, Db, Gig, GigId, NewCommentRecord, NewGig,
    NewSession, NewUser, Time, User, UserId, Uuid,
};
use sqlx::{postgres::PgRow, Row};

use crate::Error;

pub async fn create_user(conn: &mut sqlx::PgConnection, user: NewUser) -> Result<(), Error> {
    let existing = sqlx::query("SELECT id, name FROM users WHERE id = $1 OR name = $2")
        .bind(user.id.0)
        .bind(&user.name)
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("checking for conflicts with new user {:?}", user.id))?;
    let names = existing
        .iter()
        .map(|r| r.try_get::<String, _>("name"))
        .collect::<Result<Vec<_>, _>>()
        .context("retrieving the name field")?;
    if names.contains(&user.name) {
        return Err(Error::name_already_used(user.name));
    }
    if !names.is_empty() {
        return Err(Error::uuid_already_used(user.id.0));
    }
    sqlx::query("INSERT INTO users VALUES ($1, $2, $3)")
        .bind(user.id.0)
        .bind(&user.name)
        .bind(&user.initial_password_hash)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting user {:?}", user.id))?;
    Ok(())
}

pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    session: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let user = sqlx::query("SELECT id, password_hash FROM users WHERE name = $1")
        .bind(&session.user)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching password hash of user {:?}", session.user))?;
    let user = match user {
        Some(u) => u,
        None => return Ok(None),
    };
    let user_id: Uuid = user.try_get("id").context("retrieving the id field")?;
    let hash: String = user
        .try_get("password_hash")
        .context("retrieving the password_hash field")?;

    // tests do not actually hash their passwords
    #[cfg(not(test))]
    let valid = bcrypt::verify(&session.password, &hash).unwrap_or(false);
    #[cfg(test)]
    let valid = session.password == hash;
    if !valid {
        return Ok(None);
    }

    let token = Uuid::new_v4();
    let now = gigboard_api::now();
    sqlx::query("INSERT INTO sessions VALUES ($1, $2, $3, $4, $4)")
        .bind(token)
        .bind(user_id)
        .bind(&session.device)
        .bind(now)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting new session for user {:?}", user_id))?;
    tracing::info!(user=?user_id, device=?session.device, "new login");
    Ok(Some(AuthToken(token)))
}

pub async fn logout_user(conn: &mut sqlx::PgConnection, token: &AuthToken) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() == 1)
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let row = sqlx::query(
        "UPDATE sessions SET last_active = $1 WHERE id = $2 RETURNING user_id",
    )
    .bind(gigboard_api::now())
    .bind(token.0)
    .fetch_optional(conn)
    .await
    .context("recovering session")?
    .ok_or_else(Error::not_authenticated)?;
    Ok(UserId(
        row.try_get("user_id")
            .context("retrieving the user_id field")?,
    ))
}

const GIG_COLUMNS: &str = "
    g.id, g.owner_id, u.name AS owner_name, g.title, g.text, g.category, g.created_at,
    g.updated_at
";

fn gig_from_row(r: &PgRow) -> anyhow::Result<Gig> {
    let category: String = r.try_get("category").context("retrieving the category field")?;
    Ok(Gig {
        id: GigId(r.try_get("id").context("retrieving the id field")?),
        owner: User {
            id: UserId(r.try_get("owner_id").context("retrieving the owner_id field")?),
            username: r
                .try_get("owner_name")
                .context("retrieving the owner_name field")?,
        },
        title: r.try_get("title").context("retrieving the title field")?,
        text: r.try_get("text").context("retrieving the text field")?,
        category: Category::from_name(&category)
            .ok_or_else(|| anyhow!("unknown gig category {:?} in database", category))?,
        created_at: r
            .try_get::<Time, _>("created_at")
            .context("retrieving the created_at field")?,
        updated_at: r
            .try_get::<Time, _>("updated_at")
            .context("retrieving the updated_at field")?,
    })
}

pub async fn fetch_gigs(conn: &mut sqlx::PgConnection) -> anyhow::Result<Vec<Gig>> {
    sqlx::query(&format!(
        "
            SELECT {GIG_COLUMNS}
            FROM gigs g
            INNER JOIN users u
                ON u.id = g.owner_id
            ORDER BY g.created_at DESC
        "
    ))
    .fetch_all(conn)
    .await
    .context("querying gigs table")?
    .iter()
    .map(gig_from_row)
    .collect()
}

pub async fn fetch_gig(conn: &mut sqlx::PgConnection, gig: GigId) -> anyhow::Result<Option<Gig>> {
    sqlx::query(&format!(
        "
            SELECT {GIG_COLUMNS}
            FROM gigs g
            INNER JOIN users u
                ON u.id = g.owner_id
            WHERE g.id = $1
        "
    ))
    .bind(gig.0)
    .fetch_optional(conn)
    .await
    .with_context(|| format!("querying gig {:?}", gig))?
    .as_ref()
    .map(gig_from_row)
    .transpose()
}

pub async fn create_gig(
    conn: &mut sqlx::PgConnection,
    owner: UserId,
    data: NewGig,
) -> anyhow::Result<Gig> {
    let id = GigId(Uuid::new_v4());
    let now = gigboard_api::now();
    sqlx::query("INSERT INTO gigs VALUES ($1, $2, $3, $4, $5, $6, $6)")
        .bind(id.0)
        .bind(owner.0)
        .bind(&data.title)
        .bind(&data.text)
        .bind(data.category.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting gig {:?}", id))?;
    fetch_gig(&mut *conn, id)
        .await?
        .ok_or_else(|| anyhow!("gig {:?} vanished right after its creation", id))
}

pub async fn update_gig(
    conn: &mut sqlx::PgConnection,
    gig: GigId,
    data: NewGig,
) -> anyhow::Result<Gig> {
    sqlx::query(
        "UPDATE gigs SET title = $1, text = $2, category = $3, updated_at = $4 WHERE id = $5",
    )
    .bind(&data.title)
    .bind(&data.text)
    .bind(data.category.as_str())
    .bind(gigboard_api::now())
    .bind(gig.0)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("updating gig {:?}", gig))?;
    fetch_gig(&mut *conn, gig)
        .await?
        .ok_or_else(|| anyhow!("gig {:?} vanished right after its update", gig))
}

/// Deletes `gig`, its comments going along with it
pub async fn delete_gig(conn: &mut sqlx::PgConnection, gig: GigId) -> anyhow::Result<()> {
    let res = sqlx::query("DELETE FROM gigs WHERE id = $1")
        .bind(gig.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting gig {:?}", gig))?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "deletion of gig {:?} affected {} rows",
        gig,
        res.rows_affected()
    );
    Ok(())
}

const COMMENT_COLUMNS: &str = "
    c.id, c.gig_id, c.author_id, u.name AS author_name, c.parent_id, c.text, c.created_at
";

fn comment_from_row(r: &PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(r.try_get("id").context("retrieving the id field")?),
        gig_id: GigId(r.try_get("gig_id").context("retrieving the gig_id field")?),
        author: User {
            id: UserId(
                r.try_get("author_id")
                    .context("retrieving the author_id field")?,
            ),
            username: r
                .try_get("author_name")
                .context("retrieving the author_name field")?,
        },
        parent_id: r
            .try_get::<Option<Uuid>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
        text: r.try_get("text").context("retrieving the text field")?,
        created_at: r
            .try_get::<Time, _>("created_at")
            .context("retrieving the created_at field")?,
    })
}

pub struct PostgresDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
}

impl<'a> PostgresDb<'a> {
    async fn fetch_comment(&mut self, comment: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query(&format!(
            "
                SELECT {COMMENT_COLUMNS}
                FROM comments c
                INNER JOIN users u
                    ON u.id = c.author_id
                WHERE c.id = $1
            "
        ))
        .bind(comment.0)
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("querying comment {:?}", comment))?
        .as_ref()
        .map(comment_from_row)
        .transpose()
    }
}

#[async_trait]
impl<'a> Db for PostgresDb<'a> {
    async fn gig_owner(&mut self, gig: GigId) -> anyhow::Result<Option<UserId>> {
        Ok(sqlx::query("SELECT owner_id FROM gigs WHERE id = $1")
            .bind(gig.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("querying owner of gig {:?}", gig))?
            .map(|r| r.try_get("owner_id").map(UserId))
            .transpose()
            .context("retrieving the owner_id field")?)
    }

    async fn lock_gig(&mut self, gig: GigId) -> anyhow::Result<Option<UserId>> {
        Ok(sqlx::query("SELECT owner_id FROM gigs WHERE id = $1 FOR UPDATE")
            .bind(gig.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("locking gig {:?}", gig))?
            .map(|r| r.try_get("owner_id").map(UserId))
            .transpose()
            .context("retrieving the owner_id field")?)
    }

    async fn list_comments(&mut self, gig: GigId) -> anyhow::Result<Vec<Comment>> {
        sqlx::query(&format!(
            "
                SELECT {COMMENT_COLUMNS}
                FROM comments c
                INNER JOIN users u
                    ON u.id = c.author_id
                WHERE c.gig_id = $1
                ORDER BY c.created_at, c.id
            "
        ))
        .bind(gig.0)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("querying comments of gig {:?}", gig))?
        .iter()
        .map(comment_from_row)
        .collect()
    }

    async fn get_comment(&mut self, comment: CommentId) -> anyhow::Result<Option<Comment>> {
        self.fetch_comment(comment).await
    }

    async fn children_of(&mut self, comment: CommentId) -> anyhow::Result<Vec<CommentId>> {
        sqlx::query("SELECT id FROM comments WHERE parent_id = $1")
            .bind(comment.0)
            .fetch_all(&mut *self.conn)
            .await
            .with_context(|| format!("querying replies to comment {:?}", comment))?
            .iter()
            .map(|r| {
                r.try_get("id")
                    .map(CommentId)
                    .context("retrieving the id field")
            })
            .collect()
    }

    async fn insert_comment(&mut self, c: NewCommentRecord) -> anyhow::Result<Comment> {
        let res = sqlx::query("INSERT INTO comments VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(c.id.0)
            .bind(c.gig_id.0)
            .bind(c.author_id.0)
            .bind(c.parent_id.map(|p| p.0))
            .bind(&c.text)
            .bind(c.created_at)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("inserting comment {:?}", c.id))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "insertion of comment {:?} affected {} rows",
            c.id,
            res.rows_affected()
        );
        self.fetch_comment(c.id)
            .await?
            .ok_or_else(|| anyhow!("comment {:?} vanished right after its insertion", c.id))
    }

    async fn update_comment_text(
        &mut self,
        comment: CommentId,
        text: String,
    ) -> anyhow::Result<Comment> {
        let res = sqlx::query("UPDATE comments SET text = $1 WHERE id = $2")
            .bind(&text)
            .bind(comment.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("updating text of comment {:?}", comment))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "text update of comment {:?} affected {} rows",
            comment,
            res.rows_affected()
        );
        self.fetch_comment(comment)
            .await?
            .ok_or_else(|| anyhow!("comment {:?} vanished right after its update", comment))
    }

    async fn delete_comments(&mut self, comments: &HashSet<CommentId>) -> anyhow::Result<()> {
        let ids = comments.iter().map(|c| c.0).collect::<Vec<Uuid>>();
        let res = sqlx::query("DELETE FROM comments WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting comments {:?}", ids))?;
        anyhow::ensure!(
            res.rows_affected() == ids.len() as u64,
            "deletion of {} comments affected {} rows",
            ids.len(),
            res.rows_affected()
        );
        Ok(())
    }
}
