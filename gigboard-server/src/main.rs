use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use gigboard_api::{AuthToken, Uuid};
use structopt::StructOpt;
use tower_http::trace::TraceLayer;

mod db;
mod error;
mod extractors;
#[cfg(test)]
mod fuzz;
mod handlers;

use error::Error;
use extractors::{AppState, PgPool};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(StructOpt)]
struct Opt {
    /// Postgres connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    /// Address to listen on
    #[structopt(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Bearer token for the admin routes, which are disabled when it is unset
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<Uuid>,
}

pub async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<PgPool> {
    Ok(PgPool::new(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(db_url)
            .await
            .with_context(|| format!("opening database {:?}", db_url))?,
    ))
}

pub fn app(db: PgPool, admin_token: Option<AuthToken>) -> Router {
    Router::new()
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route(
            "/api/gigs",
            get(handlers::fetch_gigs).post(handlers::create_gig),
        )
        .route(
            "/api/gigs/:gig",
            get(handlers::fetch_gig)
                .put(handlers::update_gig)
                .delete(handlers::delete_gig),
        )
        .route(
            "/api/gigs/:gig/comments",
            get(handlers::fetch_comments).post(handlers::post_comment),
        )
        .route(
            "/api/gigs/:gig/comments/:comment",
            put(handlers::edit_comment).delete(handlers::delete_comment),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { db, admin_token })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::from_args();

    let db = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&mut *db.acquire().await?)
        .await
        .context("applying migrations")?;

    if opt.admin_token.is_none() {
        tracing::warn!("no admin token configured, user creation is disabled");
    }
    let app = app(db, opt.admin_token.map(AuthToken));

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
