#![cfg(test)]

use async_recursion::async_recursion;
use bolero::generator::TypeGenerator;
use axum::{
    extract::FromRequestParts,
    http::{self, request},
};
use gigboard_api::{
    Category, Comment, CommentDeleted, CommentId, CommentNode, EditComment, Error as ApiError,
    Gig, GigId, NewComment, NewGig, NewSession, NewUser, UserId,
};
use gigboard_mock_server::MockServer;
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

fn build_pg_cluster(data: &Path) -> Option<postgresfixture::cluster::Cluster> {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    Some(postgresfixture::cluster::Cluster::new(data, runtime?))
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let cluster = match build_pg_cluster(datadir_path) {
                Some(cluster) => cluster,
                None => {
                    eprintln!("postgresql is not installed in path, skipping {}", stringify!($name));
                    return;
                }
            };
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                // create test db
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!("postgresql://?host={}&dbname=test_db", datadir_path)).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        // run the test
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            // cleanup
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::Executor::execute(&mut *conn, include_str!("../reset-test-db.sql"))
                                .await
                                .expect("failed cleaning up database");
                        });
                        // resume the panics
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::NotAuthenticated)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        #[generator(bolero::generator::gen_with::<String>().len(1..20usize))]
        name: String,
    },
    Auth {
        uid: usize,
    },
    Unauth {
        sid: usize,
    },
    CreateGig {
        sid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..20usize))]
        title: String,
        category: u8,
    },
    DeleteGig {
        sid: usize,
        gid: usize,
    },
    PostComment {
        sid: usize,
        gid: usize,
        parent: Option<usize>,
        #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
        text: String,
    },
    EditComment {
        sid: usize,
        gid: usize,
        cid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
        text: String,
    },
    DeleteComment {
        sid: usize,
        gid: usize,
        cid: usize,
    },
    FetchComments {
        sid: usize,
        gid: usize,
    },
    /// A single thread going `depth` replies deep, past serde_json's default nesting limit
    DeepThread {
        sid: usize,
        gid: usize,
        depth: u8,
    },
    MalformedId {
        sid: usize,
        gid: usize,
        id: u8,
    },
    MalformedParent {
        sid: usize,
        gid: usize,
    },
}

const MALFORMED_IDS: [&str; 4] = [
    "not-a-uuid",
    "42",
    "ffffffff-ffff-ffff-ffff-fffffffffffg",
    "ffffffff-ffff-ffff-ffff-ffffffffffff-0",
];

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status.is_success() {
        if std::any::TypeId::of::<Resp>() == std::any::TypeId::of::<()>() {
            // the server returns an empty string in this situation, which does not parse
            // properly with serde_json
            return Ok(serde_json::from_slice(b"null").unwrap());
        } else {
            return Ok(gigboard_api::json_from_slice(&body).unwrap_or_else(|err| {
                panic!(
                    r#"
                        Failed parsing resp body!

                        The error is the following:
                        ---
                        {err}
                        ---

                        Response body is:
                        ---
                        {body:?}
                        ---

                        Request was:
                        ---
                        {req_body:?}
                        ---
                    "#
                )
            }));
        }
    }
    let err = ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}"));
    assert_eq!(status, err.status_code(), "status code does not match error {err:?}");
    Err(err)
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

/// Errors carry ids that differ between app and mock, so only their kind is compared
fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    let app_res = app_res.map_err(|e| e.kind());
    let mock_res = mock_res.map_err(|e| e.kind());
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

/// Shape of a comment, without the ids and dates that differ between app and mock
fn comment_shape(c: &Comment) -> (UserId, String, String, bool) {
    (
        c.author.id,
        c.author.username.clone(),
        c.text.clone(),
        c.parent_id.is_some(),
    )
}

fn forest_shape(forest: &[CommentNode]) -> Vec<(usize, UserId, String)> {
    forest
        .iter()
        .flat_map(|t| t.flatten())
        .map(|(depth, c)| (depth, c.author.id, c.text.clone()))
        .collect()
}

fn gig_shape(g: &Gig) -> (UserId, String, String, Category) {
    (g.owner.id, g.title.clone(), g.text.clone(), g.category)
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

struct Session {
    app: AuthToken,
    mock: AuthToken,
}

struct Pair<T> {
    app: T,
    mock: T,
}

struct ComparativeFuzzer {
    admin_token: Uuid,
    app: Router,
    mock: MockServer,
    sessions: Vec<Session>,
    gigs: Vec<Pair<GigId>>,
    comments: Vec<Pair<CommentId>>,
}

impl ComparativeFuzzer {
    fn new(pool: PgPool) -> ComparativeFuzzer {
        let admin_token = Uuid::new_v4();
        ComparativeFuzzer {
            admin_token,
            app: app(pool, Some(AuthToken(admin_token))),
            mock: MockServer::new(),
            sessions: Vec::new(),
            gigs: Vec::new(),
            comments: Vec::new(),
        }
    }

    async fn session(&mut self, sid: usize) -> usize {
        match resize_int(sid, ..self.sessions.len()) {
            Some(sid) => sid,
            None => {
                self.execute_fuzz_op(FuzzOp::Auth { uid: sid }).await;
                self.sessions.len() - 1
            }
        }
    }

    async fn gig(&mut self, sid: usize, gid: usize) -> usize {
        match resize_int(gid, ..self.gigs.len()) {
            Some(gid) => gid,
            None => {
                self.execute_fuzz_op(FuzzOp::CreateGig {
                    sid,
                    title: String::from("Singer wanted"),
                    category: 0,
                })
                .await;
                self.gigs.len() - 1
            }
        }
    }

    /// Returns `None` if no comment could be posted, eg. because the gig was deleted
    async fn comment(&mut self, sid: usize, gid: usize, cid: usize) -> Option<usize> {
        match resize_int(cid, ..self.comments.len()) {
            Some(cid) => Some(cid),
            None => {
                self.execute_fuzz_op(FuzzOp::PostComment {
                    sid,
                    gid,
                    parent: None,
                    text: String::from("first"),
                })
                .await;
                self.comments.len().checked_sub(1)
            }
        }
    }

    /// Posts on both sides as session `s` on gig `g`, replying to comment `parent`, and
    /// returns the index of the new comment if it was accepted
    async fn post_comment(
        &mut self,
        s: usize,
        g: usize,
        parent: Option<usize>,
        text: String,
    ) -> Option<usize> {
        let app_data = NewComment {
            text: text.clone(),
            parent: parent.map(|p| self.comments[p].app),
        };
        let mock_data = NewComment {
            text,
            parent: parent.map(|p| self.comments[p].mock),
        };
        let app_res: Result<Comment, _> = run_on_app(
            &mut self.app,
            "POST",
            &format!("/api/gigs/{}/comments", self.gigs[g].app.0),
            Some(self.sessions[s].app.0),
            &app_data,
        )
        .await;
        let mock_res = self
            .mock
            .post_comment(self.sessions[s].mock, self.gigs[g].mock, mock_data)
            .await;
        let mut res = None;
        if let (Ok(app), Ok(mock)) = (&app_res, &mock_res) {
            self.comments.push(Pair {
                app: app.id,
                mock: mock.id,
            });
            res = Some(self.comments.len() - 1);
        }
        compare(
            "PostComment",
            app_res.map(|c| comment_shape(&c)),
            mock_res.map(|c| comment_shape(&c)),
        );
        res
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser { name } => {
                // no hashing for tests
                let new_user = NewUser {
                    id: UserId(Uuid::new_v4()),
                    name,
                    initial_password_hash: String::from("password"),
                };
                compare(
                    "CreateUser",
                    run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-user",
                        Some(self.admin_token),
                        &new_user,
                    )
                    .await,
                    self.mock.admin_create_user(new_user, String::from("password")),
                )
            }
            FuzzOp::Auth { uid } => {
                if let Some(uid) = resize_int(uid, ..self.mock.test_num_users()) {
                    let (user, password) = self.mock.test_get_user_info(uid);
                    let session = NewSession {
                        user: String::from(user),
                        password: String::from(password),
                        device: String::from("fuzzer"),
                    };
                    let app_tok =
                        run_on_app(&mut self.app, "POST", "/api/auth", None, &session).await;
                    let mock_tok = self.mock.auth(session);
                    if let (&Ok(app), &Ok(mock)) = (&app_tok, &mock_tok) {
                        self.sessions.push(Session { app, mock });
                    }
                    compare("Auth", app_tok.map(|_| ()), mock_tok.map(|_| ()));
                } else {
                    self.execute_fuzz_op(FuzzOp::CreateUser {
                        name: format!("user{}", self.mock.test_num_users()),
                    })
                    .await;
                    self.execute_fuzz_op(FuzzOp::Auth { uid }).await;
                }
            }
            FuzzOp::Unauth { sid } => {
                if let Some(sid) = resize_int(sid, ..self.sessions.len()) {
                    let s = self.sessions.remove(sid);
                    compare(
                        "Unauth",
                        run_on_app(&mut self.app, "POST", "/api/unauth", Some(s.app.0), &()).await,
                        self.mock.unauth(s.mock),
                    );
                }
            }
            FuzzOp::CreateGig {
                sid,
                title,
                category,
            } => {
                let s = self.session(sid).await;
                let data = NewGig {
                    title,
                    text: String::from("Details in the comments"),
                    category: Category::ALL[category as usize % Category::ALL.len()],
                };
                let app_res: Result<Gig, _> = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/gigs",
                    Some(self.sessions[s].app.0),
                    &data,
                )
                .await;
                let mock_res = self.mock.create_gig(self.sessions[s].mock, data);
                if let (Ok(app), Ok(mock)) = (&app_res, &mock_res) {
                    self.gigs.push(Pair {
                        app: app.id,
                        mock: mock.id,
                    });
                }
                compare(
                    "CreateGig",
                    app_res.map(|g| gig_shape(&g)),
                    mock_res.map(|g| gig_shape(&g)),
                );
            }
            FuzzOp::DeleteGig { sid, gid } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let app_res: Result<Gig, _> = run_on_app(
                    &mut self.app,
                    "DELETE",
                    &format!("/api/gigs/{}", self.gigs[g].app.0),
                    Some(self.sessions[s].app.0),
                    &(),
                )
                .await;
                let mock_res = self.mock.delete_gig(self.sessions[s].mock, self.gigs[g].mock);
                compare(
                    "DeleteGig",
                    app_res.map(|g| gig_shape(&g)),
                    mock_res.map(|g| gig_shape(&g)),
                );
            }
            FuzzOp::PostComment {
                sid,
                gid,
                parent,
                text,
            } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let parent = parent.and_then(|p| resize_int(p, ..self.comments.len()));
                self.post_comment(s, g, parent, text).await;
            }
            FuzzOp::DeepThread { sid, gid, depth } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let mut parent = None;
                for i in 0..=depth {
                    match self.post_comment(s, g, parent, format!("reply {i}")).await {
                        Some(c) => parent = Some(c),
                        None => return,
                    }
                }
                self.execute_fuzz_op(FuzzOp::FetchComments { sid, gid }).await;
            }
            FuzzOp::MalformedId { sid, gid, id } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let bad = MALFORMED_IDS[id as usize % MALFORMED_IDS.len()];
                let tok = Some(self.sessions[s].app.0);
                let gig = self.gigs[g].app.0;
                let fetch: Result<Vec<CommentNode>, _> = run_on_app(
                    &mut self.app,
                    "GET",
                    &format!("/api/gigs/{bad}/comments"),
                    tok,
                    &(),
                )
                .await;
                let edit: Result<Comment, _> = run_on_app(
                    &mut self.app,
                    "PUT",
                    &format!("/api/gigs/{gig}/comments/{bad}"),
                    tok,
                    &EditComment {
                        text: String::from("edited"),
                    },
                )
                .await;
                let delete: Result<CommentDeleted, _> = run_on_app(
                    &mut self.app,
                    "DELETE",
                    &format!("/api/gigs/{bad}/comments/{gig}"),
                    tok,
                    &(),
                )
                .await;
                for (name, err) in [
                    ("fetch", fetch.err()),
                    ("edit", edit.err()),
                    ("delete", delete.err()),
                ] {
                    assert_eq!(
                        err,
                        Some(ApiError::InvalidId(String::from(bad))),
                        "{name} with malformed id {bad:?}"
                    );
                }
            }
            FuzzOp::MalformedParent { sid, gid } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let res: Result<Comment, _> = run_on_app(
                    &mut self.app,
                    "POST",
                    &format!("/api/gigs/{}/comments", self.gigs[g].app.0),
                    Some(self.sessions[s].app.0),
                    &serde_json::json!({ "text": "hello", "parent": "not-a-uuid" }),
                )
                .await;
                match res {
                    Err(e) => {
                        assert_eq!(e.kind(), "invalid-body");
                        assert_eq!(e.status_code(), http::StatusCode::BAD_REQUEST);
                    }
                    Ok(c) => panic!("comment with malformed parent was accepted: {c:?}"),
                }
            }
            FuzzOp::EditComment {
                sid,
                gid,
                cid,
                text,
            } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let c = match self.comment(sid, gid, cid).await {
                    Some(c) => c,
                    None => return,
                };
                let data = EditComment { text };
                let app_res: Result<Comment, _> = run_on_app(
                    &mut self.app,
                    "PUT",
                    &format!(
                        "/api/gigs/{}/comments/{}",
                        self.gigs[g].app.0, self.comments[c].app.0
                    ),
                    Some(self.sessions[s].app.0),
                    &data,
                )
                .await;
                let mock_res = self
                    .mock
                    .edit_comment(
                        self.sessions[s].mock,
                        self.gigs[g].mock,
                        self.comments[c].mock,
                        data,
                    )
                    .await;
                compare(
                    "EditComment",
                    app_res.map(|c| comment_shape(&c)),
                    mock_res.map(|c| comment_shape(&c)),
                );
            }
            FuzzOp::DeleteComment { sid, gid, cid } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let c = match self.comment(sid, gid, cid).await {
                    Some(c) => c,
                    None => return,
                };
                let app_res: Result<CommentDeleted, _> = run_on_app(
                    &mut self.app,
                    "DELETE",
                    &format!(
                        "/api/gigs/{}/comments/{}",
                        self.gigs[g].app.0, self.comments[c].app.0
                    ),
                    Some(self.sessions[s].app.0),
                    &(),
                )
                .await;
                let mock_res = self
                    .mock
                    .delete_comment(self.sessions[s].mock, self.gigs[g].mock, self.comments[c].mock)
                    .await;
                compare("DeleteComment", app_res, mock_res);
            }
            FuzzOp::FetchComments { sid, gid } => {
                let s = self.session(sid).await;
                let g = self.gig(sid, gid).await;
                let app_res: Result<Vec<CommentNode>, _> = run_on_app(
                    &mut self.app,
                    "GET",
                    &format!("/api/gigs/{}/comments", self.gigs[g].app.0),
                    Some(self.sessions[s].app.0),
                    &(),
                )
                .await;
                let mock_res = self
                    .mock
                    .fetch_comments(self.sessions[s].mock, self.gigs[g].mock)
                    .await;
                compare(
                    "FetchComments",
                    app_res.map(|f| forest_shape(&f)),
                    mock_res.map(|f| forest_shape(&f)),
                );
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..100usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
