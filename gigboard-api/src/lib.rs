use chrono::{SubsecRound, Utc};
use std::str::FromStr;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod auth;
pub mod cascade;
mod comment;
pub mod comments;
mod db;
mod error;
mod gig;
mod mem;
pub mod thread;
pub mod tree;
pub mod visibility;

pub use auth::{AuthToken, NewSession, NewUser};
pub use comment::{
    validate_comment_text, Comment, CommentDeleted, CommentNode, EditComment, NewComment,
    NewCommentRecord,
};
pub use db::Db;
pub use error::Error;
pub use gig::{Category, Gig, NewGig};
pub use mem::MemDb;

/// Current time, truncated to the microsecond precision postgres stores
pub fn now() -> Time {
    Utc::now().trunc_subsecs(6)
}

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        Err(Error::NullByteInString(String::from(s)))
    } else {
        Ok(())
    }
}

/// Parses json without serde_json's nesting limit, which comment threads can go past
pub fn json_from_slice<T: serde::de::DeserializeOwned>(body: &[u8]) -> serde_json::Result<T> {
    let mut de = serde_json::Deserializer::from_slice(body);
    de.disable_recursion_limit();
    let res: T = serde::Deserialize::deserialize(&mut de)?;
    de.end()?;
    Ok(res)
}

fn parse_uuid(s: &str) -> Result<Uuid, Error> {
    Uuid::from_str(s).map_err(|_| Error::InvalidId(String::from(s)))
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct GigId(pub Uuid);

impl GigId {
    pub fn stub() -> GigId {
        GigId(STUB_UUID)
    }

    /// Parses a gig id coming from an url path segment
    pub fn parse(s: &str) -> Result<GigId, Error> {
        parse_uuid(s).map(GigId)
    }
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }

    /// Parses a comment id coming from an url path segment
    pub fn parse(s: &str) -> Result<CommentId, Error> {
        parse_uuid(s).map(CommentId)
    }
}
