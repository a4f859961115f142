use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::{CommentId, GigId};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not authorized to reply in the thread of comment {0:?}")]
    CannotReplyInThread(CommentId),

    #[error("Gig not found {0:?}")]
    GigNotFound(GigId),

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Invalid identifier {0:?}")]
    InvalidId(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Comment text is required")]
    EmptyCommentText,

    #[error("Field {0} is required")]
    EmptyField(String),

    #[error("Invalid parent comment {0:?}")]
    InvalidParent(CommentId),

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::CannotReplyInThread(_) => StatusCode::FORBIDDEN,
            Error::GigNotFound(_) => StatusCode::NOT_FOUND,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidId(_) => StatusCode::BAD_REQUEST,
            Error::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Error::EmptyCommentText => StatusCode::BAD_REQUEST,
            Error::EmptyField(_) => StatusCode::BAD_REQUEST,
            Error::InvalidParent(_) => StatusCode::BAD_REQUEST,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The `type` tag of this error in its json rendering
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unknown(_) => "unknown",
            Error::NotAuthenticated => "not-authenticated",
            Error::PermissionDenied => "permission-denied",
            Error::CannotReplyInThread(_) => "cannot-reply-in-thread",
            Error::GigNotFound(_) => "gig-not-found",
            Error::CommentNotFound(_) => "comment-not-found",
            Error::InvalidId(_) => "invalid-id",
            Error::InvalidBody(_) => "invalid-body",
            Error::EmptyCommentText => "empty-comment-text",
            Error::EmptyField(_) => "empty-field",
            Error::InvalidParent(_) => "invalid-parent",
            Error::UuidAlreadyUsed(_) => "conflict-uuid",
            Error::NameAlreadyUsed(_) => "conflict-name",
            Error::NullByteInString(_) => "null-byte",
            Error::InvalidName(_) => "invalid-name",
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        let kind = self.kind();
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": kind,
            }),
            Error::NotAuthenticated => json!({
                "message": "no valid token provided",
                "type": kind,
            }),
            Error::PermissionDenied => json!({
                "message": "not authorized",
                "type": kind,
            }),
            Error::CannotReplyInThread(c) => json!({
                "message": "not authorized to reply in this thread",
                "type": kind,
                "comment": c,
            }),
            Error::GigNotFound(g) => json!({
                "message": "gig not found",
                "type": kind,
                "gig": g,
            }),
            Error::CommentNotFound(c) => json!({
                "message": "comment not found",
                "type": kind,
                "comment": c,
            }),
            Error::InvalidId(id) => json!({
                "message": "invalid identifier",
                "type": kind,
                "id": id,
            }),
            Error::InvalidBody(why) => json!({
                "message": "invalid request body",
                "type": kind,
                "details": why,
            }),
            Error::EmptyCommentText => json!({
                "message": "comment text is required",
                "type": kind,
            }),
            Error::EmptyField(f) => json!({
                "message": "a required field is empty",
                "type": kind,
                "field": f,
            }),
            Error::InvalidParent(c) => json!({
                "message": "invalid parent comment",
                "type": kind,
                "comment": c,
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": kind,
                "uuid": u,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": kind,
                "name": n,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": kind,
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a user name",
                "type": kind,
                "name": n,
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let string = |field: &str| -> anyhow::Result<String> {
            data.get(field)
                .and_then(|s| s.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error contents has no string field {field:?}"))
        };
        let uuid = |field: &str| -> anyhow::Result<Uuid> {
            Uuid::from_str(&string(field)?)
                .with_context(|| format!("error contents field {field:?} is not a uuid"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(string("message").unwrap_or_default()),
                "not-authenticated" => Error::NotAuthenticated,
                "permission-denied" => Error::PermissionDenied,
                "cannot-reply-in-thread" => Error::CannotReplyInThread(CommentId(uuid("comment")?)),
                "gig-not-found" => Error::GigNotFound(GigId(uuid("gig")?)),
                "comment-not-found" => Error::CommentNotFound(CommentId(uuid("comment")?)),
                "invalid-id" => Error::InvalidId(string("id")?),
                "invalid-body" => Error::InvalidBody(string("details")?),
                "empty-comment-text" => Error::EmptyCommentText,
                "empty-field" => Error::EmptyField(string("field")?),
                "invalid-parent" => Error::InvalidParent(CommentId(uuid("comment")?)),
                "conflict-uuid" => Error::UuidAlreadyUsed(uuid("uuid")?),
                "conflict-name" => Error::NameAlreadyUsed(string("name")?),
                "null-byte" => Error::NullByteInString(string("string")?),
                "invalid-name" => Error::InvalidName(string("name")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
