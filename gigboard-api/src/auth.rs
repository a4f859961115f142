use uuid::Uuid;

use crate::{Error, UserId};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub initial_password_hash: String,
}

impl NewUser {
    pub fn new(id: UserId, name: String, initial_password: String) -> NewUser {
        NewUser {
            id,
            name,
            initial_password_hash: bcrypt::hash(initial_password, bcrypt::DEFAULT_COST)
                .expect("failed hashing password"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.name)?;
        crate::validate_string(&self.initial_password_hash)?;
        if self.name.is_empty()
            || self
                .name
                .chars()
                .any(|c| c.is_whitespace() || c == ':' || c == '@')
        {
            return Err(Error::InvalidName(self.name.clone()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    pub user: String,
    pub password: String,
    pub device: String,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.user)?;
        crate::validate_string(&self.password)?;
        crate::validate_string(&self.device)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);
