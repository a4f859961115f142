use std::collections::{btree_map, BTreeMap, HashMap};

use gigboard_api::{
    comments, AuthToken, Comment, CommentDeleted, CommentId, CommentNode, EditComment, Error, Gig,
    GigId, MemDb, NewComment, NewGig, NewSession, NewUser, User, UserId, Uuid,
};

/// In-memory rendition of the gig board server, behaving like it on every route
pub struct MockServer {
    users: BTreeMap<UserId, MockUser>,
    db: MemDb,
}

#[derive(Debug)]
struct MockUser {
    name: String,
    pass: String,
    pass_hash: String,
    sessions: HashMap<AuthToken, Device>,
}

#[derive(Debug)]
struct Device(String);

/// Store failures of the in-memory db surface as server errors
fn flatten<T>(res: anyhow::Result<Result<T, Error>>) -> Result<T, Error> {
    match res {
        Ok(res) => res,
        Err(e) => Err(Error::Unknown(format!("{e:#}"))),
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            db: MemDb::new(),
        }
    }

    /// Return name & pass for user number `id`
    pub fn test_get_user_info(&self, id: usize) -> (&str, &str) {
        let u = self
            .users
            .values()
            .nth(id)
            .unwrap_or_else(|| panic!("getting user {id} among {}", self.users.len()));
        (&u.name, &u.pass)
    }

    /// Return the current number of users
    pub fn test_num_users(&self) -> usize {
        self.users.len()
    }

    pub fn admin_create_user(&mut self, u: NewUser, password: String) -> Result<(), Error> {
        u.validate()?;

        if self.users.values().any(|db| db.name == u.name) {
            return Err(Error::NameAlreadyUsed(u.name));
        }

        match self.users.entry(u.id) {
            btree_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(u.id.0)),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(MockUser {
                    name: u.name.clone(),
                    pass: password,
                    pass_hash: u.initial_password_hash,
                    sessions: HashMap::new(),
                });
                self.db.add_user(User {
                    id: u.id,
                    username: u.name,
                });
                Ok(())
            }
        }
    }

    pub fn auth(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        for u in self.users.values_mut() {
            if u.name == s.user {
                // tests (of which mock-server is a part of) don't actually use bcrypt
                if s.password != u.pass_hash {
                    return Err(Error::PermissionDenied);
                } else {
                    let tok = AuthToken(Uuid::new_v4());
                    u.sessions.insert(tok, Device(s.device));
                    return Ok(tok);
                }
            }
        }
        Err(Error::PermissionDenied)
    }

    fn resolve(&self, tok: AuthToken) -> Result<UserId, Error> {
        self.users
            .iter()
            .find(|(_, u)| u.sessions.contains_key(&tok))
            .map(|(id, _)| *id)
            .ok_or(Error::NotAuthenticated)
    }

    pub fn unauth(&mut self, tok: AuthToken) -> Result<(), Error> {
        let user = self.resolve(tok)?;
        if let Some(u) = self.users.get_mut(&user) {
            u.sessions.remove(&tok);
        }
        Ok(())
    }

    pub fn whoami(&self, tok: AuthToken) -> Result<UserId, Error> {
        self.resolve(tok)
    }

    pub fn fetch_gigs(&self, tok: AuthToken) -> Result<Vec<Gig>, Error> {
        self.resolve(tok)?;
        Ok(self.db.gigs())
    }

    pub fn fetch_gig(&self, tok: AuthToken, gig: GigId) -> Result<Gig, Error> {
        self.resolve(tok)?;
        self.db.gig(gig).cloned().ok_or(Error::GigNotFound(gig))
    }

    pub fn create_gig(&mut self, tok: AuthToken, data: NewGig) -> Result<Gig, Error> {
        let user = self.resolve(tok)?;
        data.validate()?;
        let owner = self
            .db
            .user(user)
            .cloned()
            .ok_or_else(|| Error::Unknown(format!("user {user:?} has a session but no record")))?;
        let now = gigboard_api::now();
        let gig = Gig {
            id: GigId(Uuid::new_v4()),
            owner,
            title: data.title,
            text: data.text,
            category: data.category,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_gig(gig.clone());
        Ok(gig)
    }

    fn gig_for_owner(&self, user: UserId, gig: GigId) -> Result<&Gig, Error> {
        let g = self.db.gig(gig).ok_or(Error::GigNotFound(gig))?;
        if g.owner.id != user {
            return Err(Error::PermissionDenied);
        }
        Ok(g)
    }

    pub fn update_gig(&mut self, tok: AuthToken, gig: GigId, data: NewGig) -> Result<Gig, Error> {
        let user = self.resolve(tok)?;
        self.gig_for_owner(user, gig)?;
        data.validate()?;
        self.db
            .update_gig(gig, data, gigboard_api::now())
            .ok_or(Error::GigNotFound(gig))
    }

    pub fn delete_gig(&mut self, tok: AuthToken, gig: GigId) -> Result<Gig, Error> {
        let user = self.resolve(tok)?;
        self.gig_for_owner(user, gig)?;
        self.db.remove_gig(gig).ok_or(Error::GigNotFound(gig))
    }

    pub async fn fetch_comments(
        &mut self,
        tok: AuthToken,
        gig: GigId,
    ) -> Result<Vec<CommentNode>, Error> {
        let user = self.resolve(tok)?;
        flatten(comments::list(&mut self.db, user, gig).await)
    }

    pub async fn post_comment(
        &mut self,
        tok: AuthToken,
        gig: GigId,
        data: NewComment,
    ) -> Result<Comment, Error> {
        let user = self.resolve(tok)?;
        flatten(comments::post(&mut self.db, user, gig, data).await)
    }

    pub async fn edit_comment(
        &mut self,
        tok: AuthToken,
        gig: GigId,
        comment: CommentId,
        data: EditComment,
    ) -> Result<Comment, Error> {
        let user = self.resolve(tok)?;
        flatten(comments::edit(&mut self.db, user, gig, comment, data).await)
    }

    pub async fn delete_comment(
        &mut self,
        tok: AuthToken,
        gig: GigId,
        comment: CommentId,
    ) -> Result<CommentDeleted, Error> {
        let user = self.resolve(tok)?;
        flatten(comments::delete(&mut self.db, user, gig, comment).await)?;
        Ok(CommentDeleted::new())
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}
