use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{AuditEvent, RefreshToken, Session, User};
use crate::services::store::{StoreError, TokenContext, TokenStore, TokenStoreTx};

/// In-process token store used by the integration test harness. It mirrors
/// the PostgreSQL store's contention contract: a transaction try-locks its
/// session and a second transaction touching the same session gets the
/// `NotFound` sentinel instead of blocking, exactly like `FOR UPDATE
/// NOWAIT`.
#[derive(Default)]
pub struct MemoryTokenStore {
    state: Arc<Mutex<MemoryState>>,
    locked_sessions: Arc<Mutex<HashSet<Uuid>>>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    /// Keyed by wire token string, like the unique index on the table.
    tokens: BTreeMap<String, RefreshToken>,
    audit_log: Vec<AuditEvent>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct session insert for tests that need a preset `not_after`.
    pub fn insert_session(&self, session: Session) {
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(session.id, session);
    }

    /// Direct token insert for tests that need hand-built chains.
    pub fn insert_refresh_token(&self, token: RefreshToken) {
        self.state
            .lock()
            .unwrap()
            .tokens
            .insert(token.token.clone(), token);
    }

    pub fn update_session<F: FnOnce(&mut Session)>(&self, session_id: Uuid, f: F) {
        let mut state = self.state.lock().unwrap();
        if let Some(session) = state.sessions.get_mut(&session_id) {
            f(session);
        }
    }

    pub fn update_user<F: FnOnce(&mut User)>(&self, user_id: Uuid, f: F) {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.get_mut(&user_id) {
            f(user);
        }
    }

    pub fn find_refresh_token(&self, token: &str) -> Option<RefreshToken> {
        self.state.lock().unwrap().tokens.get(token).cloned()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.lock().unwrap().audit_log.clone()
    }
}

fn token_context(state: &MemoryState, token: &str) -> Result<TokenContext, StoreError> {
    let token_row = state.tokens.get(token).cloned().ok_or(StoreError::NotFound)?;
    let session = state
        .sessions
        .get(&token_row.session_id)
        .cloned()
        .ok_or(StoreError::NotFound)?;
    let user = state
        .users
        .get(&token_row.user_id)
        .cloned()
        .ok_or(StoreError::NotFound)?;
    Ok(TokenContext {
        user,
        token: token_row,
        session,
    })
}

/// Tokens connected to the anchor through `parent` references, walked in
/// both directions within the anchor's session.
fn family_members(state: &MemoryState, anchor: &RefreshToken) -> HashSet<String> {
    let session_tokens: Vec<&RefreshToken> = state
        .tokens
        .values()
        .filter(|t| t.session_id == anchor.session_id)
        .collect();

    let mut members = HashSet::new();
    let mut frontier = vec![anchor.token.clone()];
    while let Some(current) = frontier.pop() {
        if !members.insert(current.clone()) {
            continue;
        }
        for t in &session_tokens {
            if t.parent.as_deref() == Some(current.as_str()) {
                frontier.push(t.token.clone());
            }
            if t.token == current {
                if let Some(parent) = &t.parent {
                    frontier.push(parent.clone());
                }
            }
        }
    }
    members
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user_with_refresh_token(
        &self,
        token: &str,
    ) -> Result<TokenContext, StoreError> {
        let state = self.state.lock().unwrap();
        token_context(&state, token)
    }

    async fn begin(&self) -> Result<Box<dyn TokenStoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            locked_sessions: Arc::clone(&self.locked_sessions),
            held: None,
            pending: Vec::new(),
            finished: false,
        }))
    }

    async fn grant_authenticated_user(&self, user: &User) -> Result<RefreshToken, StoreError> {
        let mut state = self.state.lock().unwrap();
        let session = Session::new(user.id);
        let token = RefreshToken::root(user.id, session.id);
        state.sessions.insert(session.id, session);
        state.tokens.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(user.id, user.clone());
        Ok(())
    }

    async fn session_refresh_tokens(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut tokens: Vec<RefreshToken> = state
            .tokens
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        Ok(tokens)
    }
}

enum Mutation {
    RevokeToken(String),
    InsertToken(RefreshToken),
    Audit(AuditEvent),
}

pub struct MemoryTx {
    state: Arc<Mutex<MemoryState>>,
    locked_sessions: Arc<Mutex<HashSet<Uuid>>>,
    held: Option<Uuid>,
    pending: Vec<Mutation>,
    finished: bool,
}

impl MemoryTx {
    fn release(&mut self) {
        if let Some(session_id) = self.held.take() {
            self.locked_sessions.lock().unwrap().remove(&session_id);
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        // An abandoned transaction (client disconnect, early return) must
        // not leave the session locked.
        if !self.finished {
            self.release();
        }
    }
}

#[async_trait]
impl TokenStoreTx for MemoryTx {
    async fn find_user_with_refresh_token_for_update(
        &mut self,
        token: &str,
    ) -> Result<TokenContext, StoreError> {
        let ctx = {
            let state = self.state.lock().unwrap();
            token_context(&state, token)?
        };

        if self.held != Some(ctx.session.id) {
            let mut locked = self.locked_sessions.lock().unwrap();
            if locked.contains(&ctx.session.id) {
                // Another transaction holds the session; surface the
                // retryable sentinel rather than waiting.
                return Err(StoreError::NotFound);
            }
            locked.insert(ctx.session.id);
            self.held = Some(ctx.session.id);
        }

        Ok(ctx)
    }

    async fn find_currently_active_refresh_token(
        &mut self,
        session_id: Uuid,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut active: Vec<&RefreshToken> = state
            .tokens
            .values()
            .filter(|t| t.session_id == session_id && !t.revoked)
            .collect();
        active.sort_by_key(|t| t.created_at);
        Ok(active.last().map(|t| (*t).clone()))
    }

    async fn grant_refresh_token_swap(
        &mut self,
        _user: &User,
        prior: &RefreshToken,
    ) -> Result<RefreshToken, StoreError> {
        let child = RefreshToken::child_of(prior);
        self.pending.push(Mutation::RevokeToken(prior.token.clone()));
        self.pending.push(Mutation::InsertToken(child.clone()));
        Ok(child)
    }

    async fn revoke_token_family(&mut self, anchor: &RefreshToken) -> Result<(), StoreError> {
        let members = {
            let state = self.state.lock().unwrap();
            family_members(&state, anchor)
        };
        for token in members {
            self.pending.push(Mutation::RevokeToken(token));
        }
        Ok(())
    }

    async fn record_audit_event(&mut self, event: AuditEvent) -> Result<(), StoreError> {
        self.pending.push(Mutation::Audit(event));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        {
            let mut state = this.state.lock().unwrap();
            for mutation in this.pending.drain(..) {
                match mutation {
                    Mutation::RevokeToken(token) => {
                        if let Some(row) = state.tokens.get_mut(&token) {
                            if !row.revoked {
                                row.revoked = true;
                                row.updated_at = Utc::now();
                            }
                        }
                    }
                    Mutation::InsertToken(token) => {
                        state.tokens.insert(token.token.clone(), token);
                    }
                    Mutation::Audit(event) => {
                        state.audit_log.push(event);
                    }
                }
            }
        }
        this.release();
        this.finished = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.pending.clear();
        this.release();
        this.finished = true;
        Ok(())
    }
}
