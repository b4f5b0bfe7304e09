//! Collaborator services consumed by the chat session.
//!
//! [`UserService`] verifies credentials and registers accounts,
//! [`MessageService`] sends and fetches chat history. In-memory
//! implementations live here; HTTP clients live in [`http`].

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chat_core::{ChatError, ChatErrorCategory, ChatMessage, ChatUser};

/// HTTP clients for a remote chat API.
pub mod http;

pub use http::{HttpMessageService, HttpUserService};

#[async_trait]
pub trait UserService: Send + Sync {
    /// Verify credentials; rejected credentials are an `Auth` error.
    async fn login(&self, username: &str, password: &str) -> Result<ChatUser, ChatError>;

    /// Register a new account and return its identity.
    async fn create_user(&self, username: &str, password: &str) -> Result<ChatUser, ChatError>;
}

#[async_trait]
pub trait MessageService: Send + Sync {
    /// Post one message; `Ok(false)` means the service declined it.
    async fn send_message(&self, message: &ChatMessage) -> Result<bool, ChatError>;

    /// Fetch the full history in service order.
    async fn fetch_messages(&self) -> Result<Vec<ChatMessage>, ChatError>;

    /// Bind (or clear) the identity used to authorize later calls.
    fn set_identity(&self, _user: Option<&ChatUser>) {}
}

fn poisoned() -> ChatError {
    ChatError::new(ChatErrorCategory::Internal, "poisoned_lock", "poisoned lock")
}

fn invalid_credentials() -> ChatError {
    ChatError::new(
        ChatErrorCategory::Auth,
        "invalid_credentials",
        "username or password rejected",
    )
}

/// Account registry kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryUserService {
    accounts: Arc<RwLock<HashMap<String, String>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryUserService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register an account.
    pub fn with_account(self, username: &str, password: &str) -> Self {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(username.to_owned(), password.to_owned());
        }
        self
    }

    /// Number of `login`/`create_user` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn login(&self, username: &str, password: &str) -> Result<ChatUser, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if password.is_empty() {
            return Err(invalid_credentials());
        }

        let accounts = self.accounts.read().map_err(|_| poisoned())?;
        match accounts.get(username) {
            Some(stored) if stored == password => Ok(ChatUser::new(username)),
            _ => Err(invalid_credentials()),
        }
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<ChatUser, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if password.is_empty() {
            return Err(invalid_credentials());
        }

        let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
        if accounts.contains_key(username) {
            return Err(ChatError::new(
                ChatErrorCategory::Config,
                "user_exists",
                format!("user '{username}' already exists"),
            ));
        }
        accounts.insert(username.to_owned(), password.to_owned());
        Ok(ChatUser::new(username))
    }
}

/// Shared chat history kept in process memory.
///
/// Clones share the same history and counters, so a test can keep one handle
/// while a session owns another.
#[derive(Clone, Default)]
pub struct InMemoryMessageService {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
    send_calls: Arc<AtomicUsize>,
    fetch_calls: Arc<AtomicUsize>,
    failing_fetches: Arc<AtomicUsize>,
    reject_sends: Arc<AtomicBool>,
}

impl InMemoryMessageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        let service = Self::default();
        service.replace_messages(messages);
        service
    }

    /// Swap the whole history, as if the remote side rewrote it.
    pub fn replace_messages(&self, messages: Vec<ChatMessage>) {
        if let Ok(mut current) = self.messages.write() {
            *current = messages;
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .read()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Make the next `count` fetches fail with a network error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Make `send_message` answer `Ok(false)` without storing anything.
    pub fn set_reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageService for InMemoryMessageService {
    async fn send_message(&self, message: &ChatMessage) -> Result<bool, ChatError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_sends.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let mut messages = self.messages.write().map_err(|_| poisoned())?;
        messages.push(message.clone());
        Ok(true)
    }

    async fn fetch_messages(&self) -> Result<Vec<ChatMessage>, ChatError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ChatError::new(
                ChatErrorCategory::Network,
                "fetch_failed",
                "simulated fetch outage",
            ));
        }

        let messages = self.messages.read().map_err(|_| poisoned())?;
        Ok(messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_accepts_registered_credentials_only() {
        let users = InMemoryUserService::new().with_account("Usuario1", "P2ssw0rd!");

        let user = users
            .login("Usuario1", "P2ssw0rd!")
            .await
            .expect("login should work");
        assert_eq!(user, ChatUser::new("Usuario1"));

        let err = users
            .login("Usuario1", "wrong")
            .await
            .expect_err("wrong password must fail");
        assert_eq!(err.category, ChatErrorCategory::Auth);

        let err = users
            .login("Usuario2", "")
            .await
            .expect_err("empty password must fail");
        assert_eq!(err.code, "invalid_credentials");
        assert_eq!(users.calls(), 3);
    }

    #[tokio::test]
    async fn create_user_registers_and_rejects_duplicates() {
        let users = InMemoryUserService::new();
        let user = users
            .create_user("Usuario1", "P2ssw0rd!")
            .await
            .expect("create should work");
        assert_eq!(user.name, "Usuario1");

        users
            .login("Usuario1", "P2ssw0rd!")
            .await
            .expect("new account can log in");

        let err = users
            .create_user("Usuario1", "other")
            .await
            .expect_err("duplicate must fail");
        assert_eq!(err.code, "user_exists");

        let err = users
            .create_user("Usuario2", "")
            .await
            .expect_err("empty password must fail");
        assert_eq!(err.category, ChatErrorCategory::Auth);
    }

    #[tokio::test]
    async fn clones_share_history_and_counters() {
        let service = InMemoryMessageService::new();
        let handle = service.clone();

        assert!(
            service
                .send_message(&ChatMessage::new("Usuario1", "Message1"))
                .await
                .expect("send should work")
        );

        assert_eq!(handle.messages().len(), 1);
        assert_eq!(handle.send_calls(), 1);
        assert_eq!(handle.fetch_messages().await.expect("fetch").len(), 1);
        assert_eq!(service.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn simulated_fetch_failures_run_out() {
        let service = InMemoryMessageService::with_messages(vec![ChatMessage::new("a", "b")]);
        service.fail_next_fetches(2);

        assert!(service.fetch_messages().await.is_err());
        let err = service.fetch_messages().await.expect_err("second fails too");
        assert!(err.is_transient());
        assert_eq!(service.fetch_messages().await.expect("recovers").len(), 1);
    }

    #[tokio::test]
    async fn rejected_sends_are_not_stored() {
        let service = InMemoryMessageService::new();
        service.set_reject_sends(true);

        let accepted = service
            .send_message(&ChatMessage::new("Usuario1", "nope"))
            .await
            .expect("send resolves");
        assert!(!accepted);
        assert!(service.messages().is_empty());
    }
}
