//! Polling chat session over a user service and a message service.
//!
//! A [`ChatSession`] logs a user in, runs one poll loop while connected, and
//! turns each fetched history into at most one [`ChatEvent`] for its
//! subscribers.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chat_core::{
    ChatError, ChatEvent, ChatMessage, ChatUser, EventStream, MessageSnapshot, SessionCommand,
    SessionConfig, SessionEvents, SessionLifecycleState, SessionStateMachine,
};
use chat_services::{MessageService, UserService};
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug)]
struct RunningPollTask {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct SessionState {
    machine: SessionStateMachine,
    current_user: Option<ChatUser>,
    snapshot: MessageSnapshot,
    /// Kept after cancellation so `shutdown` can still await it.
    poll_task: Option<RunningPollTask>,
    /// Bumped by every login attempt and teardown; an auth result only
    /// applies while the epoch it started under is current.
    auth_epoch: u64,
}

/// State shared between the public surface and the poll task.
///
/// Snapshot updates and event emission happen under the same lock that
/// teardown takes, so no event leaves the session after teardown returns.
#[derive(Debug)]
struct Shared {
    state: Mutex<SessionState>,
    events: SessionEvents,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_all(&self, events: Vec<ChatEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }

    /// Diff one fetched history. Returns `false` once the loop must stop.
    fn apply_tick(
        &self,
        fetched: Vec<ChatMessage>,
        user_name: &str,
        stop: &CancellationToken,
    ) -> bool {
        let mut state = self.lock();
        if stop.is_cancelled() {
            return false;
        }

        trace!(count = fetched.len(), "poll tick fetched history");
        if let Some(event) = state.snapshot.observe(fetched, user_name) {
            debug!(
                ?event,
                subscribers = self.events.subscriber_count(),
                "emitting chat event"
            );
            self.events.emit(event);
        }
        true
    }
}

/// Settles an in-flight authentication as failed if its future is dropped.
struct PendingAuth<'a> {
    shared: &'a Shared,
    epoch: u64,
    settled: bool,
}

impl Drop for PendingAuth<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.shared.lock();
        if state.auth_epoch != self.epoch {
            return;
        }
        if let Ok(event) = state.machine.on_auth_result(false) {
            self.shared.events.emit(event);
        }
    }
}

/// Chat client session: one logged-in user, one poll loop, one event stream.
///
/// Dropping the session disposes it.
pub struct ChatSession {
    users: Arc<dyn UserService>,
    messages: Arc<dyn MessageService>,
    config: SessionConfig,
    shared: Arc<Shared>,
}

impl ChatSession {
    /// Session with the default [`SessionConfig`].
    pub fn new(users: Arc<dyn UserService>, messages: Arc<dyn MessageService>) -> Self {
        Self::with_config(users, messages, SessionConfig::default())
    }

    /// Session tuned by `config`.
    pub fn with_config(
        users: Arc<dyn UserService>,
        messages: Arc<dyn MessageService>,
        config: SessionConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState {
                machine: SessionStateMachine::default(),
                current_user: None,
                snapshot: MessageSnapshot::from_config(&config),
                poll_task: None,
                auth_epoch: 0,
            }),
            events: SessionEvents::new(config.event_buffer),
        });

        Self {
            users,
            messages,
            config,
            shared,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventStream {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> SessionLifecycleState {
        self.shared.lock().machine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().machine.is_connected()
    }

    pub fn current_user(&self) -> Option<ChatUser> {
        self.shared.lock().current_user.clone()
    }

    /// Log in with the user service.
    ///
    /// A blank `username` is rejected before any service call. Every other
    /// failure, including credentials the service refuses, yields `Ok(false)`.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool, ChatError> {
        self.authenticate(SessionCommand::Login, username, password)
            .await
    }

    /// Register a new account; on success the session holds its identity.
    pub async fn create_user(&self, username: &str, password: &str) -> Result<bool, ChatError> {
        self.authenticate(SessionCommand::CreateUser, username, password)
            .await
    }

    /// Start polling for the logged-in user.
    ///
    /// Returns whether the session is connected afterwards. Without a logged-in
    /// user this is a no-op; while already connected no second loop starts.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            warn!("connect ignored: no Tokio runtime available for the poll loop");
            return false;
        };

        let mut state = self.shared.lock();
        let events = match state.machine.apply(SessionCommand::Connect) {
            Ok(events) => events,
            Err(err) => {
                debug!(code = %err.code, state = ?state.machine.state(), "connect ignored");
                return false;
            }
        };
        if events.is_empty() {
            debug!("connect ignored: poll loop already running");
            return true;
        }

        let Some(user_name) = state.current_user.as_ref().map(|user| user.name.clone()) else {
            warn!("connect aborted: authenticated session holds no user");
            if let Ok(events) = state.machine.apply(SessionCommand::Disconnect) {
                self.shared.emit_all(events);
            }
            return false;
        };

        state.snapshot.reset();
        let interval = self.config.effective_poll_interval();
        let stop = CancellationToken::new();
        let task = runtime.spawn(run_poll_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.messages),
            user_name.clone(),
            interval,
            stop.child_token(),
        ));
        state.poll_task = Some(RunningPollTask { stop, task });

        info!(user = %user_name, ?interval, "chat session connected");
        self.shared.emit_all(events);
        true
    }

    /// Stop polling and release the current user. Safe from any state.
    pub fn disconnect(&self) {
        if let Ok(true) = self.tear_down(SessionCommand::Disconnect) {
            info!("chat session disconnected");
        }
    }

    /// Terminal teardown; later calls are no-ops.
    pub fn dispose(&self) {
        let _ = self.tear_down(SessionCommand::Dispose);
    }

    /// Dispose and wait for the poll task to finish, even if the session
    /// was already disposed.
    pub async fn shutdown(&self) {
        let _ = self.tear_down(SessionCommand::Dispose);
        let running = self.shared.lock().poll_task.take();
        if let Some(running) = running {
            let _ = running.task.await;
        }
    }

    /// Send `body` as the logged-in user.
    ///
    /// Returns `false` without contacting the message service unless the
    /// session is logged in and connected.
    pub async fn send_message(&self, body: &str) -> bool {
        let author = {
            let mut state = self.shared.lock();
            if let Err(err) = state.machine.apply(SessionCommand::SendMessage) {
                debug!(code = %err.code, "send refused");
                return false;
            }
            match &state.current_user {
                Some(user) => user.name.clone(),
                None => return false,
            }
        };

        let message = ChatMessage::new(author, body);
        match self.messages.send_message(&message).await {
            Ok(accepted) => {
                if !accepted {
                    debug!("message service declined message");
                }
                accepted
            }
            Err(err) => {
                warn!(code = %err.code, error = %err, "send failed");
                false
            }
        }
    }

    async fn authenticate(
        &self,
        command: SessionCommand,
        username: &str,
        password: &str,
    ) -> Result<bool, ChatError> {
        if username.trim().is_empty() {
            return Err(ChatError::invalid_argument("username"));
        }

        let epoch = {
            let mut state = self.shared.lock();
            match state.machine.apply(command) {
                Ok(events) => {
                    state.auth_epoch += 1;
                    if state.current_user.take().is_some() {
                        self.messages.set_identity(None);
                    }
                    self.shared.emit_all(events);
                }
                Err(err) => {
                    warn!(code = %err.code, ?command, "authentication refused");
                    return Ok(false);
                }
            }
            state.auth_epoch
        };

        let mut pending = PendingAuth {
            shared: &self.shared,
            epoch,
            settled: false,
        };
        let result = match command {
            SessionCommand::CreateUser => self.users.create_user(username, password).await,
            _ => self.users.login(username, password).await,
        };
        pending.settled = true;

        let mut state = self.shared.lock();
        if state.auth_epoch != epoch {
            debug!(user = %username, "authentication result discarded: superseded attempt");
            return Ok(false);
        }
        match state.machine.on_auth_result(result.is_ok()) {
            Ok(event) => self.shared.events.emit(event),
            Err(_) => {
                debug!(user = %username, "authentication result discarded: session moved on");
                return Ok(false);
            }
        }

        match result {
            Ok(user) => {
                info!(user = %user.name, ?command, "authenticated");
                self.messages.set_identity(Some(&user));
                state.current_user = Some(user);
                Ok(true)
            }
            Err(err) => {
                warn!(user = %username, code = %err.code, "authentication failed");
                Ok(false)
            }
        }
    }

    /// Apply `Disconnect`/`Dispose`; returns whether a running poll loop was stopped.
    fn tear_down(&self, command: SessionCommand) -> Result<bool, ChatError> {
        let mut state = self.shared.lock();
        let events = state.machine.apply(command).inspect_err(|err| {
            trace!(code = %err.code, ?command, "teardown ignored");
        })?;

        state.auth_epoch += 1;
        let stopped = match &state.poll_task {
            Some(running) if !running.stop.is_cancelled() => {
                running.stop.cancel();
                true
            }
            _ => false,
        };
        if state.current_user.take().is_some() {
            self.messages.set_identity(None);
        }
        state.snapshot.reset();
        self.shared.emit_all(events);

        Ok(stopped)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_poll_loop(
    shared: Arc<Shared>,
    messages: Arc<dyn MessageService>,
    user_name: String,
    interval: Duration,
    stop: CancellationToken,
) {
    debug!(user = %user_name, "poll loop started");

    loop {
        let fetched = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            result = messages.fetch_messages() => result,
        };

        match fetched {
            Ok(fetched) => {
                if !shared.apply_tick(fetched, &user_name, &stop) {
                    break;
                }
            }
            Err(err) => {
                warn!(
                    code = %err.code,
                    transient = err.is_transient(),
                    error = %err,
                    "message fetch failed, retrying next tick"
                );
            }
        }

        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(user = %user_name, "poll loop stopped");
}
