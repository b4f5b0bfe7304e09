use crate::{
    error::ChatError,
    types::{ChatEvent, SessionCommand, SessionLifecycleState},
};

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: SessionLifecycleState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            state: SessionLifecycleState::LoggedOut,
        }
    }
}

impl SessionStateMachine {
    pub fn state(&self) -> SessionLifecycleState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionLifecycleState::Connected
    }

    /// Validate `command` against the current state and advance.
    ///
    /// An accepted command that does not change state returns no events.
    pub fn apply(&mut self, command: SessionCommand) -> Result<Vec<ChatEvent>, ChatError> {
        use SessionCommand::*;
        use SessionLifecycleState::*;

        match command {
            Login | CreateUser => {
                self.transition_from_any_of(&[LoggedOut, Authenticated], Authenticating, command)
            }
            Connect => match self.state {
                Connected => Ok(Vec::new()),
                Authenticated => Ok(self.enter(Connected)),
                _ => Err(ChatError::invalid_state(self.state, command)),
            },
            Disconnect => match self.state {
                LoggedOut => Ok(Vec::new()),
                Disposed => Err(ChatError::invalid_state(self.state, command)),
                _ => Ok(self.enter(LoggedOut)),
            },
            SendMessage => {
                if self.is_connected() {
                    Ok(Vec::new())
                } else {
                    Err(ChatError::invalid_state(self.state, command))
                }
            }
            Dispose => {
                if self.state == Disposed {
                    Ok(Vec::new())
                } else {
                    Ok(self.enter(Disposed))
                }
            }
        }
    }

    pub fn on_auth_result(&mut self, success: bool) -> Result<ChatEvent, ChatError> {
        if self.state != SessionLifecycleState::Authenticating {
            return Err(ChatError::invalid_state(self.state, SessionCommand::Login));
        }

        let next = if success {
            SessionLifecycleState::Authenticated
        } else {
            SessionLifecycleState::LoggedOut
        };

        self.state = next;
        Ok(ChatEvent::StateChanged { state: next })
    }

    fn enter(&mut self, next: SessionLifecycleState) -> Vec<ChatEvent> {
        self.state = next;
        vec![ChatEvent::StateChanged { state: next }]
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[SessionLifecycleState],
        next: SessionLifecycleState,
        command: SessionCommand,
    ) -> Result<Vec<ChatEvent>, ChatError> {
        if !expected.contains(&self.state) {
            return Err(ChatError::invalid_state(self.state, command));
        }
        Ok(self.enter(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated() -> SessionStateMachine {
        let mut sm = SessionStateMachine::default();
        sm.apply(SessionCommand::Login).expect("login must work");
        sm.on_auth_result(true).expect("auth should resolve");
        sm
    }

    #[test]
    fn runs_happy_path_state_transitions() {
        let mut sm = SessionStateMachine::default();
        assert_eq!(sm.state(), SessionLifecycleState::LoggedOut);

        sm.apply(SessionCommand::Login).expect("login must work");
        assert_eq!(sm.state(), SessionLifecycleState::Authenticating);

        sm.on_auth_result(true).expect("auth should resolve");
        assert_eq!(sm.state(), SessionLifecycleState::Authenticated);

        let events = sm.apply(SessionCommand::Connect).expect("connect should work");
        assert_eq!(
            events,
            vec![ChatEvent::StateChanged {
                state: SessionLifecycleState::Connected
            }]
        );
        assert!(sm.is_connected());

        sm.apply(SessionCommand::SendMessage)
            .expect("send is allowed while connected");

        sm.apply(SessionCommand::Disconnect)
            .expect("disconnect should work");
        assert_eq!(sm.state(), SessionLifecycleState::LoggedOut);
    }

    #[test]
    fn failed_auth_returns_to_logged_out() {
        let mut sm = SessionStateMachine::default();
        sm.apply(SessionCommand::CreateUser)
            .expect("create user must work");
        let event = sm.on_auth_result(false).expect("auth should resolve");
        assert_eq!(
            event,
            ChatEvent::StateChanged {
                state: SessionLifecycleState::LoggedOut
            }
        );
    }

    #[test]
    fn rejects_connect_without_auth() {
        let mut sm = SessionStateMachine::default();
        let err = sm
            .apply(SessionCommand::Connect)
            .expect_err("connect should fail without auth");
        assert_eq!(err.code, "invalid_state_transition");
    }

    #[test]
    fn rejects_send_outside_connected_state() {
        let mut sm = authenticated();
        let err = sm
            .apply(SessionCommand::SendMessage)
            .expect_err("send should fail when not connected");
        assert_eq!(err.code, "invalid_state_transition");
    }

    #[test]
    fn connect_twice_is_an_accepted_no_op() {
        let mut sm = authenticated();
        sm.apply(SessionCommand::Connect).expect("connect");
        let events = sm.apply(SessionCommand::Connect).expect("second connect");
        assert!(events.is_empty());
        assert!(sm.is_connected());
    }

    #[test]
    fn rejects_login_while_connected_or_authenticating() {
        let mut sm = authenticated();
        sm.apply(SessionCommand::Connect).expect("connect");
        assert!(sm.apply(SessionCommand::Login).is_err());

        let mut pending = SessionStateMachine::default();
        pending.apply(SessionCommand::Login).expect("login");
        assert!(pending.apply(SessionCommand::CreateUser).is_err());
    }

    #[test]
    fn disconnect_when_logged_out_is_silent() {
        let mut sm = SessionStateMachine::default();
        let events = sm.apply(SessionCommand::Disconnect).expect("disconnect");
        assert!(events.is_empty());
    }

    #[test]
    fn dispose_is_terminal_and_idempotent() {
        let mut sm = authenticated();
        sm.apply(SessionCommand::Dispose).expect("dispose");
        assert_eq!(sm.state(), SessionLifecycleState::Disposed);

        assert!(sm.apply(SessionCommand::Dispose).expect("re-dispose").is_empty());
        assert!(sm.apply(SessionCommand::Login).is_err());
        assert!(sm.apply(SessionCommand::Disconnect).is_err());
        assert!(sm.on_auth_result(true).is_err());
    }
}
