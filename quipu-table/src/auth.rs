//! Session state shared between the auth flow and the table model.
//!
//! The auth flow owns an [`AuthController`]; consumers hold cheap
//! [`AuthWatch`] clones and await state changes.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Loading,
    SignedIn,
    SignedOut,
    Failed,
}

/// Owner side of the session state.
pub struct AuthController {
    tx: watch::Sender<AuthState>,
}

impl AuthController {
    pub fn new(initial: AuthState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, state: AuthState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            log::info!("auth state {previous:?} -> {state:?}");
        }
    }

    pub fn state(&self) -> AuthState {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> AuthWatch {
        AuthWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer side of the session state.
#[derive(Clone)]
pub struct AuthWatch {
    rx: watch::Receiver<AuthState>,
}

impl AuthWatch {
    pub fn current(&self) -> AuthState {
        *self.rx.borrow()
    }

    /// Wait for the next state change after now.
    ///
    /// Returns `None` once the controller is gone.
    pub async fn next_change(&mut self) -> Option<AuthState> {
        self.rx.borrow_and_update();
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Resolve once signed in; `false` if the controller went away first.
    pub async fn wait_signed_in(&mut self) -> bool {
        self.rx
            .wait_for(|state| *state == AuthState::SignedIn)
            .await
            .is_ok()
    }
}
