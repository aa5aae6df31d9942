//! Application controller: which screen is showing and how screens hand off.

use crate::lockout::{LockoutPolicy, LockoutTick};
use crate::screens::{
    AccountCreator, SetupEvent, SetupScreen, UnlockHandler, UnlockOutcome, UnlockScreen,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Shown when account creation behind a confirmed PIN fails
pub const CREATE_FAILED_MESSAGE: &str = "Failed to create wallet. Please try again.";

/// Everything the screens need from the host
#[async_trait]
pub trait AccountBackend: UnlockHandler + AccountCreator {
    fn wallet_exists(&self) -> bool;

    /// Forget any unlocked state
    async fn lock(&self);
}

#[derive(Debug)]
pub enum Screen {
    /// Choose between logging in and creating a wallet
    Selection,
    Login(UnlockScreen),
    Setup(SetupScreen),
    Home { address: String },
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Selection => "selection",
            Screen::Login(_) => "login",
            Screen::Setup(_) => "setup",
            Screen::Home { .. } => "home",
        }
    }
}

pub struct App<B: AccountBackend> {
    backend: Arc<B>,
    policy: LockoutPolicy,
    screen: Screen,
}

impl<B: AccountBackend> App<B> {
    pub fn new(backend: Arc<B>, policy: LockoutPolicy) -> Self {
        Self {
            backend,
            policy,
            screen: Screen::Selection,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// First screen: login when a wallet exists, selection otherwise
    pub fn start(&mut self) {
        if self.backend.wallet_exists() {
            self.choose_login();
        } else {
            self.screen = Screen::Selection;
        }
        info!("Starting on {} screen", self.screen.name());
    }

    pub fn choose_login(&mut self) {
        self.screen = Screen::Login(UnlockScreen::new(self.policy));
    }

    pub fn choose_create(&mut self) {
        self.screen = Screen::Setup(SetupScreen::new());
    }

    pub fn back_to_selection(&mut self) {
        self.screen = Screen::Selection;
    }

    /// Submit a completed unlock PIN
    pub async fn submit_unlock(&mut self, value: &str) -> UnlockOutcome {
        let Screen::Login(unlock) = &mut self.screen else {
            return UnlockOutcome::Ignored;
        };

        let outcome = unlock.submit(value, self.backend.as_ref()).await;
        match &outcome {
            UnlockOutcome::Unlocked { address } => {
                self.screen = Screen::Home {
                    address: address.clone(),
                };
            }
            UnlockOutcome::ReturnToStart => self.screen = Screen::Selection,
            _ => {}
        }
        outcome
    }

    /// First setup PIN completed
    pub fn enter_setup_pin(&mut self, value: &str) -> SetupEvent {
        match &mut self.screen {
            Screen::Setup(setup) => setup.handle_pin_entered(value),
            _ => SetupEvent::Ignored,
        }
    }

    /// Confirmation PIN completed; creates the account on a match
    ///
    /// Creation is attempted at most once per setup session.
    pub async fn confirm_setup_pin(&mut self, value: &str) -> SetupEvent {
        let event = match &mut self.screen {
            Screen::Setup(setup) => setup.handle_pin_confirmed(value),
            _ => return SetupEvent::Ignored,
        };

        if let SetupEvent::Confirmed(pin) = &event {
            match self.backend.create_account(pin).await {
                Ok(address) => {
                    info!("Wallet created");
                    self.screen = Screen::Home { address };
                }
                Err(e) => {
                    warn!("Wallet creation failed: {}", e);
                    if let Screen::Setup(setup) = &mut self.screen {
                        setup.creation_failed(CREATE_FAILED_MESSAGE);
                    }
                }
            }
        }
        event
    }

    /// One second of lockout countdown on the login screen
    pub fn tick(&mut self) -> LockoutTick {
        match &mut self.screen {
            Screen::Login(unlock) => unlock.tick(),
            _ => LockoutTick::Idle,
        }
    }

    /// Lock the wallet and return to login
    pub async fn lock(&mut self) {
        self.backend.lock().await;
        self.choose_login();
    }
}
