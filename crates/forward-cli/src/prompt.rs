//! Interactive prompts.
//!
//! The tunnel-limit menu and the account login are the only points where
//! the client waits on the user. Both go through [`Prompt`] so the flows
//! that use them can be driven without a terminal.

use std::io;

use dialoguer::{Input, Password, Select};

/// Outcome of a menu selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Index into the offered items.
    Selected(usize),
    Quit,
}

/// Account credentials typed by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

pub trait Prompt: Send + Sync {
    /// Offer `items` plus a way out.
    fn choose(&self, prompt: &str, items: &[String]) -> io::Result<Choice>;

    /// Ask for the account email and password.
    fn login(&self) -> io::Result<Login>;
}

/// Terminal prompts backed by dialoguer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

const QUIT_ITEM: &str = "quit";

impl Prompt for TerminalPrompt {
    fn choose(&self, prompt: &str, items: &[String]) -> io::Result<Choice> {
        let mut entries: Vec<&str> = items.iter().map(String::as_str).collect();
        entries.push(QUIT_ITEM);

        let selection = Select::new()
            .with_prompt(prompt)
            .items(&entries)
            .default(0)
            .interact_opt()
            .map_err(io::Error::from)?;

        Ok(match selection {
            Some(index) if index < items.len() => Choice::Selected(index),
            _ => Choice::Quit,
        })
    }

    fn login(&self) -> io::Result<Login> {
        let email: String = Input::new()
            .with_prompt("Email")
            .interact_text()
            .map_err(io::Error::from)?;
        let password = Password::new()
            .with_prompt("Password")
            .interact()
            .map_err(io::Error::from)?;
        Ok(Login {
            email: email.trim().to_string(),
            password,
        })
    }
}
