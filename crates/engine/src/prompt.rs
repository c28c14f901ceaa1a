//! Interactive prompts.

use std::io;
use std::sync::Mutex;

use dialoguer::Confirm;
use zeroize::Zeroizing;

/// Source of interactive answers.
///
/// Both methods block; pipelines call them from `spawn_blocking`.
pub trait Prompter: Send + Sync {
    /// Reads a secret without echoing it.
    fn passphrase(&self, prompt: &str) -> io::Result<Zeroizing<String>>;

    /// Asks a yes/no question.
    fn confirm(&self, prompt: &str, default: bool) -> io::Result<bool>;
}

/// Prompts on the controlling terminal.
///
/// Prompts from concurrent workers are serialised so they never interleave.
#[derive(Debug, Default)]
pub struct TerminalPrompter {
    lock: Mutex<()>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prompter for TerminalPrompter {
    fn passphrase(&self, prompt: &str) -> io::Result<Zeroizing<String>> {
        let _guard = self.lock.lock().unwrap();
        rpassword::prompt_password(prompt).map(Zeroizing::new)
    }

    fn confirm(&self, prompt: &str, default: bool) -> io::Result<bool> {
        let _guard = self.lock.lock().unwrap();
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}
