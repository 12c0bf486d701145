use anyhow::{Result, bail};
use keyward::Password;
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PIN_ENV: &str = "KEYWARD_PIN";
pub const PASSPHRASE_ENV: &str = "KEYWARD_PASSPHRASE";

/// Whether a failed unlock can be retried by prompting again.
pub fn is_interactive() -> bool {
    std::env::var_os(PIN_ENV).is_none() && io::stdin().is_terminal()
}

/// A secret set in the environment, if any.
pub fn from_env(var: &str) -> Option<Password> {
    //  KEYWARD_PIN=1234 KEYWARD_PASSPHRASE="..." keyward encrypt github.com
    let value = Zeroizing::new(std::env::var(var).ok()?);
    if value.is_empty() {
        return None;
    }
    Some(Password::new(&value))
}

pub fn read_secret(var: &str, prompt: &str) -> Result<Password> {
    if let Some(secret) = from_env(var) {
        return Ok(secret);
    }

    //  stdin (Pipeline)
    //  printf '1234\nmy passphrase\n' | keyward encrypt github.com
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(Password::new(&buf));
        }
    }

    if io::stdin().is_terminal() {
        let secret = Zeroizing::new(rpassword::prompt_password(prompt)?);
        if !secret.is_empty() {
            return Ok(Password::new(&secret));
        }
    }

    bail!("no {} provided", label(prompt))
}

/// Reads a new secret twice; piped input gives it on two lines.
pub fn read_new_secret(var: &str, prompt: &str) -> Result<Password> {
    if let Some(secret) = from_env(var) {
        return Ok(secret);
    }

    let name = label(prompt);

    if !io::stdin().is_terminal() {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut first = Zeroizing::new(String::new());
        let mut second = Zeroizing::new(String::new());

        handle.read_line(&mut first)?;
        handle.read_line(&mut second)?;

        trim_newline(&mut first);
        trim_newline(&mut second);

        return confirm(name, &first, &second);
    }

    let first = Zeroizing::new(rpassword::prompt_password(format!("New {prompt}"))?);
    let second = Zeroizing::new(rpassword::prompt_password(format!("Confirm {prompt}"))?);

    confirm(name, &first, &second)
}

fn confirm(name: &str, first: &str, second: &str) -> Result<Password> {
    if first.is_empty() {
        bail!("{name} cannot be empty");
    }

    if first != second {
        bail!("{name}s do not match");
    }

    Ok(Password::new(first))
}

// "PIN: " -> "PIN"
fn label(prompt: &str) -> &str {
    prompt.trim_end().trim_end_matches(':')
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
