//! Interactive session.
//!
//! Lines are parsed with the same clap definitions as the one-shot commands.
//! Every vault command counts as activity for the idle timer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use pearanoid_vault::{LockReason, LockStatus, SessionSnapshot, VaultSession};

use crate::{cmd_generate, execute, open_session, unlock, GenerateArgs, GlobalArgs, VaultCommand};

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug)]
enum ShellCommand {
    #[command(flatten)]
    Vault(VaultCommand),

    /// Generate a random password.
    Generate(GenerateArgs),

    /// Show the session state.
    Status,

    /// Lock the vault now.
    Lock,

    /// Unlock the vault again.
    Unlock,

    /// Lock and leave.
    #[command(alias = "quit")]
    Exit,
}

/// Split a line on whitespace, keeping quoted runs together.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Resolve once the idle timer has locked the session.
async fn idle_locked(events: &mut watch::Receiver<SessionSnapshot>) {
    loop {
        if events.changed().await.is_err() {
            return std::future::pending().await;
        }
        let locked = {
            let snapshot = events.borrow_and_update();
            snapshot.status == LockStatus::Locked
                && snapshot.last_lock == Some(LockReason::IdleTimeout)
        };
        if locked {
            return;
        }
    }
}

fn print_prompt(session: &VaultSession) -> Result<()> {
    match session.status() {
        LockStatus::Unlocked => print!("pearanoid> "),
        _ => print!("pearanoid (locked)> "),
    }
    std::io::stdout().flush().context("Failed to write prompt")
}

fn print_status(session: &VaultSession) {
    let snapshot = session.snapshot();
    println!("Status:   {}", snapshot.status);
    if snapshot.status == LockStatus::Unlocked {
        println!("Entries:  {}", snapshot.entry_count);
        println!("Sections: {}", snapshot.sections.len());
    }
    if let Some(error) = &snapshot.last_error {
        println!("Last error: {}", error);
    }
}

pub(crate) async fn run(global: &GlobalArgs) -> Result<()> {
    let (session, config) = open_session(global).await?;
    unlock(&session).await?;

    println!(
        "Vault unlocked ({} entries). Type `help` for commands, `exit` to leave.",
        session.snapshot().entry_count
    );
    println!(
        "It locks after {} seconds without activity.",
        config.session.idle_timeout_secs
    );

    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_prompt(&session)?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = idle_locked(&mut events) => {
                println!();
                println!("Vault locked after inactivity. Type `unlock` to continue.");
                continue;
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let words = split_words(&line);
        if words.is_empty() {
            continue;
        }

        let parsed = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed,
            Err(e) => {
                let _ = e.print();
                continue;
            }
        };

        match parsed.command {
            ShellCommand::Exit => break,
            ShellCommand::Status => print_status(&session),
            ShellCommand::Lock => {
                session.lock().await;
                println!("Vault locked.");
            }
            ShellCommand::Unlock => {
                if session.status() == LockStatus::Unlocked {
                    println!("Vault is already unlocked.");
                } else if let Err(e) = unlock(&session).await {
                    eprintln!("Error: {:#}", e);
                }
            }
            ShellCommand::Generate(args) => {
                if let Err(e) = cmd_generate(&args) {
                    eprintln!("Error: {:#}", e);
                }
            }
            ShellCommand::Vault(command) => {
                if session.status() != LockStatus::Unlocked {
                    println!("Vault is locked. Type `unlock` to continue.");
                    continue;
                }
                session.touch_activity().await;
                if let Err(e) = execute(&session, command).await {
                    eprintln!("Error: {:#}", e);
                }
            }
        }
    }

    session.lock().await;
    println!("Vault locked. Goodbye.");
    Ok(())
}
