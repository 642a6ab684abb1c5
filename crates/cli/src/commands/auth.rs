//! Account commands.
//!
//! # Usage
//!
//! ```bash
//! classbook signup -n "Ada Lovelace" -e ada@example.com -p 'correct horse'
//! classbook login -e ada@example.com -p 'correct horse'
//! classbook whoami
//! classbook status
//! classbook logout
//! ```

use std::io::Write;

use classbook_client::{SessionManager, SessionStatus};
use secrecy::SecretString;

use super::CommandResult;

pub async fn signup(
    session: &SessionManager,
    out: &mut impl Write,
    name: &str,
    email: &str,
    password: &SecretString,
) -> CommandResult {
    let user = session.signup(name, email, password).await?;
    writeln!(
        out,
        "Account created for {}. Log in with `classbook login`.",
        user.name
    )?;
    Ok(())
}

pub async fn login(
    session: &SessionManager,
    out: &mut impl Write,
    email: &str,
    password: &SecretString,
) -> CommandResult {
    let user = session.login(email, password).await?;
    writeln!(out, "{}", user.greeting())?;
    Ok(())
}

pub async fn logout(session: &SessionManager, out: &mut impl Write) -> CommandResult {
    session.logout().await?;
    writeln!(out, "Logged out.")?;
    Ok(())
}

pub async fn whoami(session: &SessionManager, out: &mut impl Write) -> CommandResult {
    match session.current_user().await? {
        Some(user) => {
            write!(out, "{} (id {})", user.name, user.id)?;
            if let Some(email) = &user.email {
                write!(out, " <{email}>")?;
            }
            writeln!(out)?;
        }
        None => writeln!(out, "Not logged in.")?,
    }
    Ok(())
}

pub async fn status(session: &SessionManager, out: &mut impl Write) -> CommandResult {
    let status = session.status().await?;
    write_status(out, &status)?;
    writeln!(
        out,
        "On rejected refresh: {}",
        session.refresh_rejected_policy()
    )?;
    Ok(())
}

fn write_status(out: &mut impl Write, status: &SessionStatus) -> std::io::Result<()> {
    let state = if status.authenticated {
        "logged in"
    } else if status.partial {
        "incomplete (one token missing; log in again)"
    } else {
        "logged out"
    };
    writeln!(out, "Session: {state}")?;
    if let Some(user) = &status.user {
        writeln!(out, "User: {} (id {})", user.name, user.id)?;
    }
    Ok(())
}
