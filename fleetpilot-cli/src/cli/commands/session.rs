//! `session` command

use anyhow::{Context, Result, bail};
use colored::*;
use dialoguer::Input;
use is_terminal::IsTerminal;

use crate::cli::SessionCommands;
use crate::context::AppContext;

pub async fn handle_session_command(ctx: &AppContext, command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::Login { user } => login(ctx, user).await,
        SessionCommands::Logout => {
            ctx.client.logout().await?;
            println!("{}", "Session closed".green());
            Ok(())
        }
        SessionCommands::Status => {
            status(ctx);
            Ok(())
        }
        SessionCommands::Ping => {
            if !ctx.session.has_session() {
                bail!("No session. Run 'fleetpilot session login' first.");
            }
            if ctx.keep_alive.ping().await {
                println!("{}", "Session is alive".green());
            } else {
                println!(
                    "{} (tried {})",
                    "Keep-alive ping failed".red(),
                    ctx.keep_alive.ping_layouts().join(", ")
                );
            }
            Ok(())
        }
    }
}

async fn login(ctx: &AppContext, user: Option<String>) -> Result<()> {
    let interactive = std::io::stdin().is_terminal();
    let user = match user.or_else(|| std::env::var("FLEETPILOT_USER").ok()) {
        Some(user) if !user.trim().is_empty() => user.trim().to_string(),
        _ if interactive => Input::<String>::new()
            .with_prompt("User")
            .interact_text()
            .context("Failed to read user name")?,
        _ => bail!("No user given. Use --user or set FLEETPILOT_USER."),
    };

    let password = rpassword::prompt_password(format!("Password for {}: ", user))
        .context("Failed to read password")?;
    if password.is_empty() {
        bail!("Password is empty");
    }

    ctx.client.login(&user, &password).await?;
    println!("Logged in as {}", user.bright_green().bold());
    Ok(())
}

fn status(ctx: &AppContext) {
    let mode = if ctx.client.is_odata() { "OData" } else { "Data API" };
    println!("{} {}", format!("{:<10}", "Server:").bold(), ctx.client.base_url());
    println!("{} {}", format!("{:<10}", "Mode:").bold(), mode);
    match ctx.session.token() {
        Some(token) => {
            let user = ctx.session.user().unwrap_or_else(|| "(unknown)".to_string());
            println!("{} {}", format!("{:<10}", "User:").bold(), user.bright_green());
            println!("{} {}", format!("{:<10}", "Token:").bold(), mask_token(&token).dimmed());
        }
        None => println!("{}", "Not logged in".yellow()),
    }
}

/// Scheme and the last four characters only
fn mask_token(token: &str) -> String {
    let (scheme, secret) = token.split_once(' ').unwrap_or(("", token));
    let chars: Vec<char> = secret.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    let masked = format!("…{}", tail);
    if scheme.is_empty() {
        masked
    } else {
        format!("{} {}", scheme, masked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("Bearer abcdef123456"), "Bearer …3456");
        assert_eq!(mask_token("xyz"), "…xyz");
    }
}
