//! cli::commands::logout
//!
//! Remove the stored credential.
//!
//! Succeeds when nothing is stored. Environment credentials keep working
//! after logout, so their presence is reported.

use anyhow::{Context as _, Result};

use super::{open_store, Context};
use crate::core::env::EnvCredentials;
use crate::ui::output;

/// Run the logout command.
pub fn logout(ctx: &Context) -> Result<()> {
    let v = ctx.verbosity;
    let store = open_store()?;
    let existed = store.exists();

    store.remove().context("Failed to remove stored credentials")?;

    if existed {
        output::success(
            format!("Logged out. Removed {}", store.path().display()),
            v,
        );
    } else {
        output::print("No stored credentials.", v);
    }

    if let Some((_, origin)) = EnvCredentials::from_env().static_credential() {
        output::warn(
            format!("credentials from the {} are still active", origin),
            v,
        );
    }

    Ok(())
}
