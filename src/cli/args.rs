//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};

/// bbkt - Bitbucket Cloud from the command line
#[derive(Parser, Debug)]
#[command(name = "bbkt")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in with an API token, app password, or OAuth
    #[command(
        name = "auth",
        long_about = "Log in to Bitbucket Cloud.\n\n\
            By default bbkt asks for your Atlassian account email and an API token \
            (or app password), verifies them against the API and stores them. \
            With --oauth it runs the OAuth authorization-code flow in your browser \
            using the consumer in BITBUCKET_OAUTH_CLIENT_ID and \
            BITBUCKET_OAUTH_CLIENT_SECRET; OAuth tokens are refreshed automatically.",
        after_help = "\
WORKFLOW EXAMPLES:
    # API token (prompts for email and token)
    bbkt auth

    # API token with the email supplied
    bbkt auth --email dev@example.com

    # OAuth in the browser
    export BITBUCKET_OAUTH_CLIENT_ID=...
    export BITBUCKET_OAUTH_CLIENT_SECRET=...
    bbkt auth --oauth

    # OAuth on a remote machine (prints the URL instead of opening it)
    bbkt auth --oauth --no-browser"
    )]
    Auth {
        /// Use the OAuth authorization-code flow
        #[arg(long)]
        oauth: bool,

        /// Account email for API-token login
        #[arg(long, conflicts_with = "oauth")]
        email: Option<String>,

        /// Do not attempt to open a browser
        #[arg(long, requires = "oauth")]
        no_browser: bool,
    },

    /// Show the active credential
    #[command(
        name = "status",
        long_about = "Show where the active credential comes from, its scheme, \
            granted scopes, expiry, and which operations it permits. Secrets are \
            masked."
    )]
    Status,

    /// Remove stored credentials
    #[command(
        name = "logout",
        long_about = "Delete the stored credential file. Succeeds if there is \
            nothing to delete. Credentials supplied through environment variables \
            are not affected."
    )]
    Logout,

    /// Send an authenticated API request
    #[command(
        name = "api",
        after_help = "\
WORKFLOW EXAMPLES:
    # Current user
    bbkt api GET /user

    # Repositories in a workspace
    bbkt api GET /repositories/my-workspace

    # Create an issue
    bbkt api POST /repositories/ws/repo/issues --data '{\"title\": \"Bug\"}'"
    )]
    Api {
        /// HTTP method
        method: String,

        /// Path relative to the API base, or an absolute URL
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash
    bbkt completion bash > ~/.local/share/bash-completion/completions/bbkt

    # Zsh
    bbkt completion zsh > \"${fpath[1]}/_bbkt\"

    # Fish
    bbkt completion fish > ~/.config/fish/completions/bbkt.fish

    # PowerShell
    bbkt completion powershell >> $PROFILE"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_oauth_login() {
        let cli = Cli::try_parse_from(["bbkt", "auth", "--oauth", "--no-browser"]).unwrap();
        match cli.command {
            Command::Auth {
                oauth, no_browser, ..
            } => {
                assert!(oauth);
                assert!(no_browser);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_browser_requires_oauth() {
        assert!(Cli::try_parse_from(["bbkt", "auth", "--no-browser"]).is_err());
    }

    #[test]
    fn email_conflicts_with_oauth() {
        assert!(Cli::try_parse_from(["bbkt", "auth", "--oauth", "--email", "a@b.c"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["bbkt", "status", "--debug", "-q"]).unwrap();
        assert!(cli.debug);
        assert!(cli.quiet);
    }

    #[test]
    fn api_takes_method_path_and_data() {
        let cli =
            Cli::try_parse_from(["bbkt", "api", "post", "/x", "--data", "{}"]).unwrap();
        match cli.command {
            Command::Api { method, path, data } => {
                assert_eq!(method, "post");
                assert_eq!(path, "/x");
                assert_eq!(data.as_deref(), Some("{}"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
