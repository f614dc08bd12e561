//! Command-line interface.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use toolcall_core::Transport;
use toolcall_session::ScriptOptions;
use toolcall_transport::{
    CommandBuilder, DEFAULT_STREAM_URL, PipeTransport, PipeTransportConfig, StreamTransport,
    StreamTransportConfig, command::DEFAULT_INTERPRETER,
};

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "VAPI_TOKEN";

/// Drive the remote tool-invocation service through the demo script.
///
/// Lists assistants, phone numbers and calls, then places a call with the
/// first assistant and phone number and looks it up again.
#[derive(Parser, Debug)]
#[command(name = "toolcall")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Bearer token for the remote service
    #[arg(long, global = true, env = TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Print events and the run report as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Number to call
    #[arg(long, global = true, value_name = "NUMBER")]
    pub customer_number: Option<String>,

    /// Schedule the call instead of placing it now (ISO-8601)
    #[arg(long, global = true, value_name = "TIME")]
    pub scheduled_at: Option<String>,

    /// Also create three sample assistants
    #[arg(long, global = true)]
    pub create_assistants: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Transport selection.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect over the HTTP event stream
    Stream {
        /// Event-stream URL
        #[arg(long, default_value = DEFAULT_STREAM_URL)]
        url: String,
    },

    /// Spawn a local server and talk to it over stdin/stdout
    Pipe {
        /// Server script (default: ./dist/index.js)
        server: Option<PathBuf>,

        /// Interpreter for the server script; empty runs it directly
        #[arg(long, default_value = DEFAULT_INTERPRETER)]
        interpreter: String,

        /// Extra environment for the server
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

impl Cli {
    /// The bearer token; a missing or blank token is a startup fault.
    ///
    /// # Errors
    /// Returns error if no token was supplied.
    pub fn token(&self) -> anyhow::Result<&str> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => bail!("{TOKEN_ENV} is required: set it in the environment or pass --token"),
        }
    }

    /// Script options from the flags.
    #[must_use]
    pub fn script_options(&self) -> ScriptOptions {
        ScriptOptions {
            customer_number: self.customer_number.clone(),
            scheduled_at: self.scheduled_at.clone(),
            create_assistants: self.create_assistants,
            ..ScriptOptions::default()
        }
    }

    /// Build the selected transport.
    ///
    /// # Errors
    /// Returns error if the transport configuration is invalid.
    pub fn build_transport(&self, token: &str) -> anyhow::Result<Box<dyn Transport>> {
        match &self.command {
            Command::Stream { url } => {
                tracing::info!(%url, "Using event-stream transport");
                let config = StreamTransportConfig::new(url.clone()).bearer_token(token)?;
                Ok(Box::new(StreamTransport::new(config)?))
            }
            Command::Pipe {
                server,
                interpreter,
                env,
            } => {
                let command = match server {
                    Some(path) => CommandBuilder::server(interpreter, path)?,
                    None => {
                        let cwd = std::env::current_dir()
                            .context("Cannot determine the working directory")?;
                        CommandBuilder::default_server(&cwd)?
                    }
                };
                tracing::info!(command = %command.base, "Using pipe transport");

                let mut config = PipeTransportConfig::new(command).env(TOKEN_ENV, token);
                config.env.extend(env.iter().cloned());
                Ok(Box::new(PipeTransport::new(config)))
            }
        }
    }
}
