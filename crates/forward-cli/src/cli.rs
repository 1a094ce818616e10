//! Command-line interface and option layering.

use std::path::{Path, PathBuf};

use clap::Parser;

use forward_core::config::load_option_file;
use forward_core::validate::parse_basic_auth;
use forward_core::{DebugMode, OptionLayer, TunnelRequest, parse_forwarded};

use crate::api::DEFAULT_API_URL;
use crate::transport::{DEFAULT_SSH_PORT, DEFAULT_SSH_USER};

#[derive(Parser, Debug)]
#[command(name = "forward")]
#[command(
    version,
    about = "Share a server running on localhost with a public URL",
    after_help = "Examples:\n  \
        forward 3000                  forward port 3000\n  \
        forward mysite.dev            forward mysite.dev on port 80\n  \
        forward mysite.dev:88 bar     forward port 88 with subdomain prefix bar\n  \
        forward 3000 -a user:pass     protect the tunnel with basic auth"
)]
pub struct Cli {
    /// Port, host, or host:port to forward
    pub forwarded: Option<String>,

    /// Static subdomain prefix for the public URL
    pub subdomain_prefix: Option<String>,

    /// Protect the public URL with HTTP basic auth
    #[arg(short = 'a', long = "auth", value_name = "USER:PASS")]
    pub auth: Option<String>,

    /// Disable authentication on the public URL
    #[arg(short = 'A', long = "no-auth")]
    pub no_auth: bool,

    /// Also serve the tunnel on this CNAME
    #[arg(short = 'c', long, value_name = "CNAME")]
    pub cname: Option<String>,

    /// Write diagnostics to stderr (or --log-file)
    #[arg(long, conflicts_with = "rdebug")]
    pub debug: bool,

    /// Capture diagnostics and send them to support on exit
    #[arg(long)]
    pub rdebug: bool,

    /// Write --debug output to this file
    #[arg(long, value_name = "PATH", requires = "debug")]
    pub log_file: Option<PathBuf>,

    /// Control API base URL
    #[arg(long, env = "FORWARD_API_URL", default_value = DEFAULT_API_URL, hide = true)]
    pub api_url: String,

    /// SSH port on the tunnel servers
    #[arg(long, env = "FORWARD_SSH_PORT", default_value_t = DEFAULT_SSH_PORT, hide = true)]
    pub ssh_port: u16,

    /// SSH user on the tunnel servers
    #[arg(long, env = "FORWARD_SSH_USER", default_value = DEFAULT_SSH_USER, hide = true)]
    pub ssh_user: String,

    /// Directory holding the tunnel identity and account token [default: ~/.forward]
    #[arg(long, env = "FORWARD_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Cli {
    pub const fn debug_mode(&self) -> DebugMode {
        if self.rdebug {
            DebugMode::Remote
        } else if self.debug {
            DebugMode::Local
        } else {
            DebugMode::Off
        }
    }

    /// Options given as flags and the subdomain prefix argument.
    pub fn option_layer(&self) -> forward_core::Result<OptionLayer> {
        let (username, password) = match &self.auth {
            Some(auth) => {
                let (username, password) = parse_basic_auth(auth)?;
                (Some(username), Some(password))
            }
            None => (None, None),
        };
        Ok(OptionLayer {
            subdomain_prefix: self.subdomain_prefix.clone(),
            cname: self.cname.as_deref().map(str::to_lowercase),
            username,
            password,
            no_auth: self.no_auth.then_some(true),
            ..OptionLayer::default()
        })
    }

    /// Nothing to forward was given on the command line or in an option file.
    pub const fn wants_usage(&self, option_file: Option<&Path>) -> bool {
        self.forwarded.is_none() && option_file.is_none()
    }

    /// Layer defaults, the option file and the command line, then validate.
    pub fn resolve(&self, option_file: Option<&Path>) -> forward_core::Result<TunnelRequest> {
        let mut layer = OptionLayer::defaults();
        if let Some(path) = option_file {
            layer = layer.merge(load_option_file(path)?);
        }
        layer = layer.merge(self.option_layer()?);
        if let Some(forwarded) = &self.forwarded {
            layer = layer.with_forwarded(parse_forwarded(forwarded));
        }
        layer.resolve()
    }
}
