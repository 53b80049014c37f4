//! On-disk configuration and first-run bootstrap. The config file lives at
//! `~/.dispatch/dp.conf`; its first line must equal the header marker to be
//! considered valid, `#` lines are comments, everything else is a
//! `NAME[ value]` pair. A missing or invalid file is regenerated with
//! defaults instead of failing startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::mailbox::tree;
use crate::protocol::request::RequestToken;

pub const CONFIG_HEADER: &str = "!DP_CONFIG";
pub const CONFIG_COMMENT: char = '#';

pub const KEY_DOC_ROOT: &str = "DOCROOT";
pub const KEY_PORT: &str = "PORT";
pub const KEY_HOST: &str = "HOST";
pub const KEY_USER: &str = "USER";

pub const CONFIG_DIR: &str = ".dispatch";
pub const CONFIG_FILE: &str = "dp.conf";
/// The top-level Dispatch directory, created under the home directory by
/// the default config.
pub const DOC_ROOT_DIR: &str = "Dispatch";
/// Default domain directory that maps to the local machine.
pub const LOCAL_DOMAIN: &str = "localhost";
pub const ABOUT_FILE: &str = "About.txt";
pub const README_FILE: &str = "Instructions.txt";

pub const DEFAULT_PORT: u16 = 1992;
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(3000);

const ABOUT_TEXT: &str = "# ABOUT ME\n# --\n# Enter a name to identify yourself after this line.\n";
const README_TEXT: &str = "INSTRUCTIONS\n";

/// Immutable runtime configuration, loaded once at startup and shared by
/// the endpoint, scanner and delivery.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub doc_root: PathBuf,
    /// Fixed TCP port for both client and peer traffic.
    pub port: u16,
    /// Local identity stamped as the sender on submitted parcels.
    pub local_host: Option<String>,
    pub local_user: Option<String>,
    pub scan_interval: Duration,
    pub read_timeout: Duration,
    pub max_parcel_size: u64,
}

impl DispatchConfig {
    pub fn new(doc_root: PathBuf) -> DispatchConfig {
        DispatchConfig {
            doc_root,
            port: DEFAULT_PORT,
            local_host: None,
            local_user: None,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            read_timeout: Duration::from_secs(30),
            max_parcel_size: 16 * 1024 * 1024,
        }
    }

    /// Builds a config from a parsed token list. The document root key is
    /// required; everything else falls back to defaults.
    pub fn from_tokens(tokens: &[RequestToken], path: &Path) -> Result<DispatchConfig, DispatchError> {
        let doc_root = value_of(KEY_DOC_ROOT, tokens).ok_or_else(|| DispatchError::BadConfig {
            path: path.to_path_buf(),
        })?;

        let mut config = DispatchConfig::new(PathBuf::from(doc_root));
        if let Some(port) = value_of(KEY_PORT, tokens) {
            config.port = port.parse().map_err(|_| DispatchError::BadConfig {
                path: path.to_path_buf(),
            })?;
        }
        config.local_host = value_of(KEY_HOST, tokens).map(str::to_string);
        config.local_user = value_of(KEY_USER, tokens).map(str::to_string);
        Ok(config)
    }
}

fn value_of<'a>(name: &str, tokens: &'a [RequestToken]) -> Option<&'a str> {
    tokens
        .iter()
        .find(|t| t.name == name)
        .and_then(|t| t.value.as_deref())
}

/// Deserializes config file text into tokens. The header line itself is
/// consumed by validation and not part of the result.
pub fn parse_config(text: &str, path: &Path) -> Result<Vec<RequestToken>, DispatchError> {
    let mut lines = text.lines();
    if lines.next().map(str::trim_end) != Some(CONFIG_HEADER) {
        return Err(DispatchError::BadConfig {
            path: path.to_path_buf(),
        });
    }

    let mut tokens = Vec::new();
    for line in lines {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(CONFIG_COMMENT) {
            continue;
        }
        let (name, value) = match line.split_once(' ') {
            Some((name, value)) => (name, value),
            None => (line, ""),
        };
        tokens.push(RequestToken::new(name, value));
    }
    Ok(tokens)
}

/// Serializes a token list into config file text, header line first.
pub fn render_config(tokens: &[RequestToken]) -> String {
    let mut out = format!("{}\n", CONFIG_HEADER);
    for token in tokens {
        out.push_str(&token.name);
        if let Some(value) = &token.value {
            out.push(' ');
            out.push_str(value);
        }
        out.push('\n');
    }
    out
}

fn default_tokens(home: &Path) -> Vec<RequestToken> {
    let doc_root = home.join(DOC_ROOT_DIR);
    vec![RequestToken::new(
        KEY_DOC_ROOT,
        &doc_root.to_string_lossy(),
    )]
}

/// Loads the daemon configuration, regenerating a default config file when
/// the existing one is missing or fails validation, then bootstraps the
/// document root.
pub async fn load_or_init(config_dir: Option<PathBuf>) -> anyhow::Result<DispatchConfig> {
    let home = dirs::home_dir().context("cannot determine the home directory")?;
    let config_dir = config_dir.unwrap_or_else(|| home.join(CONFIG_DIR));
    tree::ensure_dir(&config_dir).await?;

    let config_path = config_dir.join(CONFIG_FILE);
    let config = match load(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            warn!("{} - writing a default config", e);
            let text = render_config(&default_tokens(&home));
            tree::write_file(&config_path, text.as_bytes()).await?;
            load(&config_path).await?
        }
    };

    info!("document root: {}", config.doc_root.display());
    bootstrap_tree(&config).await?;
    Ok(config)
}

async fn load(path: &Path) -> Result<DispatchConfig, DispatchError> {
    let text = tree::read_text(path).await?;
    let tokens = parse_config(&text, path)?;
    DispatchConfig::from_tokens(&tokens, path)
}

/// Creates the document root on first run (seeding the instructions file),
/// the about file, and the default local domain directory.
pub async fn bootstrap_tree(config: &DispatchConfig) -> Result<(), DispatchError> {
    let fresh_root = !tree::exists(&config.doc_root).await;
    tree::ensure_dir(&config.doc_root).await?;
    if fresh_root {
        tree::write_file(&config.doc_root.join(README_FILE), README_TEXT.as_bytes()).await?;
    }

    let about = config.doc_root.join(ABOUT_FILE);
    if !tree::exists(&about).await {
        tree::write_file(&about, ABOUT_TEXT.as_bytes()).await?;
    }

    tree::ensure_dir(&config.doc_root.join(LOCAL_DOMAIN)).await?;
    Ok(())
}
