//! Process configuration helpers: optional env-file loading and tracing setup.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Load `KEY=VALUE` lines into the process environment.
///
/// Blank lines and `#` comments are skipped. Variables already present in the environment are
/// never overridden. Values are not logged. Returns the number of variables set.
pub fn load_env_file(path: &Path) -> std::io::Result<usize> {
    let txt = std::fs::read_to_string(path)?;
    let mut set = 0usize;
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
            set += 1;
        }
    }
    Ok(set)
}

/// Load the file named by `SERPLENS_ENV_FILE`, if any.
pub fn load_env_file_from_env() {
    let Ok(p) = std::env::var("SERPLENS_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    // Tracing isn't initialized yet; failures surface once the missing config is used.
    let _ = load_env_file(Path::new(p));
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
