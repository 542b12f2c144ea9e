use anyhow::{Context, Result};
use clap::Args;
use dtext_parse::DTextOptions;
use std::path::{Path, PathBuf};

/// Options file picked up from the working directory when `--config` is
/// not given.
pub const CONFIG_FILE: &str = "dtext.json";

/// Flags that override the options file.
#[derive(Debug, Default, Args)]
pub struct OptionArgs {
    /// JSON options file (default: ./dtext.json if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Site hostname; links to it are internal
    #[arg(long, global = true)]
    pub domain: Option<String>,

    /// Prefix for site-relative links
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Host whose URLs become id-links (repeatable)
    #[arg(long = "internal-domain", global = true, value_name = "HOST")]
    pub internal_domains: Vec<String>,

    /// Drop [color] tags
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Treat @name as plain text
    #[arg(long, global = true)]
    pub no_mentions: bool,

    /// Suppress block-level markup
    #[arg(long, global = true)]
    pub inline_only: bool,

    /// Maximum number of thumbnail placeholders
    #[arg(long, global = true, value_name = "N")]
    pub max_thumbs: Option<usize>,
}

/// Load options from `explicit`, or from `dir/dtext.json` if it exists, or
/// fall back to defaults.
///
/// An explicit path that cannot be read is an error; a missing default file
/// is not.
pub fn load_options(explicit: Option<&Path>, dir: &Path) -> Result<DTextOptions> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = dir.join(CONFIG_FILE);
            if !path.exists() {
                tracing::debug!("no {CONFIG_FILE}, using defaults");
                return Ok(DTextOptions::default());
            }
            path
        }
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let options: DTextOptions = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded options");
    Ok(options)
}

/// Apply command-line overrides on top of file options.
pub fn apply_args(mut options: DTextOptions, args: &OptionArgs) -> DTextOptions {
    if let Some(domain) = &args.domain {
        options.domain = domain.clone();
    }
    if let Some(base_url) = &args.base_url {
        options.base_url = base_url.clone();
    }
    options
        .internal_domains
        .extend(args.internal_domains.iter().cloned());
    if args.no_color {
        options.allow_color = false;
    }
    if args.no_mentions {
        options.f_mentions = false;
    }
    if args.inline_only {
        options.f_inline = true;
    }
    if let Some(max_thumbs) = args.max_thumbs {
        options.max_thumbs = max_thumbs;
    }
    options
}

/// The effective options for this invocation.
pub fn resolve_options(args: &OptionArgs) -> Result<DTextOptions> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let options = load_options(args.config.as_deref(), &cwd)?;
    Ok(apply_args(options, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("dtext-config-test").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_default_file() {
        let dir = temp_dir("missing");
        assert_eq!(load_options(None, &dir).unwrap(), DTextOptions::default());
    }

    #[test]
    fn test_default_file_is_picked_up() {
        let dir = temp_dir("default-file");
        std::fs::write(
            dir.join(CONFIG_FILE),
            r#"{ "base_url": "https://e621.net", "internal_domains": ["e621.net"] }"#,
        )
        .unwrap();

        let options = load_options(None, &dir).unwrap();
        assert_eq!(options.base_url, "https://e621.net");
        assert!(options.internal_domains.contains("e621.net"));
        assert!(options.allow_color);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = temp_dir("explicit-missing");
        let err = load_options(Some(&dir.join("nope.json")), &dir).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = temp_dir("invalid");
        std::fs::write(dir.join(CONFIG_FILE), "{ not json").unwrap();
        let err = load_options(None, &dir).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_flags_override_file() {
        let file = DTextOptions::default()
            .with_domain("old.example")
            .with_internal_domain("a.example");
        let args = OptionArgs {
            domain: Some("new.example".to_string()),
            internal_domains: vec!["b.example".to_string()],
            no_color: true,
            no_mentions: true,
            inline_only: true,
            max_thumbs: Some(4),
            ..OptionArgs::default()
        };

        let options = apply_args(file, &args);
        assert_eq!(options.domain, "new.example");
        assert_eq!(options.internal_domains.len(), 2);
        assert!(!options.allow_color);
        assert!(!options.f_mentions);
        assert!(options.f_inline);
        assert_eq!(options.max_thumbs, 4);
    }
}
