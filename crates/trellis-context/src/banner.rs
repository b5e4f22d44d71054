//! Startup banner

use std::fs;
use std::io::{self, Write};

use tracing::debug;

use crate::config::{is_switched_off, Properties, BANNER, BANNER_MODE};

const DEFAULT_BANNER: &str = r" _            _ _ _
| |_ _ _ ___ | | (_)___
|  _| '_/ -_)| | | (_-<
 \__|_| \___||_|_|_/__/
";

const VERSION_RULE: &str = "========================";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Banner text for `version`. `path` replaces the built-in art when it
/// can be read; `enabled` false leaves only a one-line version marker.
pub fn render_banner(path: Option<&str>, enabled: bool, version: &str) -> String {
    let mut out = String::from("\n");
    if enabled {
        out.push_str(&banner_art(path));
        out.push_str(&version_line(version));
    } else {
        out.push_str(&format!("=== trellis === ({})\n", version));
    }
    out
}

fn banner_art(path: Option<&str>) -> String {
    let custom = path
        .filter(|path| !path.is_empty())
        .and_then(|path| fs::read_to_string(path).ok())
        .filter(|art| !art.is_empty());
    match custom {
        Some(mut art) => {
            if !art.ends_with('\n') {
                art.push('\n');
            }
            art
        }
        None => DEFAULT_BANNER.to_string(),
    }
}

fn version_line(version: &str) -> String {
    let room = VERSION_RULE.len().saturating_sub(3);
    if version.is_empty() || version.len() > room {
        return format!("{}\n", VERSION_RULE);
    }
    format!("{} ({})\n", &VERSION_RULE[..room - version.len()], version)
}

/// Print the banner configured by `properties` to stdout.
pub(crate) fn print_banner(properties: &dyn Properties) {
    let path = properties.get(BANNER);
    let enabled = properties
        .get(BANNER_MODE)
        .map(|mode| !is_switched_off(&mode))
        .unwrap_or(true);
    let text = render_banner(path.as_deref(), enabled, VERSION);
    if let Err(err) = write_banner(&mut std::io::stdout().lock(), &text) {
        debug!(error = %err, "Failed to print banner");
    }
}

fn write_banner(out: &mut impl Write, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}
