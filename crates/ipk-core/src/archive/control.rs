//! The `control` file placed in `control.tar.gz`.

use crate::PACKAGER_VERSION;
use crate::config::PLACEHOLDER_INSTALLED_SIZE;

const MAINTAINER: &str = "N/A <nobody@example.com>";
const DESCRIPTION: &str = "This is a webOS application.";
const PACKAGE_FORMAT_VERSION: &str = "2";

#[derive(Debug, Clone, Default)]
pub struct ControlInfo<'a> {
    pub package: &'a str,
    pub version: &'a str,
    /// Defaults to `all`.
    pub architecture: Option<&'a str>,
    /// KiB. Defaults to a placeholder.
    pub installed_size: Option<u64>,
}

/// Render the control file: ten `Key: value` lines in fixed order and a
/// trailing blank line.
pub fn render(info: &ControlInfo<'_>) -> String {
    let installed_size = info
        .installed_size
        .unwrap_or(PLACEHOLDER_INSTALLED_SIZE)
        .to_string();
    let fields = [
        ("Package", info.package),
        ("Version", info.version),
        ("Section", "misc"),
        ("Priority", "optional"),
        ("Architecture", info.architecture.unwrap_or("all")),
        ("Installed-Size", installed_size.as_str()),
        ("Maintainer", MAINTAINER),
        ("Description", DESCRIPTION),
        ("webOS-Package-Format-Version", PACKAGE_FORMAT_VERSION),
        ("webOS-Packager-Version", PACKAGER_VERSION),
    ];

    let mut out = String::new();
    for (key, value) in fields {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out
}
