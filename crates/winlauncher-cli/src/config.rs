//! Validated inputs of one generator run.
//!
//! Everything that can be checked without touching the output is checked
//! here, in the order that decides the exit code: template, resource
//! header, properties, icon, splash bitmap.

use std::path::{Path, PathBuf};

use tracing::debug;
use winlauncher_core::version::split_version;

use crate::error::CliError;
use crate::properties::Properties;
use crate::resource_header::ResourceHeader;
use crate::Cli;

pub const ICON_DEFINE: &str = "IDI_WINLAUNCHER";
pub const SPLASH_DEFINE: &str = "IDB_SPLASH";
pub const STRING_KEY_PREFIX: &str = "IDS_";
pub const FILE_VERSION_KEY: &str = "FileVersion";
pub const PRODUCT_VERSION_KEY: &str = "ProductVersion";

#[derive(Debug, Clone)]
pub struct SplashConfig {
    pub path: PathBuf,
    pub id: u16,
}

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub template: PathBuf,
    pub output: PathBuf,
    pub icon: PathBuf,
    pub icon_id: u16,
    pub splash: Option<SplashConfig>,
    /// `IDS_*` properties resolved to string-table IDs.
    pub strings: Vec<(u16, String)>,
    /// Every other property, verbatim, in file order.
    pub version_strings: Vec<(String, String)>,
    pub file_version: Option<[u16; 4]>,
    pub product_version: [u16; 4],
}

impl LauncherConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if !cli.template.is_file() {
            return Err(CliError::TemplateMissing(cli.template.clone()));
        }

        let header = ResourceHeader::load(&cli.resource_header)?;
        let icon_id = header.require(ICON_DEFINE)?;

        let properties = Properties::load(&cli.properties)?;
        let product_text = properties
            .get(PRODUCT_VERSION_KEY)
            .ok_or_else(|| CliError::MissingProperty {
                path: cli.properties.clone(),
                key: PRODUCT_VERSION_KEY,
            })?;
        let product_version = parse_version(PRODUCT_VERSION_KEY, product_text)?;
        let file_version = properties
            .get(FILE_VERSION_KEY)
            .map(|text| parse_version(FILE_VERSION_KEY, text))
            .transpose()?;

        let mut strings = Vec::new();
        let mut version_strings = Vec::new();
        for (key, value) in properties.iter() {
            if key.starts_with(STRING_KEY_PREFIX) {
                strings.push((header.require(key)?, value.to_string()));
            } else {
                version_strings.push((key.to_string(), value.to_string()));
            }
        }

        if !cli.icon.is_file() {
            return Err(CliError::IconMissing(cli.icon.clone()));
        }

        let splash = match &cli.splash {
            Some(path) => Some(splash_config(path, &header)?),
            None => None,
        };

        debug!(
            defines = header.len(),
            strings = strings.len(),
            version_strings = version_strings.len(),
            icon_id,
            splash = splash.is_some(),
            "validated inputs"
        );
        Ok(Self {
            template: cli.template.clone(),
            output: cli.output.clone(),
            icon: cli.icon.clone(),
            icon_id,
            splash,
            strings,
            version_strings,
            file_version,
            product_version,
        })
    }
}

fn splash_config(path: &Path, header: &ResourceHeader) -> Result<SplashConfig, CliError> {
    if !path.is_file() {
        return Err(CliError::SplashMissing(path.to_path_buf()));
    }
    Ok(SplashConfig {
        path: path.to_path_buf(),
        id: header.require(SPLASH_DEFINE)?,
    })
}

/// Parse a four-part version, ignoring a `-suffix` such as `-SNAPSHOT`.
/// The suffix survives only in the version-info string.
fn parse_version(key: &'static str, text: &str) -> Result<[u16; 4], CliError> {
    let numeric = text.split_once('-').map_or(text, |(head, _)| head);
    split_version(numeric).map_err(|source| CliError::BadVersion {
        key,
        value: text.to_string(),
        source,
    })
}
