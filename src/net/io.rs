//! I/O 支持：JSON、RON、YAML 与 TOML 序列化接口，按文件扩展名选择格式。
use std::fs;
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::description::NetDescription;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("toml write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported file extension for {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Ron,
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Format::Json),
            Some("ron") => Ok(Format::Ron),
            Some("yaml" | "yml") => Ok(Format::Yaml),
            Some("toml") => Ok(Format::Toml),
            _ => Err(IoError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

pub fn to_string<T: Serialize>(value: &T, format: Format) -> Result<String, IoError> {
    let content = match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Ron => ron::ser::to_string_pretty(value, PrettyConfig::default())?,
        Format::Yaml => serde_yaml::to_string(value)?,
        Format::Toml => toml::to_string_pretty(value)?,
    };
    Ok(content)
}

pub fn from_str<T: DeserializeOwned>(content: &str, format: Format) -> Result<T, IoError> {
    let value = match format {
        Format::Json => serde_json::from_str(content)?,
        Format::Ron => ron::from_str(content)?,
        Format::Yaml => serde_yaml::from_str(content)?,
        Format::Toml => toml::from_str(content)?,
    };
    Ok(value)
}

pub fn write<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let path = path.as_ref();
    let content = to_string(value, Format::from_path(path)?)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

pub fn read<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let content = fs::read_to_string(path)?;
    from_str(&content, format)
}

pub fn read_description<P: AsRef<Path>>(path: P) -> Result<NetDescription, IoError> {
    read(path)
}
