use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read handover config {path:?}.")]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Handover config {path:?} is not valid TOML.")]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	#[error("Invalid handover config: {message}")]
	Validation { message: String },
}
