//! # Client Identity
//!
//! Who this client is on the socket: a principal (authenticated user id, or a
//! persistent guest id) plus a device id. The pair is the connection key.
//!
//! Device and guest ids are generated once and kept in
//! `~/.chatsync/identity.json`. Writes use atomic rename (write `.tmp`, then
//! `rename()`).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::model::Role;

const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug)]
pub enum IdentityError {
    Io(io::Error),
    Parse(serde_json::Error),
    NoHomeDir,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::Io(e) => write!(f, "Identity file error: {}", e),
            IdentityError::Parse(e) => write!(f, "Identity file is corrupt: {}", e),
            IdentityError::NoHomeDir => write!(f, "Could not determine home directory"),
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<io::Error> for IdentityError {
    fn from(e: io::Error) -> Self {
        IdentityError::Io(e)
    }
}

/// Ids that survive restarts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IdentityFile {
    pub device_id: String,
    pub guest_id: String,
}

impl IdentityFile {
    fn generate() -> Self {
        Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            guest_id: format!("guest-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Reads `dir/identity.json`, creating it with fresh ids if missing.
    pub fn load_or_create(dir: &Path) -> Result<Self, IdentityError> {
        let path = dir.join(IDENTITY_FILE);
        if path.exists() {
            let json = fs::read_to_string(&path)?;
            let file = serde_json::from_str(&json).map_err(IdentityError::Parse)?;
            debug!("Loaded identity from {}", path.display());
            return Ok(file);
        }

        fs::create_dir_all(dir)?;
        let file = Self::generate();
        atomic_write_json(&path, &file)?;
        info!("Created identity at {}", path.display());
        Ok(file)
    }
}

/// `~/.chatsync/`
pub fn identity_dir() -> Result<PathBuf, IdentityError> {
    let home = dirs::home_dir().ok_or(IdentityError::NoHomeDir)?;
    Ok(home.join(".chatsync"))
}

fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// The identity a connection is opened for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    /// Authenticated user id, or the guest id when signed out.
    pub principal_id: String,
    pub device_id: String,
    pub token: Option<String>,
}

impl Identity {
    /// Signed in when `user_id` is given, otherwise a guest on this device.
    pub fn resolve(role: Role, user_id: Option<String>, token: Option<String>, file: &IdentityFile) -> Self {
        Self {
            role,
            principal_id: user_id.unwrap_or_else(|| file.guest_id.clone()),
            device_id: file.device_id.clone(),
            token,
        }
    }

    /// Loads (or creates) the ids kept in `dir` and resolves against them.
    pub fn load_from(
        dir: &Path,
        role: Role,
        user_id: Option<String>,
        token: Option<String>,
    ) -> Result<Self, IdentityError> {
        let file = IdentityFile::load_or_create(dir)?;
        Ok(Self::resolve(role, user_id, token, &file))
    }

    /// Connection key. A change here means the socket must be recreated.
    pub fn key(&self) -> String {
        format!("{}:{}", self.principal_id, self.device_id)
    }
}
