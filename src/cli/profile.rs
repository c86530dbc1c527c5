use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Profile {
    pub endpoint: String,
    pub apikey: String,
}

impl Profile {
    pub fn load() -> anyhow::Result<Self> {
        let profile_path = Profile::build_config_path()?;

        let profile_json = fs::read_to_string(&profile_path).map_err(|err| {
            anyhow!(
                "no profile at {} ({err}), run `shipyard login <APIKEY>` first",
                profile_path.display()
            )
        })?;

        let profile: Profile = serde_json::from_str(&profile_json)?;

        Ok(profile)
    }

    fn build_config_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::home_dir().ok_or_else(|| anyhow!("home directory not found"))?;

        path.push(".shipyard");

        fs::create_dir_all(&path)?;

        path.push("profile.json");

        Ok(path)
    }

    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let profile_path = Profile::build_config_path()?;

        let profile_json = serde_json::to_string_pretty(&self)?;
        fs::write(&profile_path, profile_json)?;

        Ok(profile_path)
    }
}
