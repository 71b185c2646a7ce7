//! Settings file loading for the briefing driver.

use std::path::Path;

use common_lib::settings::Settings;

pub async fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("error reading settings file {}: {e}", path.display()))?;
    Ok(toml::from_str(&data)?)
}
