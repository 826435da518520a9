use std::fs;
use std::path::PathBuf;

use btbridge_config::{ConfigError, ConfigLoader};

#[test]
fn file_then_environment_layering() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("btbridge.json");
    fs::write(
        &path,
        r#"{
            "save_path": "/srv/torrents",
            "listen_port": 6881,
            "enable_natpmp": false,
            "upload_rate_limit": 65536
        }"#,
    )?;

    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env(|key| (key == "BTBRIDGE_LISTEN_PORT").then(|| "7000".to_string()))
        .load()?;

    assert_eq!(config.save_path, Some(PathBuf::from("/srv/torrents")));
    assert_eq!(config.listen_port, 7000);
    assert!(!config.enable_natpmp);
    assert!(config.enable_dht);
    assert_eq!(config.upload_rate_limit, 65536);
    assert_eq!(config.engine_settings().upload_rate_limit, 65536);
    Ok(())
}

#[test]
fn malformed_documents_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ not json")?;
    let result = ConfigLoader::new().with_file(&broken).with_env(|_| None).load();
    assert!(matches!(result, Err(ConfigError::Parse { .. })));

    let array = dir.path().join("array.json");
    fs::write(&array, "[1, 2, 3]")?;
    let result = ConfigLoader::new().with_file(&array).with_env(|_| None).load();
    assert!(matches!(result, Err(ConfigError::NotAnObject)));
    Ok(())
}
