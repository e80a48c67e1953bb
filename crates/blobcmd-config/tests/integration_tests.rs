use blobcmd_config::{Config, ConfigError, ConfigFormat, ConfigLoader, Validator};
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_load_toml_config() {
    let loader = ConfigLoader::new();
    let toml_content = r#"
[account]
name = "myaccount"
key = "a2V5"
container = "logs"
prefix = "2024/"

[listing]
page_buffer_size = 64
recursive = true

[upload]
block_size = 1048576
max_concurrent_stages = 4

[account_keys]
archive = "YXJjaGl2ZQ=="
"#;

    let config = loader.load_from_string(toml_content, ConfigFormat::Toml);
    assert!(config.is_ok());

    let config = config.unwrap();
    assert_eq!(config.account.name, "myaccount");
    assert_eq!(config.account.container.as_deref(), Some("logs"));
    assert_eq!(config.listing.page_buffer_size, 64);
    assert_eq!(config.upload.max_concurrent_stages, 4);
    assert_eq!(config.key_for("archive"), Some("YXJjaGl2ZQ=="));
    assert_eq!(config.key_for("myaccount"), Some("a2V5"));
}

#[tokio::test]
async fn test_load_yaml_config() {
    let loader = ConfigLoader::new();
    let yaml_content = r#"
account:
  name: devstoreaccount1
  use_https: false
  emulator_url: "http://127.0.0.1:10000"

observability:
  log_level: debug
  log_format: json
"#;

    let config = loader
        .load_from_string(yaml_content, ConfigFormat::Yaml)
        .unwrap();
    assert!(!config.account.use_https);
    assert_eq!(
        config.account.emulator_url.as_deref(),
        Some("http://127.0.0.1:10000")
    );
    assert_eq!(config.observability.log_format, "json");
}

#[tokio::test]
async fn test_load_file_by_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blobcmd.json");
    fs::write(&path, r#"{"account": {"name": "acct"}}"#).unwrap();

    let config = ConfigLoader::new().load_file(&path).await.unwrap();
    assert_eq!(config.account.name, "acct");
}

#[tokio::test]
async fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = ConfigLoader::new()
        .load_file(dir.path().join("absent.toml"))
        .await;
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

    // Config::load treats a missing file as "use defaults"
    let config = Config::load(dir.path().join("absent.toml")).await.unwrap();
    assert_eq!(config.account.endpoint, "core.windows.net");
}

#[tokio::test]
async fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blobcmd.ini");
    fs::write(&path, "name=acct").unwrap();

    let result = ConfigLoader::new().load_file(&path).await;
    assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
}

#[tokio::test]
async fn test_invalid_values_are_rejected() {
    let loader = ConfigLoader::new();
    let result = loader.load_from_string(
        "[listing]\npage_buffer_size = 0\n",
        ConfigFormat::Toml,
    );
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

    let result = loader.load_from_string("[account]\nname = [1, 2]\n", ConfigFormat::Toml);
    assert!(matches!(result, Err(ConfigError::Parse { format: "TOML", .. })));
}

#[tokio::test]
async fn test_load_and_merge() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("base.toml");
    let local = dir.path().join("local.yaml");
    fs::write(&base, "[account]\nname = \"acct\"\ncontainer = \"logs\"\n").unwrap();
    fs::write(&local, "account:\n  container: archive\nlisting:\n  recursive: true\n").unwrap();

    let config = ConfigLoader::new()
        .load_and_merge(&[&base, &local])
        .await
        .unwrap();
    assert_eq!(config.account.name, "acct");
    assert_eq!(config.account.container.as_deref(), Some("archive"));
    assert!(config.listing.recursive);

    let none: [&std::path::Path; 0] = [];
    assert!(matches!(
        ConfigLoader::new().load_and_merge(&none).await,
        Err(ConfigError::NothingToMerge)
    ));
}

#[test]
fn test_default_validates() {
    assert!(Config::default().validate().is_ok());
}
