use config::{Config, Environment, File, FileFormat};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::global::VigilConfig;

/// 配置加载器
///
/// 从 TOML 文件加载，环境变量（`VIGIL_` 前缀）可覆盖；
/// 文件不存在时仅使用环境变量与默认值。
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    /// 加载并校验配置
    pub fn load(&self) -> Result<VigilConfig> {
        let mut builder = Config::builder();

        if self.config_path.exists() {
            let path = self.config_path.to_str().ok_or_else(|| {
                ConfigError::Invalid(format!("Invalid config path: {:?}", self.config_path))
            })?;
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        let config = builder
            .add_source(Environment::with_prefix("VIGIL").separator("__"))
            .build()?;

        let config: VigilConfig = config.try_deserialize()?;
        Self::validate(&config)?;

        Ok(config)
    }

    /// 校验配置
    ///
    /// 启动前校验失败属于致命错误，任何流水线都不会启动。
    pub fn validate(config: &VigilConfig) -> Result<()> {
        if config.recording.post_detection_secs == 0 {
            return Err(ConfigError::Invalid(
                "post_detection_secs must be greater than 0".to_string(),
            ));
        }

        if config.subscription.pull_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pull_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for device in &config.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Invalid("device name is empty".to_string()));
            }
            if device.host.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {} has empty host",
                    device.name
                )));
            }
            if device.username.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {} has empty username",
                    device.name
                )));
            }
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
        }

        if config.enabled_devices().is_empty() {
            return Err(ConfigError::Invalid(
                "no enabled devices configured".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[recording]
post_detection_secs = 20
grace_period_secs = 10
output_root = "./test/recordings"
stream_format = "h265"

[subscription]
pull_timeout_secs = 3
renew_margin_secs = 10
reconnect_base_secs = 1
reconnect_max_secs = 30

[supervisor]
max_pipeline_restarts = 3
restart_delay_secs = 2

[[devices]]
name = "front"
host = "192.168.1.10"
username = "admin"
password = "secret"

[[devices]]
name = "back"
host = "192.168.1.11"
channel = 1
username = "admin"
password = "secret"
enabled = false
"#;

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("vigil.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = ConfigLoader::new(&path).load().unwrap();

        assert_eq!(config.recording.post_detection_secs, 20);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].name, "front");
        assert_eq!(config.devices[0].port, 8000); // default
        assert_eq!(config.devices[1].channel, 1);
        assert_eq!(config.enabled_devices().len(), 1);
    }

    fn valid_device(name: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.to_string(),
            host: "10.0.0.1".to_string(),
            port: 8000,
            rtsp_port: 554,
            channel: 0,
            username: "admin".to_string(),
            password: "x".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config = VigilConfig::default();
        config.devices = vec![valid_device("cam"), valid_device("cam")];

        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_no_enabled_devices() {
        let mut config = VigilConfig::default();
        let mut device = valid_device("cam");
        device.enabled = false;
        config.devices = vec![device];

        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_post_detection() {
        let mut config = VigilConfig::default();
        config.devices = vec![valid_device("cam")];
        config.recording.post_detection_secs = 0;

        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        let mut config = VigilConfig::default();
        config.devices = vec![valid_device("front"), valid_device("back")];

        assert!(ConfigLoader::validate(&config).is_ok());
    }
}
