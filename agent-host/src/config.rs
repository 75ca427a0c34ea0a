use agentlink_core::settings::{load_toml, optional, EnvSettings, SettingsSource};
use agentlink_core::ConfigError;
use llm_interface::{LlmConfig, ProviderKind};
use reddit_client::RedditClientConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub const CONFIG_PATH_VAR: &str = "AGENTLINK_CONFIG";

/// Who the agent is and how it is prompted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub name: String,
    pub bio: String,
    pub style: Vec<String>,
    /// Overrides the built-in decision prompt
    pub should_respond_template: Option<String>,
    /// Overrides the built-in reply prompt
    pub message_template: Option<String>,
    pub system_prompt: Option<String>,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            name: "agentlink".to_string(),
            bio: "A helpful assistant that answers technical questions.".to_string(),
            style: vec!["Friendly and concise".to_string()],
            should_respond_template: None,
            message_template: None,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub character: CharacterConfig,
    pub llm: LlmConfig,
    pub reddit: RedditClientConfig,
    /// Settings served to clients ahead of the process environment
    pub settings: HashMap<String, String>,
    /// Memories kept per conversation room
    pub memory_limit: usize,
    /// Rooms kept in memory; the least recently written is dropped first
    pub max_rooms: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            character: CharacterConfig::default(),
            llm: LlmConfig::default(),
            reddit: RedditClientConfig::default(),
            settings: HashMap::new(),
            memory_limit: 50,
            max_rooms: 1000,
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        load_toml(path)
    }

    /// Reads the file named by `AGENTLINK_CONFIG` (defaults otherwise), then
    /// applies environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match optional(&EnvSettings, CONFIG_PATH_VAR) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&EnvSettings)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<S: SettingsSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<(), ConfigError> {
        if let Some(provider) = optional(source, "LLM_PROVIDER") {
            self.llm.provider =
                provider
                    .parse::<ProviderKind>()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: "LLM_PROVIDER".to_string(),
                        value: provider.clone(),
                    })?;
        }
        if let Some(model) = optional(source, "LLM_MODEL") {
            self.llm.model = Some(model);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.character.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "character.name".to_string(),
            });
        }
        if self.memory_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "memory_limit".to_string(),
                value: "0".to_string(),
            });
        }
        if self.max_rooms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_rooms".to_string(),
                value: "0".to_string(),
            });
        }
        self.reddit.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_core::settings::MapSettings;

    #[test]
    fn test_host_config_from_toml() {
        let config: HostConfig = toml::from_str(
            r#"
            memory_limit = 20

            [character]
            name = "rustacean"
            bio = "Answers questions about Rust."

            [llm]
            provider = "anthropic"

            [reddit.poller]
            interval_secs = 60

            [[reddit.subreddits]]
            name = "learnrust"
            allowed_topics = ["rust"]

            [settings]
            REDDIT_USER_AGENT = "agentlink/0.1"
            "#,
        )
        .unwrap();

        assert_eq!(config.character.name, "rustacean");
        assert_eq!(config.llm.provider, ProviderKind::Anthropic);
        assert_eq!(config.reddit.poller.interval_secs, 60);
        assert_eq!(config.reddit.subreddits[0].name, "learnrust");
        assert_eq!(config.settings["REDDIT_USER_AGENT"], "agentlink/0.1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_provider_and_model() {
        let mut config = HostConfig::default();
        let source = MapSettings::default()
            .with("LLM_PROVIDER", "claude")
            .with("LLM_MODEL", "claude-custom");

        config.apply_overrides(&source).unwrap();
        assert_eq!(config.llm.provider, ProviderKind::Anthropic);
        assert_eq!(config.llm.model.as_deref(), Some("claude-custom"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = HostConfig::default();
        let source = MapSettings::default().with("LLM_PROVIDER", "carrier-pigeon");

        match config.apply_overrides(&source) {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "LLM_PROVIDER"),
            other => panic!("Expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_limits_fail_validation() {
        let config = HostConfig {
            memory_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HostConfig {
            max_rooms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
