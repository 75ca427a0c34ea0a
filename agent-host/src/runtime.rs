//! In-process [`AgentRuntime`] backed by an [`LlmProvider`].

use crate::config::{CharacterConfig, HostConfig};
use crate::templates::{MESSAGE_TEMPLATE, SHOULD_RESPOND_TEMPLATE};
use agentlink_core::settings::{EnvSettings, SettingsSource};
use agentlink_core::{
    compose_context, string_to_uuid, AgentRuntime, Content, CoreError, LlmError, Memory,
    ResponseDecision, State,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use llm_interface::{LlmConfig, LlmProvider};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Messages of a room included in the prompt.
const RECENT_MESSAGES: usize = 10;

#[derive(Default)]
struct Room {
    memories: VecDeque<Memory>,
    last_write: u64,
}

/// Conversation rooms; the least recently written one goes first once
/// there are more than `max_rooms`.
#[derive(Default)]
struct Rooms {
    rooms: HashMap<Uuid, Room>,
    writes: u64,
}

impl Rooms {
    fn evict_idle(&mut self, max_rooms: usize) {
        while self.rooms.len() > max_rooms {
            let Some(idle) = self
                .rooms
                .iter()
                .min_by_key(|(_, room)| room.last_write)
                .map(|(id, _)| *id)
            else {
                break;
            };
            self.rooms.remove(&idle);
            debug!("Dropped idle room {}", idle);
        }
    }
}

pub struct LocalRuntime {
    agent_id: Uuid,
    character: CharacterConfig,
    llm: LlmConfig,
    provider: Arc<dyn LlmProvider>,
    settings: HashMap<String, String>,
    read_env: bool,
    memory_limit: usize,
    max_rooms: usize,
    rooms: RwLock<Rooms>,
}

impl LocalRuntime {
    pub fn new(config: &HostConfig, provider: Arc<dyn LlmProvider>) -> Self {
        info!(
            "Agent {} using {} ({})",
            config.character.name,
            provider.name(),
            provider.model()
        );
        Self {
            agent_id: string_to_uuid(&config.character.name),
            character: config.character.clone(),
            llm: config.llm.clone(),
            provider,
            settings: config.settings.clone(),
            read_env: true,
            memory_limit: config.memory_limit,
            max_rooms: config.max_rooms,
            rooms: RwLock::new(Rooms::default()),
        }
    }

    /// Serves settings from the config table only, ignoring the process
    /// environment.
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    pub async fn memories(&self, room_id: Uuid) -> Vec<Memory> {
        self.rooms
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(|room| room.memories.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn complete(&self, template: &str, state: &State) -> Result<String, CoreError> {
        let prompt = compose_context(template, state);
        let system = self
            .character
            .system_prompt
            .as_deref()
            .map(|system| compose_context(system, state));
        let request = self.llm.request(system, prompt);
        self.provider.complete(&request).await
    }
}

fn format_recent(messages: &[Memory], agent_id: Uuid, agent_name: &str) -> String {
    messages
        .iter()
        .map(|memory| {
            let speaker = if memory.user_id == agent_id {
                agent_name.to_string()
            } else {
                memory
                    .content
                    .metadata
                    .get("author")
                    .cloned()
                    .unwrap_or_else(|| "user".to_string())
            };
            let when = Utc
                .timestamp_millis_opt(memory.created_at)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            format!("[{}] {}: {}", when, speaker, memory.content.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl AgentRuntime for LocalRuntime {
    fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    fn get_setting(&self, key: &str) -> Option<String> {
        self.settings
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .or_else(|| {
                if self.read_env {
                    EnvSettings.setting(key)
                } else {
                    None
                }
            })
    }

    async fn create_memory(&self, memory: Memory) -> Result<(), CoreError> {
        let mut rooms = self.rooms.write().await;
        rooms.writes += 1;
        let write = rooms.writes;
        let room = rooms.rooms.entry(memory.room_id).or_default();
        room.last_write = write;
        if room.memories.iter().any(|existing| existing.id == memory.id) {
            debug!("Memory {} already stored", memory.id);
            return Ok(());
        }
        room.memories.push_back(memory);
        while room.memories.len() > self.memory_limit {
            room.memories.pop_front();
        }
        rooms.evict_idle(self.max_rooms);
        Ok(())
    }

    async fn compose_state(&self, memory: &Memory) -> Result<State, CoreError> {
        let recent: Vec<Memory> = {
            let rooms = self.rooms.read().await;
            rooms
                .rooms
                .get(&memory.room_id)
                .map(|room| {
                    let skip = room.memories.len().saturating_sub(RECENT_MESSAGES);
                    room.memories.iter().skip(skip).cloned().collect()
                })
                .unwrap_or_default()
        };

        let mut state = State::default();
        state.set("agentName", self.character.name.clone());
        state.set("bio", self.character.bio.clone());
        state.set(
            "style",
            self.character
                .style
                .iter()
                .map(|line| format!("- {}", line))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        state.set("platform", memory.content.source.clone());
        state.set("message", memory.content.text.clone());
        state.set(
            "recentMessages",
            format_recent(&recent, self.agent_id, &self.character.name),
        );
        state.recent_messages = recent;
        Ok(state)
    }

    async fn should_respond(&self, state: &State) -> Result<ResponseDecision, CoreError> {
        let template = self
            .character
            .should_respond_template
            .as_deref()
            .unwrap_or(SHOULD_RESPOND_TEMPLATE);
        let answer = self.complete(template, state).await?;
        let decision = ResponseDecision::parse(&answer);
        debug!("Model answered {:?} -> {:?}", answer.trim(), decision);
        Ok(decision)
    }

    async fn generate_response(&self, state: &State) -> Result<Content, CoreError> {
        let template = self
            .character
            .message_template
            .as_deref()
            .unwrap_or(MESSAGE_TEMPLATE);
        let text = self.complete(template, state).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidResponseFormat {
                provider: self.provider.name().to_string(),
            }
            .into());
        }

        Ok(Content {
            text: text.to_string(),
            source: state.get("platform").unwrap_or_default().to_string(),
            ..Default::default()
        })
    }
}
