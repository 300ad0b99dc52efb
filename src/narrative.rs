use crate::config::TEXT_TAG_PATH;
use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::sync::LazyLock;

static SCENE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<scene:\s*([^>]+)\s*>").expect("scene tag pattern is valid"));

#[async_trait(?Send)]
pub trait SnapshotSource {
    async fn fetch(&self) -> Option<Value>;
}

#[derive(Debug, Default)]
pub struct StaticSnapshots {
    current: RefCell<Option<Value>>,
}

impl StaticSnapshots {
    pub fn new(initial: Option<Value>) -> Self {
        Self {
            current: RefCell::new(initial),
        }
    }

    pub fn set(&self, snapshot: Option<Value>) {
        self.current.replace(snapshot);
    }
}

#[async_trait(?Send)]
impl SnapshotSource for StaticSnapshots {
    async fn fetch(&self) -> Option<Value> {
        self.current.borrow().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn new(id: u64, role: Role, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            text: text.into(),
        }
    }
}

#[async_trait(?Send)]
pub trait ChatHistory {
    async fn recent(&self, limit: usize) -> Vec<ChatMessage>;
}

#[derive(Debug, Default)]
pub struct MemoryChat {
    messages: RefCell<Vec<ChatMessage>>,
}

impl MemoryChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: ChatMessage) {
        self.messages.borrow_mut().push(message);
    }
}

#[async_trait(?Send)]
impl ChatHistory for MemoryChat {
    async fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let messages = self.messages.borrow();
        let start = messages.len().saturating_sub(limit);
        messages[start..].to_vec()
    }
}

pub fn latest_scene_tag(messages: &[ChatMessage]) -> Option<String> {
    for message in messages.iter().rev() {
        if message.role == Role::User {
            continue;
        }

        let Some(captures) = SCENE_TAG.captures_iter(&message.text).last() else {
            debug!("message {} carries no scene tag, scan stops", message.id);
            return None;
        };
        let id = captures[1].trim().to_lowercase();
        if id == "null" {
            debug!("message {} clears the scene tag", message.id);
            return None;
        }
        debug!("message {} selects scene {id:?}", message.id);
        return Some(id);
    }
    None
}

pub fn tag_snapshot(tag: Option<String>) -> Value {
    let mut snapshot = Map::new();
    snapshot.insert(
        TEXT_TAG_PATH.to_string(),
        tag.map_or(Value::Null, Value::String),
    );
    Value::Object(snapshot)
}

pub struct TextTagScanner<H> {
    history: H,
    window: usize,
}

impl<H: ChatHistory> TextTagScanner<H> {
    pub fn new(history: H, window: usize) -> Self {
        Self {
            history,
            window: window.max(1),
        }
    }

    pub fn history(&self) -> &H {
        &self.history
    }
}

#[async_trait(?Send)]
impl<H: ChatHistory> SnapshotSource for TextTagScanner<H> {
    async fn fetch(&self) -> Option<Value> {
        let messages = self.history.recent(self.window).await;
        Some(tag_snapshot(latest_scene_tag(&messages)))
    }
}
