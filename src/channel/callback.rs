use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use channel_plugin::message::Button;
use dashmap::DashMap;
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

use crate::state::StateValue;

/// Maps the opaque token carried by a button back to the value it stands for.
#[async_trait]
pub trait CallbackResolver: Send + Sync {
    async fn resolve(&self, user_id: &str, token: &str) -> Option<StateValue>;

    /// Forget every token minted for `user_id`.
    async fn release_user(&self, user_id: &str);
}

/// Per-user token tables that expire after a period of inactivity.
#[derive(Clone, Debug)]
pub struct CallbackRegistry {
    tokens: Cache<String, Arc<DashMap<String, StateValue>>>, // user_id → token → value
}

impl CallbackRegistry {
    pub fn new(ttl_secs: u64) -> Arc<Self> {
        let tokens = Cache::builder()
            .time_to_idle(Duration::from_secs(ttl_secs))
            .eviction_listener(|user: Arc<String>, _table, cause| {
                debug!(user_id = %user, ?cause, "callback tokens released");
            })
            .build();
        Arc::new(Self { tokens })
    }

    /// Mint a token for `value`, valid for `user_id` only.
    pub async fn register(&self, user_id: &str, value: StateValue) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let table = self
            .tokens
            .get_with(user_id.to_string(), async { Arc::new(DashMap::new()) })
            .await;
        table.insert(token.clone(), value);
        token
    }

    /// A button that resolves to `value` when `user_id` presses it.
    pub async fn button(&self, user_id: &str, text: impl Into<String>, value: impl Into<StateValue>) -> Button {
        let token = self.register(user_id, value.into()).await;
        Button::new(text, token)
    }
}

#[async_trait]
impl CallbackResolver for CallbackRegistry {
    async fn resolve(&self, user_id: &str, token: &str) -> Option<StateValue> {
        let table = self.tokens.get(user_id).await?;
        table.get(token).map(|v| v.clone())
    }

    async fn release_user(&self, user_id: &str) {
        self.tokens.invalidate(user_id).await;
    }
}
