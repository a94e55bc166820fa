//! Business-context directory kept in process memory.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::models::ContextFlags;
use crate::domain::ports::{ContextError, ContextProvider};

/// Looks contacts up in a static VIP list and counts the escalations the
/// engine reports back.
#[derive(Debug, Default)]
pub struct DirectoryContextProvider {
    vips: HashSet<String>,
    escalations: RwLock<HashMap<String, u32>>,
}

impl DirectoryContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vips<I, S>(mut self, contacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vips
            .extend(contacts.into_iter().map(|c| c.into().to_lowercase()));
        self
    }

    /// Seed a contact's escalation history.
    pub async fn set_escalations(&self, contact: &str, count: u32) {
        self.escalations
            .write()
            .await
            .insert(contact.to_lowercase(), count);
    }

    pub async fn escalations_for(&self, contact: &str) -> u32 {
        self.escalations
            .read()
            .await
            .get(&contact.to_lowercase())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ContextProvider for DirectoryContextProvider {
    async fn lookup(
        &self,
        _business_context: &str,
        contact: Option<&str>,
    ) -> Result<ContextFlags, ContextError> {
        let Some(contact) = contact else {
            return Ok(ContextFlags::default());
        };
        Ok(ContextFlags {
            vip: self.vips.contains(&contact.to_lowercase()),
            prior_escalations: self.escalations_for(contact).await,
        })
    }

    async fn record_escalation(&self, contact: &str) {
        *self
            .escalations
            .write()
            .await
            .entry(contact.to_lowercase())
            .or_insert(0) += 1;
    }
}
