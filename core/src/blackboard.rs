//! Shared coordination surface for sub-agent findings and resource claims
//! (spec §3, §4.11, §6, GLOSSARY "Blackboard").

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;

use crate::ids::AtomicCounter;
use crate::protocol::AgentId;
use crate::protocol::FindingId;

/// The closed set of finding kinds (spec §9 design notes: tagged variant
/// where the set is closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Discovery,
    Analysis,
    Progress,
    Blocker,
}

/// One posted observation (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub agent_id: AgentId,
    pub topic: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: FindingType,
    pub confidence: f64,
    pub related_files: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
    pub supersedes_id: Option<FindingId>,
}

type Listener = Box<dyn Fn(&Finding) + Send + Sync>;

struct Subscription {
    topic_pattern: String,
    listener: Listener,
}

struct Inner {
    findings: Mutex<Vec<Finding>>,
    subscriptions: DashMap<u64, Subscription>,
    subscription_ids: AtomicCounter,
    finding_ids: AtomicCounter,
    claims: DashMap<String, AgentId>,
}

/// A handle returned by [`Blackboard::subscribe`].
pub struct Subscribed {
    id: u64,
    board: Arc<Inner>,
}

impl Subscribed {
    pub fn unsubscribe(self) {
        self.board.subscriptions.remove(&self.id);
    }
}

/// Matches a topic against a pattern that may end in `*` for a prefix
/// match; an exact pattern must match exactly.
fn topic_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

/// Shared findings and writer-exclusive resource claims across sub-agents
/// (spec §4.11, §6).
#[derive(Clone)]
pub struct Blackboard {
    inner: Arc<Inner>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                findings: Mutex::new(Vec::new()),
                subscriptions: DashMap::new(),
                subscription_ids: AtomicCounter::new(),
                finding_ids: AtomicCounter::new(),
                claims: DashMap::new(),
            }),
        }
    }

    /// Posts a finding, notifying every subscription whose topic pattern
    /// matches. A panicking listener is isolated, as with C3.
    pub fn post(
        &self,
        agent_id: AgentId,
        topic: impl Into<String>,
        content: impl Into<String>,
        kind: FindingType,
        confidence: f64,
        related_files: Option<Vec<String>>,
    ) -> FindingId {
        let topic = topic.into();
        let finding = Finding {
            id: FindingId::from_counter(&self.inner.finding_ids),
            agent_id,
            topic,
            content: content.into(),
            kind,
            confidence,
            related_files,
            timestamp: Utc::now(),
            supersedes_id: None,
        };

        for entry in self.inner.subscriptions.iter() {
            let sub = entry.value();
            if topic_matches(&sub.topic_pattern, &finding.topic) {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| (sub.listener)(&finding)));
                if let Err(panic) = result {
                    warn!(subscription_id = *entry.key(), ?panic, "blackboard listener panicked");
                }
            }
        }

        self.inner.findings.lock().expect("blackboard lock poisoned").push(finding.clone());
        finding.id
    }

    /// Returns findings matching an optional topic pattern and/or type,
    /// most recent last.
    pub fn query(&self, topic_pattern: Option<&str>, kind: Option<FindingType>) -> Vec<Finding> {
        self.inner
            .findings
            .lock()
            .expect("blackboard lock poisoned")
            .iter()
            .filter(|f| topic_pattern.map_or(true, |p| topic_matches(p, &f.topic)))
            .filter(|f| kind.map_or(true, |k| f.kind == k))
            .cloned()
            .collect()
    }

    /// Returns up to `limit` of the most recent `discovery`/`analysis`
    /// findings (spec §4.11 step 3).
    pub fn recent_context(&self, limit: usize) -> Vec<Finding> {
        let findings = self.inner.findings.lock().expect("blackboard lock poisoned");
        findings
            .iter()
            .rev()
            .filter(|f| matches!(f.kind, FindingType::Discovery | FindingType::Analysis))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn subscribe<F>(&self, topic_pattern: impl Into<String>, listener: F) -> Subscribed
    where
        F: Fn(&Finding) + Send + Sync + 'static,
    {
        let id = self.inner.subscription_ids.next();
        self.inner.subscriptions.insert(
            id,
            Subscription {
                topic_pattern: topic_pattern.into(),
                listener: Box::new(listener),
            },
        );
        Subscribed {
            id,
            board: Arc::clone(&self.inner),
        }
    }

    pub fn unsubscribe(&self, handle: Subscribed) {
        handle.unsubscribe();
    }

    /// Claims `resource` for `agent_id` in writer-exclusive mode.
    /// Non-blocking: returns `false` immediately on conflict (spec §5).
    pub fn claim(&self, resource: impl Into<String>, agent_id: AgentId) -> bool {
        match self.inner.claims.entry(resource.into()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(agent_id);
                true
            }
            dashmap::mapref::entry::Entry::Occupied(_) => false,
        }
    }

    /// Releases `resource`, but only if `agent_id` currently holds it.
    pub fn release(&self, resource: &str, agent_id: &AgentId) -> bool {
        match self.inner.claims.get(resource) {
            Some(holder) if *holder == *agent_id => {
                drop(holder);
                self.inner.claims.remove(resource);
                true
            }
            _ => false,
        }
    }

    pub fn is_claimed(&self, resource: &str) -> Option<AgentId> {
        self.inner.claims.get(resource).map(|v| v.clone())
    }
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "blackboard.test.rs"]
mod tests;
