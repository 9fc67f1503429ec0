//! Scripted language model for tests.
//!
//! `ScriptedModel` answers by rule: the first rule whose system role and
//! prompt substring both match decides the reply, otherwise the default reply
//! is returned. Every call is logged so tests can assert call counts and the
//! order in which stages ran.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::model::LanguageModel;

/// A complete decision the parser reads as buy at 0.8 confidence.
pub const BUY_REPLY: &str = r#"{"建议":"买入","推荐原因":"趋势向上","动作":"买","预测价格":7.35,"预测买入价格":7.2,"预测卖出价格":7.5,"预测信心":0.8}"#;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
}

#[derive(Debug, Clone)]
struct Rule {
    role: Option<String>,
    needle: Option<String>,
    reply: Reply,
}

impl Rule {
    fn matches(&self, system_prompt: &str, user_prompt: &str) -> bool {
        self.role.as_deref().map_or(true, |r| r == system_prompt)
            && self.needle.as_deref().map_or(true, |n| user_prompt.contains(n))
    }
}

pub struct ScriptedModel {
    rules: Mutex<Vec<Rule>>,
    default_reply: Mutex<String>,
    delay: Duration,
    calls: AtomicUsize,
    log: Mutex<Vec<(String, String)>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    /// Answers every prompt with [`BUY_REPLY`] until told otherwise.
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_reply: Mutex::new(BUY_REPLY.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    fn push(self, role: Option<&str>, needle: Option<&str>, reply: Reply) -> Self {
        self.lock_rules().push(Rule {
            role: role.map(str::to_string),
            needle: needle.map(str::to_string),
            reply,
        });
        self
    }

    pub fn reply_to(self, role: &str, text: &str) -> Self {
        self.push(Some(role), None, Reply::Text(text.to_string()))
    }

    pub fn fail_on(self, role: &str) -> Self {
        self.push(Some(role), None, Reply::Fail)
    }

    /// Reply with `text` whenever the user prompt contains `needle`.
    pub fn reply_when(self, needle: &str, text: &str) -> Self {
        self.push(None, Some(needle), Reply::Text(text.to_string()))
    }

    pub fn fail_when(self, needle: &str) -> Self {
        self.push(None, Some(needle), Reply::Fail)
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Swap the default reply while the model is shared.
    pub fn set_default_reply(&self, text: &str) {
        *self
            .default_reply
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = text.to_string();
    }

    /// Drop every rule while the model is shared.
    pub fn clear_rules(&self) {
        self.lock_rules().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(system_prompt, user_prompt)` for every call, in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<Rule>> {
        self.rules.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((system_prompt.to_string(), user_prompt.to_string()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let rule = self
            .lock_rules()
            .iter()
            .find(|r| r.matches(system_prompt, user_prompt))
            .map(|r| r.reply.clone());

        match rule {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) => Err(AgentError::Backend("scripted failure".to_string())),
            None => Ok(self
                .default_reply
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_input(code: &str) -> crate::analyzer::AnalysisInput {
    use chrono::NaiveDate;
    use tplus_data::test_support::{full_code_for, sample_bars, sample_profile, sample_snapshot};

    let last = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
    crate::analyzer::AnalysisInput {
        snapshot: sample_snapshot(code, 7.2),
        history: sample_bars(&full_code_for(code), last, 20, 7.0),
        profile: sample_profile(code),
    }
}
