//! Chat generators.
//!
//! A [`Bot`] wraps a [`ChatModel`] behind a fixed system instruction and a
//! bounded [`ConversationMemory`]. [`Bot::ask`] sends the instruction, the
//! remembered turns, and the new question. [`Bot::ask_with_docs`] does the
//! same with retrieved documents appended to the instruction for that call
//! only. Both share the instance's memory.
//!
//! Neither call returns an error: a failed model call is logged and comes
//! back as [`Reply::Degraded`] carrying a user-visible fallback text.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::RetrievedDocument;

/// One remembered question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Ordered log of past turns, oldest first, holding at most `max_turns`
/// (`0` means unbounded).
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
        }
    }

    /// Append a turn, dropping the oldest ones past the bound.
    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push_back(Turn {
            question: question.into(),
            answer: answer.into(),
        });
        if self.max_turns > 0 {
            while self.turns.len() > self.max_turns {
                self.turns.pop_front();
            }
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// The remembered turns as alternating user/assistant messages.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .flat_map(|t| {
                [
                    ChatMessage::user(t.question.clone()),
                    ChatMessage::assistant(t.answer.clone()),
                ]
            })
            .collect()
    }
}

/// Outcome of a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The model answered.
    Answered(String),
    /// The model call failed; `fallback` is what the user should see.
    Degraded { reason: String, fallback: String },
}

impl Reply {
    /// The text to show the user.
    pub fn text(&self) -> &str {
        match self {
            Reply::Answered(text) => text,
            Reply::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Answered(text) => text,
            Reply::Degraded { fallback, .. } => fallback,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Reply::Degraded { .. })
    }
}

const CONTEXT_INSTRUCTION: &str =
    "Use only the information from the context to answer when possible.";

pub struct Bot {
    system_prompt: String,
    model: Arc<dyn ChatModel>,
    memory: ConversationMemory,
}

impl Bot {
    pub fn new(system_prompt: impl Into<String>, model: Arc<dyn ChatModel>, max_turns: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            model,
            memory: ConversationMemory::new(max_turns),
        }
    }

    pub fn from_config(config: &LlmConfig, model: Arc<dyn ChatModel>) -> Self {
        Self::new(config.system_prompt.clone(), model, config.max_turns)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Forget all remembered turns.
    pub fn reset(&mut self) {
        self.memory.clear();
    }

    /// Answer `question` with the plain system instruction.
    pub async fn ask(&mut self, question: &str) -> Reply {
        let system = self.system_prompt.clone();
        self.generate(&system, question, "response").await
    }

    /// Answer `question` grounded in `docs`.
    pub async fn ask_with_docs(&mut self, question: &str, docs: &[RetrievedDocument]) -> Reply {
        let system = system_with_context(&self.system_prompt, docs);
        self.generate(&system, question, "RAG response").await
    }

    async fn generate(&mut self, system: &str, question: &str, what: &str) -> Reply {
        let mut messages = Vec::with_capacity(self.memory.len() * 2 + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(self.memory.to_messages());
        messages.push(ChatMessage::user(question));

        match self.model.complete(&messages).await {
            Ok(answer) => {
                self.memory.push(question, answer.clone());
                Reply::Answered(answer)
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!(model = self.model.model_name(), "error generating {}: {}", what, reason);
                Reply::Degraded {
                    fallback: format!("(LLM error) Could not generate {}: {}", what, reason),
                    reason,
                }
            }
        }
    }
}

/// Render `docs` as `- title: content` lines.
pub fn render_context(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|d| {
            let title = if d.title.is_empty() { &d.id } else { &d.title };
            format!("- {}: {}", title, d.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The system instruction extended with a `Context:` block.
pub fn system_with_context(system_prompt: &str, docs: &[RetrievedDocument]) -> String {
    format!(
        "{}\n\nContext:\n{}\n\n{}",
        system_prompt,
        render_context(docs),
        CONTEXT_INSTRUCTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every request and answers with a numbered reply.
    #[derive(Default)]
    struct RecordingModel {
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            Ok(format!("answer {}", requests.len()))
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            anyhow::bail!("Chat API error 503 Service Unavailable")
        }
    }

    fn doc(id: &str, title: &str, content: &str) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_memory_carries_previous_exchange() {
        let model = Arc::new(RecordingModel::default());
        let mut bot = Bot::new("You are helpful.", model.clone(), 0);

        assert_eq!(bot.ask("first?").await, Reply::Answered("answer 1".into()));
        bot.ask("second?").await;

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].len(), 2);
        assert_eq!(
            requests[1],
            vec![
                ChatMessage::system("You are helpful."),
                ChatMessage::user("first?"),
                ChatMessage::assistant("answer 1"),
                ChatMessage::user("second?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_ask_with_docs_builds_context_prompt() {
        let model = Arc::new(RecordingModel::default());
        let mut bot = Bot::new("Base.", model.clone(), 0);
        let docs = vec![
            doc("MAT101", "Calculus", "credits: 6"),
            doc("doc_2", "", "room: A-12"),
        ];

        bot.ask_with_docs("how many credits?", &docs).await;

        let requests = model.requests.lock().unwrap();
        assert_eq!(
            requests[0][0].content,
            "Base.\n\nContext:\n- Calculus: credits: 6\n- doc_2: room: A-12\n\n\
             Use only the information from the context to answer when possible."
        );
        assert_eq!(bot.system_prompt(), "Base.");
    }

    #[tokio::test]
    async fn test_ask_with_no_docs_is_fine() {
        let model = Arc::new(RecordingModel::default());
        let mut bot = Bot::new("Base.", model.clone(), 0);
        let reply = bot.ask_with_docs("anything?", &[]).await;
        assert!(!reply.is_degraded());
        assert!(model.requests.lock().unwrap()[0][0].content.contains("Context:\n\n"));
    }

    #[tokio::test]
    async fn test_plain_and_context_turns_share_memory() {
        let model = Arc::new(RecordingModel::default());
        let mut bot = Bot::new("Base.", model.clone(), 0);
        bot.ask("plain").await;
        bot.ask_with_docs("grounded", &[doc("a", "A", "x")]).await;
        bot.ask("plain again").await;
        assert_eq!(bot.history().len(), 3);
        assert_eq!(model.requests.lock().unwrap()[2].len(), 6);
    }

    #[tokio::test]
    async fn test_failure_returns_degraded_text() {
        let mut bot = Bot::new("Base.", Arc::new(FailingModel), 0);

        let reply = bot.ask("hello").await;
        assert!(reply.is_degraded());
        assert!(reply.text().starts_with("(LLM error) Could not generate response:"));
        assert!(reply.text().contains("503"));

        let reply = bot.ask_with_docs("hello", &[]).await;
        assert!(reply.text().starts_with("(LLM error) Could not generate RAG response:"));

        assert!(bot.history().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_memory() {
        let model = Arc::new(RecordingModel::default());
        let mut bot = Bot::new("Base.", model.clone(), 0);
        bot.ask("one").await;
        bot.reset();
        bot.ask("two").await;
        assert_eq!(model.requests.lock().unwrap()[1].len(), 2);
    }

    #[test]
    fn test_memory_bound_drops_oldest() {
        let mut memory = ConversationMemory::new(2);
        memory.push("q1", "a1");
        memory.push("q2", "a2");
        memory.push("q3", "a3");
        let questions: Vec<&str> = memory.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3"]);
        assert_eq!(memory.to_messages().len(), 4);
    }

    #[test]
    fn test_reply_text() {
        let ok = Reply::Answered("hi".into());
        assert_eq!(ok.text(), "hi");
        let degraded = Reply::Degraded {
            reason: "boom".into(),
            fallback: "(LLM error) boom".into(),
        };
        assert_eq!(degraded.clone().into_text(), "(LLM error) boom");
        assert!(degraded.is_degraded());
    }
}
