//! Generator: a fixed "answer only from context and cite"
//! system prompt, temperature 0, and a max-token cap that scales with
//! query breadth, delegated to an `LlmBackend`.

use std::sync::Arc;

use async_trait::async_trait;
use policyrag_core::traits::GenerationDelta;
use policyrag_core::{Evidence, Result};

use crate::backend::LlmBackend;

pub const SYSTEM_PROMPT: &str = "You are a hospital policy assistant. Answer only using the \
context provided below. Cite the reference number for every claim you make. If the context \
does not contain the answer, say so plainly and do not speculate. Never invent a reference \
number, a dosage, a time limit, or any other fact not present in the context.";

pub const MAX_TOKENS_SINGLE_POLICY: usize = 500;
pub const MAX_TOKENS_MULTI_POLICY: usize = 800;

/// The token cap for a generation call: wider for queries that span
/// more than one policy, since the answer has more ground to cover.
pub fn max_tokens_for(is_multi_policy: bool) -> usize {
    if is_multi_policy {
        MAX_TOKENS_MULTI_POLICY
    } else {
        MAX_TOKENS_SINGLE_POLICY
    }
}

/// Renders retrieved evidence into the context block handed to the
/// model, each chunk preceded by its title/reference/section header.
pub fn assemble_context(evidence: &[Evidence]) -> String {
    evidence
        .iter()
        .map(|e| {
            format!(
                "[{} | Reference {} | Section {}]\n{}",
                e.title, e.reference_number, e.section, e.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn user_prompt(question: &str, context: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}", context, question)
}

/// Implements `policyrag_core::traits::Generator` over an `LlmBackend`,
/// always at temperature 0 with the fixed system prompt above.
pub struct PromptGenerator {
    backend: Arc<dyn LlmBackend>,
}

impl PromptGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl policyrag_core::traits::Generator for PromptGenerator {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String> {
        let result = self
            .backend
            .generate(system_prompt, user_prompt, temperature, max_tokens)
            .await
            .map_err(Into::<policyrag_core::Error>::into)?;
        Ok(result.text)
    }

    async fn complete_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
        tx: tokio::sync::mpsc::Sender<GenerationDelta>,
    ) -> Result<()> {
        self.backend
            .generate_stream(system_prompt, user_prompt, temperature, max_tokens, tx)
            .await
            .map_err(Into::<policyrag_core::Error>::into)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyrag_core::EntitySet;
    use tokio::sync::mpsc;

    struct StubBackend {
        reply: String,
    }

    #[async_trait]
    impl LlmBackend for StubBackend {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _temperature: f32,
            _max_tokens: usize,
        ) -> std::result::Result<crate::backend::GenerationResult, crate::LlmError> {
            Ok(crate::backend::GenerationResult {
                text: self.reply.clone(),
                tokens: 10,
                total_time_ms: 1,
                finish_reason: crate::backend::FinishReason::Stop,
            })
        }

        async fn generate_stream(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _temperature: f32,
            _max_tokens: usize,
            tx: mpsc::Sender<String>,
        ) -> std::result::Result<crate::backend::GenerationResult, crate::LlmError> {
            let _ = tx.send(self.reply.clone()).await;
            Ok(crate::backend::GenerationResult {
                text: self.reply.clone(),
                tokens: 10,
                total_time_ms: 1,
                finish_reason: crate::backend::FinishReason::Stop,
            })
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn max_tokens_scales_with_policy_breadth() {
        assert_eq!(max_tokens_for(false), 500);
        assert_eq!(max_tokens_for(true), 800);
    }

    #[test]
    fn context_assembly_includes_headers() {
        let evidence = vec![Evidence {
            snippet: "Wash hands before and after contact.".into(),
            title: "Hand Hygiene Policy".into(),
            reference_number: "214".into(),
            section: "2".into(),
            page_number: Some(3),
            applies_to: EntitySet::new(),
            score: 0.9,
            match_type: "retrieved".into(),
        }];
        let context = assemble_context(&evidence);
        assert!(context.contains("Hand Hygiene Policy"));
        assert!(context.contains("Reference 214"));
        assert!(context.contains("Wash hands"));
    }

    #[tokio::test]
    async fn prompt_generator_delegates_to_backend() {
        use policyrag_core::traits::Generator;
        let generator = PromptGenerator::new(Arc::new(StubBackend { reply: "Per reference 214, wash hands.".into() }));
        let text = generator.complete(SYSTEM_PROMPT, "What is the hand hygiene policy?", 0.0, 500).await.unwrap();
        assert!(text.contains("reference 214"));
    }
}
