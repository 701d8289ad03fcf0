//! LLM-backed structured capabilities
//!
//! [`LlmDecomposer`] and [`LlmSynthesizer`] implement the decomposition and
//! synthesis capabilities on top of any [`LLMClient`]. Client failures are
//! reported as [`CapabilityError::Transport`]; replies that do not match the
//! expected shape as [`CapabilityError::Schema`], which the core turns into
//! its deterministic fallbacks.

use crate::llm::LLMClient;
use crate::research::decomposer::{DecompositionCapability, DecompositionRequest, ProposedSubTask};
use crate::research::synthesizer::{SynthesisCapability, SynthesisRequest};
use crate::types::CapabilityError;
use async_trait::async_trait;
use schemars::schema_for;
use std::sync::Arc;

// ============================================================================
// Decomposition
// ============================================================================

/// Asks an LLM for sub-tasks as a JSON array validated against a schema.
pub struct LlmDecomposer {
    llm: Arc<dyn LLMClient>,
}

impl LlmDecomposer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    fn system_prompt(max_subtasks: usize) -> String {
        let schema = serde_json::to_string_pretty(&schema_for!(Vec<ProposedSubTask>))
            .unwrap_or_else(|_| "[]".to_string());

        format!(
            r#"You are a research planner. Break the user's research query into at most {} focused, self-contained sub-tasks for retrieval agents.

Each sub-task has:
- "query": the question a retrieval agent should answer
- "focus": a short tag such as "conceptual", "technical", or "comparative"
- "reasoning": one sentence on why it helps answer the original query

Respond with a JSON array matching this schema and nothing else:
{}"#,
            max_subtasks, schema
        )
    }

    fn user_prompt(request: &DecompositionRequest) -> String {
        let mut prompt = format!("Query: {}\nObjective: {}", request.query, request.objective);
        if !request.constraints.is_empty() {
            prompt.push_str(&format!("\nConstraints: {}", request.constraints.join("; ")));
        }
        if request.revision > 0 {
            prompt.push_str(&format!(
                "\nThis is plan revision {}. Earlier sub-tasks did not produce usable results. Current plan:\n- {}",
                request.revision,
                request.plan_steps.join("\n- ")
            ));
        }
        prompt
    }
}

#[async_trait]
impl DecompositionCapability for LlmDecomposer {
    async fn request_decomposition(
        &self,
        request: &DecompositionRequest,
    ) -> Result<Vec<ProposedSubTask>, CapabilityError> {
        let response = self
            .llm
            .generate_with_system(
                &Self::system_prompt(request.max_subtasks),
                &Self::user_prompt(request),
            )
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        tracing::debug!(model = self.llm.model_name(), "Decomposition reply received");

        let json = extract_json(&response)
            .ok_or_else(|| CapabilityError::Schema("no JSON array found in reply".to_string()))?;
        serde_json::from_str(json)
            .map_err(|e| CapabilityError::Schema(format!("failed to parse sub-tasks: {}", e)))
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Asks an LLM for one attributed answer built from successful outcomes.
pub struct LlmSynthesizer {
    llm: Arc<dyn LLMClient>,
}

impl LlmSynthesizer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    const SYSTEM_PROMPT: &'static str = r#"You combine research findings into one answer.

Rules:
1. Answer the original query directly
2. Attribute every claim to its sub-task using the [focus] label it came from
3. When findings disagree, keep both claims with their attribution and say that they conflict
4. Do not add facts that are not in the findings"#;

    fn user_prompt(request: &SynthesisRequest) -> String {
        let findings = request
            .outcomes
            .iter()
            .map(|o| format!("[{}] {}\n{}", o.subtask.focus, o.subtask.query, o.output.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Original query: {}\nObjective: {}\n\nFindings:\n{}",
            request.query, request.objective, findings
        )
    }
}

#[async_trait]
impl SynthesisCapability for LlmSynthesizer {
    async fn request_synthesis(
        &self,
        request: &SynthesisRequest,
    ) -> Result<String, CapabilityError> {
        let response = self
            .llm
            .generate_with_system(Self::SYSTEM_PROMPT, &Self::user_prompt(request))
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        let answer = response.trim();
        if answer.is_empty() {
            return Err(CapabilityError::Schema(
                "synthesis reply was empty".to_string(),
            ));
        }
        Ok(answer.to_string())
    }
}

// ============================================================================
// JSON extraction
// ============================================================================

/// Find the JSON array in an LLM reply.
///
/// Accepts a bare array, an array inside a ```json fence, or an array
/// surrounded by prose. Returns `None` when no `[`..`]` span exists.
pub fn extract_json(reply: &str) -> Option<&str> {
    let body = fenced_body(reply).unwrap_or(reply);
    let start = body.find('[')?;
    let end = body.rfind(']')?;
    (end > start).then(|| &body[start..=end])
}

fn fenced_body(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after_fence = &reply[open + 3..];
    // Skip the language tag line
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{SubagentOutcome, SubagentResponse};
    use crate::research::decomposer::SubTask;
    use crate::types::{AppError, Result};
    use std::time::Duration;

    struct ScriptedLLM(std::result::Result<&'static str, &'static str>);

    #[async_trait]
    impl LLMClient for ScriptedLLM {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.generate_with_system("", prompt).await
        }

        async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .map_err(|e| AppError::LLM(e.to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn request() -> DecompositionRequest {
        DecompositionRequest {
            query: "What is Zep?".to_string(),
            objective: "What is Zep?".to_string(),
            constraints: vec!["cite sources".to_string()],
            max_subtasks: 2,
            plan_steps: vec!["Decompose".to_string()],
            revision: 1,
            adjustment: Some("Rephrase failed sub-tasks before dispatching again".to_string()),
        }
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"[{"a":1}]"#), Some(r#"[{"a":1}]"#));
        assert_eq!(
            extract_json("Here you go:\n```json\n[1, 2]\n```\nDone."),
            Some("[1, 2]")
        );
        assert_eq!(extract_json("Sure! [1] is the list"), Some("[1]"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("] backwards ["), None);
    }

    #[tokio::test]
    async fn test_decomposer_parses_fenced_reply() {
        let llm = ScriptedLLM(Ok(
            "```json\n[{\"query\": \"What is Zep?\", \"focus\": \"conceptual\", \"reasoning\": \"overview\"}]\n```",
        ));
        let proposed = LlmDecomposer::new(Arc::new(llm))
            .request_decomposition(&request())
            .await
            .unwrap();
        assert_eq!(proposed.len(), 1);
        assert_eq!(proposed[0].focus, "conceptual");
    }

    #[tokio::test]
    async fn test_decomposer_schema_violation() {
        let llm = ScriptedLLM(Ok(r#"[{"question": "What is Zep?"}]"#));
        let err = LlmDecomposer::new(Arc::new(llm))
            .request_decomposition(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Schema(_)));
    }

    #[tokio::test]
    async fn test_decomposer_transport_error() {
        let llm = ScriptedLLM(Err("connection refused"));
        let err = LlmDecomposer::new(Arc::new(llm))
            .request_decomposition(&request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CapabilityError::Transport("LLM error: connection refused".to_string())
        );
    }

    #[test]
    fn test_prompts_carry_schema_and_revision() {
        let system = LlmDecomposer::system_prompt(2);
        assert!(system.contains("at most 2"));
        assert!(system.contains("reasoning"));

        let user = LlmDecomposer::user_prompt(&request());
        assert!(user.contains("Constraints: cite sources"));
        assert!(user.contains("plan revision 1"));
    }

    #[tokio::test]
    async fn test_synthesizer_rejects_empty_reply() {
        let subtask = SubTask {
            query: "What is Zep?".to_string(),
            focus: "conceptual".to_string(),
            rationale: String::new(),
        };
        let outcome = SubagentOutcome::from_response(
            subtask.clone(),
            "retriever",
            SubagentResponse::success("Zep is a memory layer"),
            Duration::ZERO,
        );
        let request = SynthesisRequest {
            query: "What is Zep?".to_string(),
            objective: "What is Zep?".to_string(),
            subtasks: vec![subtask],
            outcomes: vec![outcome],
        };

        assert!(LlmSynthesizer::user_prompt(&request).contains("[conceptual] What is Zep?"));

        let err = LlmSynthesizer::new(Arc::new(ScriptedLLM(Ok("  \n"))))
            .request_synthesis(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Schema(_)));

        let answer = LlmSynthesizer::new(Arc::new(ScriptedLLM(Ok(" Zep stores memory. [conceptual] "))))
            .request_synthesis(&request)
            .await
            .unwrap();
        assert_eq!(answer, "Zep stores memory. [conceptual]");
    }
}
