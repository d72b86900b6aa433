//! Trusted-data policy evaluator.
//!
//! A tool's result is trusted only if at least one trusted-data policy
//! assigned to the calling agent and scoped to that tool matches it. A
//! policy matches only if every leaf value its `attribute_path` resolves to
//! satisfies the operator; a path that resolves to zero leaves never
//! matches. Untrusted results are routed to dual-LLM sanitization.

use archestra_core::jsonpath;
use archestra_core::operators::evaluate as evaluate_operator;
use archestra_core::Operator;
use archestra_store::{PolicyStore, TrustedDataPolicy};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// Outcome of evaluating a tool result against its trusted-data policies.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustDecision {
    pub is_trusted: bool,
    /// Reserved for future policies that unconditionally block a result
    /// outright rather than routing it to sanitization.
    pub is_blocked: bool,
    pub should_sanitize_with_dual_llm: bool,
    pub reason: String,
}

/// Evaluates tool results against an agent's trusted-data policies.
pub struct TrustedDataEvaluator<'a> {
    policies: &'a PolicyStore,
}

impl<'a> TrustedDataEvaluator<'a> {
    pub fn new(policies: &'a PolicyStore) -> Self {
        Self { policies }
    }

    /// Decide whether `tool_result` returned by `tool_name` should be trusted.
    pub async fn evaluate(
        &self,
        agent_id: &str,
        tool_name: &str,
        tool_result: &Value,
    ) -> Result<TrustDecision> {
        let policies = self
            .policies
            .list_trusted_data_policies_for_agent_and_tool(agent_id, tool_name)
            .await?;

        for policy in &policies {
            if self.policy_matches(policy, tool_result) {
                return Ok(TrustDecision {
                    is_trusted: true,
                    is_blocked: false,
                    should_sanitize_with_dual_llm: false,
                    reason: policy.description.clone(),
                });
            }
        }

        Ok(TrustDecision {
            is_trusted: false,
            is_blocked: false,
            should_sanitize_with_dual_llm: true,
            reason: "no applicable trusted-data policy matched".to_string(),
        })
    }

    fn policy_matches(&self, policy: &TrustedDataPolicy, tool_result: &Value) -> bool {
        let Some(operator) = parse_operator(&policy.operator) else {
            warn!(operator = %policy.operator, policy_id = %policy.id, "unknown operator, skipping policy");
            return false;
        };

        let leaves = match jsonpath::extract(&policy.attribute_path, tool_result) {
            Ok(leaves) => leaves,
            Err(err) => {
                warn!(policy_id = %policy.id, %err, "invalid attribute path, skipping policy");
                return false;
            }
        };

        if leaves.is_empty() {
            return false;
        }

        leaves.iter().all(|leaf| match evaluate_operator(operator, leaf, &policy.value) {
            Ok(matched) => matched,
            Err(err) => {
                warn!(policy_id = %policy.id, %err, "policy operator failed, treating leaf as non-matching");
                false
            }
        })
    }
}

fn parse_operator(s: &str) -> Option<Operator> {
    match s {
        "equal" => Some(Operator::Equal),
        "notEqual" => Some(Operator::NotEqual),
        "contains" => Some(Operator::Contains),
        "notContains" => Some(Operator::NotContains),
        "startsWith" => Some(Operator::StartsWith),
        "endsWith" => Some(Operator::EndsWith),
        "regex" => Some(Operator::Regex),
        _ => None,
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use archestra_store::{AgentStore, Database};
    use serde_json::json;

    async fn setup() -> (AgentStore, PolicyStore, String, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let agents = AgentStore::new(db.clone());
        let policies = PolicyStore::new(db);

        let agent = agents.create_agent("support-bot").await.unwrap();
        let tool = agents
            .create_tool(&agent.id, "fetchInbox", None, json!({}))
            .await
            .unwrap();

        (agents, policies, agent.id, tool.id)
    }

    #[tokio::test]
    async fn no_policies_is_untrusted_and_sanitized() {
        let (_agents, policies, agent_id, _tool_id) = setup().await;
        let evaluator = TrustedDataEvaluator::new(&policies);
        let decision = evaluator
            .evaluate(&agent_id, "fetchInbox", &json!({"emails": []}))
            .await
            .unwrap();
        assert!(!decision.is_trusted);
        assert!(decision.should_sanitize_with_dual_llm);
    }

    #[tokio::test]
    async fn all_matching_senders_is_trusted() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let policy = policies
            .create_trusted_data_policy(&tool_id, "trusted senders", "emails[*].from", "endsWith", "@example.com")
            .await
            .unwrap();
        policies.assign_trusted_data_policy(&agent_id, &policy.id).await.unwrap();

        let evaluator = TrustedDataEvaluator::new(&policies);
        let result = json!({"emails": [{"from": "a@example.com"}, {"from": "b@example.com"}]});
        let decision = evaluator.evaluate(&agent_id, "fetchInbox", &result).await.unwrap();
        assert!(decision.is_trusted);
        assert!(!decision.should_sanitize_with_dual_llm);
        assert_eq!(decision.reason, "trusted senders");
    }

    #[tokio::test]
    async fn one_mismatching_leaf_fails_whole_policy() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let policy = policies
            .create_trusted_data_policy(&tool_id, "trusted senders", "emails[*].from", "endsWith", "@example.com")
            .await
            .unwrap();
        policies.assign_trusted_data_policy(&agent_id, &policy.id).await.unwrap();

        let evaluator = TrustedDataEvaluator::new(&policies);
        let result = json!({"emails": [{"from": "a@example.com"}, {"from": "evil@attacker.net"}]});
        let decision = evaluator.evaluate(&agent_id, "fetchInbox", &result).await.unwrap();
        assert!(!decision.is_trusted);
    }

    #[tokio::test]
    async fn empty_leaf_set_never_matches() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let policy = policies
            .create_trusted_data_policy(&tool_id, "trusted senders", "emails[*].from", "endsWith", "@example.com")
            .await
            .unwrap();
        policies.assign_trusted_data_policy(&agent_id, &policy.id).await.unwrap();

        let evaluator = TrustedDataEvaluator::new(&policies);
        let decision = evaluator
            .evaluate(&agent_id, "fetchInbox", &json!({"emails": []}))
            .await
            .unwrap();
        assert!(!decision.is_trusted);
    }
}
