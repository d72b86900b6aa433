//! Tool-invocation policy evaluator.
//!
//! Before a tool call is allowed to reach the client, every tool-invocation
//! policy assigned to the calling agent and scoped to that tool is checked,
//! in stable `created_at ASC, id ASC` order. The first policy that denies
//! the call wins; evaluation does not look further once a denial is found.

use std::collections::HashMap;

use archestra_core::operators::evaluate as evaluate_operator;
use archestra_core::Operator;
use archestra_store::{PolicyAction, PolicyStore, ToolInvocationPolicy};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// Outcome of evaluating a proposed tool call against its invocation policies.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationDecision {
    pub is_allowed: bool,
    pub deny_reason: Option<String>,
}

impl InvocationDecision {
    fn allow() -> Self {
        Self {
            is_allowed: true,
            deny_reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            is_allowed: false,
            deny_reason: Some(reason),
        }
    }
}

/// Evaluates proposed tool calls against an agent's tool-invocation policies.
pub struct InvocationEvaluator<'a> {
    policies: &'a PolicyStore,
}

impl<'a> InvocationEvaluator<'a> {
    pub fn new(policies: &'a PolicyStore) -> Self {
        Self { policies }
    }

    /// Decide whether `tool_name` may be invoked with `tool_arguments` by `agent_id`.
    pub async fn evaluate(
        &self,
        agent_id: &str,
        tool_name: &str,
        tool_arguments: &HashMap<String, Value>,
    ) -> Result<InvocationDecision> {
        let policies = self
            .policies
            .list_tool_invocation_policies_for_agent_and_tool(agent_id, tool_name)
            .await?;

        for policy in &policies {
            if let Some(decision) = self.evaluate_one(policy, tool_arguments) {
                return Ok(decision);
            }
        }

        Ok(InvocationDecision::allow())
    }

    /// Evaluate a single policy. Returns `Some(decision)` only when this
    /// policy denies the call; `None` means "no opinion, continue".
    fn evaluate_one(
        &self,
        policy: &ToolInvocationPolicy,
        tool_arguments: &HashMap<String, Value>,
    ) -> Option<InvocationDecision> {
        let Some(operator) = parse_operator(&policy.operator) else {
            warn!(operator = %policy.operator, policy_id = %policy.id, "unknown operator, skipping policy");
            return None;
        };

        let argument = tool_arguments.get(&policy.argument_name);

        match argument {
            None => {
                // Missing argument: a block policy has nothing to match against
                // (fail-closed would punish callers for arguments they never
                // had to supply), so it is skipped. An allow-gate policy
                // requires the argument to exist at all.
                match policy.action {
                    PolicyAction::Block => None,
                    PolicyAction::Allow => Some(InvocationDecision::deny(format!(
                        "Missing required argument: {}",
                        policy.argument_name
                    ))),
                }
            }
            Some(value) => {
                let matched = match evaluate_operator(operator, value, &policy.value) {
                    Ok(matched) => matched,
                    Err(err) => {
                        warn!(policy_id = %policy.id, %err, "policy operator failed, skipping policy");
                        return None;
                    }
                };

                match (policy.action, matched) {
                    (PolicyAction::Block, true) => Some(InvocationDecision::deny(deny_message(policy))),
                    (PolicyAction::Allow, false) => Some(InvocationDecision::deny(deny_message(policy))),
                    _ => None,
                }
            }
        }
    }
}

fn deny_message(policy: &ToolInvocationPolicy) -> String {
    policy
        .block_prompt
        .clone()
        .unwrap_or_else(|| format!("Policy violation: {}", policy.description))
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

    async fn setup() -> (AgentStore, PolicyStore, String, String) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let agents = AgentStore::new(db.clone());
        let policies = PolicyStore::new(db);

        let agent = agents.create_agent("support-bot").await.unwrap();
        let tool = agents
            .create_tool(&agent.id, "sendEmail", None, serde_json::json!({}))
            .await
            .unwrap();

        (agents, policies, agent.id, tool.id)
    }

    fn args(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn no_policies_allows() {
        let (_agents, policies, agent_id, _tool_id) = setup().await;
        let evaluator = InvocationEvaluator::new(&policies);
        let decision = evaluator
            .evaluate(&agent_id, "sendEmail", &args(&[("to", Value::String("a@b.com".into()))]))
            .await
            .unwrap();
        assert!(decision.is_allowed);
    }

    #[tokio::test]
    async fn block_policy_denies_matching_suffix() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let policy = policies
            .create_tool_invocation_policy(
                &tool_id,
                "no external sends",
                "to",
                "endsWith",
                "@grafana.com",
                PolicyAction::Block,
                Some("External domain blocked."),
            )
            .await
            .unwrap();
        policies.assign_tool_invocation_policy(&agent_id, &policy.id).await.unwrap();

        let evaluator = InvocationEvaluator::new(&policies);
        let decision = evaluator
            .evaluate(&agent_id, "sendEmail", &args(&[("to", Value::String("x@grafana.com".into()))]))
            .await
            .unwrap();
        assert!(!decision.is_allowed);
        assert_eq!(decision.deny_reason.as_deref(), Some("External domain blocked."));
    }

    #[tokio::test]
    async fn allow_gate_denies_missing_argument() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let policy = policies
            .create_tool_invocation_policy(&tool_id, "path required", "path", "contains", "", PolicyAction::Allow, None)
            .await
            .unwrap();
        policies.assign_tool_invocation_policy(&agent_id, &policy.id).await.unwrap();

        let evaluator = InvocationEvaluator::new(&policies);
        let decision = evaluator.evaluate(&agent_id, "sendEmail", &args(&[])).await.unwrap();
        assert!(!decision.is_allowed);
        assert_eq!(decision.deny_reason.as_deref(), Some("Missing required argument: path"));
    }

    #[tokio::test]
    async fn block_policy_with_missing_argument_is_skipped() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let policy = policies
            .create_tool_invocation_policy(&tool_id, "block bad domain", "to", "endsWith", "@bad.com", PolicyAction::Block, None)
            .await
            .unwrap();
        policies.assign_tool_invocation_policy(&agent_id, &policy.id).await.unwrap();

        let evaluator = InvocationEvaluator::new(&policies);
        let decision = evaluator.evaluate(&agent_id, "sendEmail", &args(&[])).await.unwrap();
        assert!(decision.is_allowed);
    }

    #[tokio::test]
    async fn first_denial_wins_over_later_policies() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let first = policies
            .create_tool_invocation_policy(&tool_id, "first", "to", "endsWith", "@bad.com", PolicyAction::Block, Some("first denied"))
            .await
            .unwrap();
        let second = policies
            .create_tool_invocation_policy(&tool_id, "second", "to", "endsWith", "@bad.com", PolicyAction::Block, Some("second denied"))
            .await
            .unwrap();
        policies.assign_tool_invocation_policy(&agent_id, &first.id).await.unwrap();
        policies.assign_tool_invocation_policy(&agent_id, &second.id).await.unwrap();

        let evaluator = InvocationEvaluator::new(&policies);
        let decision = evaluator
            .evaluate(&agent_id, "sendEmail", &args(&[("to", Value::String("x@bad.com".into()))]))
            .await
            .unwrap();
        assert_eq!(decision.deny_reason.as_deref(), Some("first denied"));
    }

    #[tokio::test]
    async fn invalid_regex_policy_is_skipped_not_fatal() {
        let (_agents, policies, agent_id, tool_id) = setup().await;
        let policy = policies
            .create_tool_invocation_policy(&tool_id, "bad regex", "to", "regex", "(unterminated", PolicyAction::Block, None)
            .await
            .unwrap();
        policies.assign_tool_invocation_policy(&agent_id, &policy.id).await.unwrap();

        let evaluator = InvocationEvaluator::new(&policies);
        let decision = evaluator
            .evaluate(&agent_id, "sendEmail", &args(&[("to", Value::String("x@y.com".into()))]))
            .await
            .unwrap();
        assert!(decision.is_allowed);
    }
}
