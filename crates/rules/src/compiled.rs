//! Rule compilation: condition strings become executable programs.

use std::time::Instant;

use vigil_core::rule::Rule;
use vigil_expr::{compile, Program};

use crate::error::RulesError;

/// Identifier roots condition expressions may reference.
///
/// `history` carries enriched historical/aggregated slots supplied by
/// the caller; the rest are built per event.
pub const ENV_ROOTS: &[&str] = &[
    "event",
    "timestamp",
    "metadata",
    "now",
    "today",
    "yesterday",
    "history",
];

/// A rule plus its compiled condition programs.
///
/// Cache entries are replaced wholesale on refresh and shared by
/// reference with the evaluation pool; nothing here is mutated after
/// construction except the `last_used` stamp.
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: Rule,
    /// One program per condition string, same order, AND-joined.
    pub programs: Vec<Program>,
    /// When this compiled form was built.
    pub compiled_at: Instant,
}

/// Compile every condition of a rule, all-or-nothing.
///
/// A rule with any uncompilable condition is excluded entirely; partial
/// compilation would silently weaken its AND-chain.
pub fn compile_rule(rule: Rule) -> Result<CompiledRule, RulesError> {
    let mut programs = Vec::with_capacity(rule.conditions.len());
    for (index, condition) in rule.conditions.iter().enumerate() {
        let program = compile(condition, ENV_ROOTS).map_err(|source| RulesError::Compile {
            name: rule.name.clone(),
            index,
            source,
        })?;
        programs.push(program);
    }
    Ok(CompiledRule {
        rule,
        programs,
        compiled_at: Instant::now(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use vigil_core::rule::{ActionSpec, Priority, Rule, Severity};

    /// A minimal enabled rule with the given conditions.
    pub fn rule_with_conditions(name: &str, conditions: &[&str]) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            kind: "test".to_string(),
            severity: Severity::High,
            priority: Priority::High,
            enabled: true,
            conditions: conditions.iter().map(|s| s.to_string()).collect(),
            actions: vec![ActionSpec::CreateAlert {
                title: None,
                description: None,
                severity: None,
                metadata: HashMap::new(),
            }],
            tags: Vec::new(),
            metadata: HashMap::new(),
            throttle_secs: None,
            evaluation_window_secs: None,
            group_by: Vec::new(),
            notification_channels: Vec::new(),
            escalation_policy_id: None,
            created_by: "test".to_string(),
            updated_by: "test".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::rule_with_conditions;
    use super::*;

    #[test]
    fn compiles_all_conditions() {
        let rule = rule_with_conditions(
            "ok",
            &["event.amount > 100", r#"contains(event.tags, "wire")"#],
        );
        let compiled = compile_rule(rule).unwrap();
        assert_eq!(compiled.programs.len(), 2);
    }

    #[test]
    fn partial_compile_failure_drops_the_rule() {
        let rule = rule_with_conditions("bad", &["event.amount > 100", "amount >"]);
        let err = compile_rule(rule).unwrap_err();
        match err {
            RulesError::Compile { name, index, .. } => {
                assert_eq!(name, "bad");
                assert_eq!(index, 1);
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn sandbox_escape_rejected_at_compile() {
        let rule = rule_with_conditions("escape", &["process.env == 1"]);
        assert!(compile_rule(rule).is_err());
    }
}
