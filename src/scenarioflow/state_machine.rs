//! Linear/branching traversal of an ordered step sequence over a mutable
//! context. Ported from `ScenarioStateMachine` (the original engine's
//! state machine), including its two branch formats and the mixed-type
//! comparison coercion documented in `SPEC_FULL.md` §9.3.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scenarioflow::expr;
use crate::scenarioflow::model::{Branch, BranchSpec, ContextExt, NextStep, Step};

/// A plain-data round-trip form of a `StateMachine`, suitable for
/// embedding in a `PausedScenarioRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachineSnapshot {
    pub scenario_name: String,
    pub current_index: usize,
    pub context: Value,
}

pub struct StateMachine {
    scenario_name: String,
    steps: Vec<Step>,
    current_index: usize,
    context: Value,
    is_finished: bool,
}

impl StateMachine {
    pub fn new(scenario_name: impl Into<String>, steps: Vec<Step>, context: Value) -> Self {
        StateMachine {
            scenario_name: scenario_name.into(),
            steps,
            current_index: 0,
            context,
            is_finished: false,
        }
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Value {
        &mut self.context
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_index)
    }

    /// Advances `current_index` per the current step's control-flow
    /// rules, merging `input_data` into the context first if present.
    /// Returns the new current step, or `None` at end of scenario.
    pub fn next_step(&mut self, input_data: Option<&Value>) -> Option<&Step> {
        if let Some(input) = input_data {
            self.context.merge_in_place(input);
        }

        let idx = self.current_index;
        let step = self.steps.get(idx).cloned();

        if let Some(step) = &step {
            if step.type_tag == "branch" {
                if let Some(BranchSpec::List(branches)) = &step.branches {
                    if let Some(target) = self.resolve_branch_list(branches) {
                        self.current_index = target;
                        return self.steps.get(self.current_index);
                    }
                }
            }

            if let (Some(cond), Some(BranchSpec::Legacy(legacy))) = (&step.condition, &step.branches) {
                if let Some(target) = self.resolve_legacy_branch(cond, legacy) {
                    self.current_index = target;
                    return self.steps.get(self.current_index);
                }
            }

            if let Some(next) = &step.next_step {
                if let Some(target) = self.resolve_next_step(next) {
                    self.current_index = target;
                    return self.steps.get(self.current_index);
                }
                log::debug!("next_step target not found: {:?}", next);
            }
        }

        if idx + 1 < self.steps.len() {
            self.current_index = idx + 1;
        } else {
            self.current_index = self.steps.len();
            self.is_finished = true;
        }
        self.steps.get(self.current_index)
    }

    fn resolve_branch_list(&self, branches: &[Branch]) -> Option<usize> {
        let mut default_target: Option<&str> = None;
        for branch in branches {
            if branch.condition == "default" {
                default_target = Some(&branch.next_step);
                continue;
            }
            match expr::eval_condition(&branch.condition, &self.context) {
                Ok(true) => return self.find_step_index_by_id(&branch.next_step),
                Ok(false) => continue,
                Err(e) => {
                    log::error!(
                        "branch condition error: condition={} error={}",
                        branch.condition,
                        e
                    );
                    continue;
                }
            }
        }
        default_target.and_then(|id| self.find_step_index_by_id(id))
    }

    fn resolve_legacy_branch(
        &self,
        condition: &str,
        legacy: &crate::scenarioflow::model::LegacyBranches,
    ) -> Option<usize> {
        match expr::eval_condition(condition, &self.context) {
            Ok(true) => legacy.on_true,
            Ok(false) => legacy.on_false,
            Err(e) => {
                log::error!("legacy condition error: condition={} error={}", condition, e);
                None
            }
        }
    }

    fn resolve_next_step(&self, next: &NextStep) -> Option<usize> {
        match next {
            NextStep::Id(id) => self.find_step_index_by_id(id),
            NextStep::Index(idx) => {
                if *idx < self.steps.len() {
                    Some(*idx)
                } else {
                    None
                }
            }
        }
    }

    fn find_step_index_by_id(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn serialize(&self) -> StateMachineSnapshot {
        StateMachineSnapshot {
            scenario_name: self.scenario_name.clone(),
            current_index: self.current_index,
            context: self.context.clone(),
        }
    }

    pub fn from_snapshot(steps: Vec<Step>, snapshot: StateMachineSnapshot) -> Self {
        StateMachine {
            scenario_name: snapshot.scenario_name,
            steps,
            current_index: snapshot.current_index,
            context: snapshot.context,
            is_finished: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarioflow::model::Step;
    use serde_json::json;

    fn step(id: &str, type_tag: &str) -> Step {
        Step {
            id: id.to_string(),
            type_tag: type_tag.to_string(),
            params: json!({}),
            next_step: None,
            branches: None,
            condition: None,
        }
    }

    #[test]
    fn linear_advance_by_default() {
        let steps = vec![step("a", "start"), step("b", "log_message"), step("c", "end")];
        let mut sm = StateMachine::new("s", steps, json!({}));
        assert_eq!(sm.current_step().unwrap().id, "a");
        assert_eq!(sm.next_step(None).unwrap().id, "b");
        assert_eq!(sm.next_step(None).unwrap().id, "c");
        assert!(sm.next_step(None).is_none());
        assert!(sm.is_finished());
    }

    #[test]
    fn branch_true_selects_matching_branch() {
        let mut branch_step = step("br", "branch");
        branch_step.branches = Some(BranchSpec::List(vec![
            Branch {
                condition: "x > 0".to_string(),
                next_step: "pos".to_string(),
                label: None,
            },
            Branch {
                condition: "default".to_string(),
                next_step: "neg".to_string(),
                label: None,
            },
        ]));
        let steps = vec![branch_step, step("pos", "end"), step("neg", "end")];
        let mut sm = StateMachine::new("s", steps, json!({"x": 5}));
        assert_eq!(sm.next_step(None).unwrap().id, "pos");
    }

    #[test]
    fn branch_false_falls_back_to_default() {
        let mut branch_step = step("br", "branch");
        branch_step.branches = Some(BranchSpec::List(vec![
            Branch {
                condition: "x > 0".to_string(),
                next_step: "pos".to_string(),
                label: None,
            },
            Branch {
                condition: "default".to_string(),
                next_step: "neg".to_string(),
                label: None,
            },
        ]));
        let steps = vec![branch_step, step("pos", "end"), step("neg", "end")];
        let mut sm = StateMachine::new("s", steps, json!({"x": -1}));
        assert_eq!(sm.next_step(None).unwrap().id, "neg");
    }

    #[test]
    fn explicit_next_step_by_id() {
        let mut s = step("a", "action");
        s.next_step = Some(NextStep::Id("c".to_string()));
        let steps = vec![s, step("b", "end"), step("c", "end")];
        let mut sm = StateMachine::new("s", steps, json!({}));
        assert_eq!(sm.next_step(None).unwrap().id, "c");
    }

    #[test]
    fn input_data_is_merged_before_branch_evaluation() {
        let mut branch_step = step("br", "branch");
        branch_step.branches = Some(BranchSpec::List(vec![
            Branch {
                condition: "choice == \"yes\"".to_string(),
                next_step: "yes_step".to_string(),
                label: None,
            },
            Branch {
                condition: "default".to_string(),
                next_step: "no_step".to_string(),
                label: None,
            },
        ]));
        let steps = vec![branch_step, step("yes_step", "end"), step("no_step", "end")];
        let mut sm = StateMachine::new("s", steps, json!({}));
        let next = sm.next_step(Some(&json!({"choice": "yes"})));
        assert_eq!(next.unwrap().id, "yes_step");
    }

    #[test]
    fn serialize_then_from_snapshot_round_trips() {
        let steps = vec![step("a", "start"), step("b", "end")];
        let mut sm = StateMachine::new("s", steps.clone(), json!({"k": 1}));
        sm.next_step(None);
        let snapshot = sm.serialize();
        let restored = StateMachine::from_snapshot(steps, snapshot);
        assert_eq!(restored.current_step().unwrap().id, "b");
        assert_eq!(restored.context(), &json!({"k": 1}));
    }
}
