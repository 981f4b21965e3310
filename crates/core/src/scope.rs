use std::fmt;

const SAVEPOINT_PREFIX: &str = "sp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeCommand {
    Begin,
    Commit,
    Rollback,
    Savepoint(usize),
    Release(usize),
    RollbackTo(usize),
}

impl ScopeCommand {
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Begin => "BEGIN".to_string(),
            Self::Commit => "COMMIT".to_string(),
            Self::Rollback => "ROLLBACK".to_string(),
            Self::Savepoint(depth) => format!("SAVEPOINT {}", savepoint_name(*depth)),
            Self::Release(depth) => format!("RELEASE SAVEPOINT {}", savepoint_name(*depth)),
            Self::RollbackTo(depth) => {
                format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(*depth))
            }
        }
    }
}

impl fmt::Display for ScopeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[must_use]
pub fn savepoint_name(depth: usize) -> String {
    format!("{SAVEPOINT_PREFIX}{depth}")
}

/// Depth-indexed stack of open transaction scopes.
///
/// Level 1 is the engine's top-level transaction; every level above it is a
/// savepoint named after its depth. Planning a transition never mutates the
/// stack: callers run the planned commands and only then call [`push`] or
/// [`pop`], so a failed engine call leaves the depth untouched.
///
/// [`push`]: ScopeStack::push
/// [`pop`]: ScopeStack::pop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeStack {
    depth: usize,
}

impl ScopeStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    #[must_use]
    pub fn plan_begin(&self) -> Vec<ScopeCommand> {
        match self.depth {
            0 => vec![ScopeCommand::Begin],
            depth => vec![ScopeCommand::Savepoint(depth + 1)],
        }
    }

    /// `None` when there is no scope to leave.
    #[must_use]
    pub fn plan_commit(&self) -> Option<Vec<ScopeCommand>> {
        match self.depth {
            0 => None,
            1 => Some(vec![ScopeCommand::Commit]),
            depth => Some(vec![ScopeCommand::Release(depth)]),
        }
    }

    /// `None` when there is no scope to leave.
    #[must_use]
    pub fn plan_rollback(&self) -> Option<Vec<ScopeCommand>> {
        match self.depth {
            0 => None,
            1 => Some(vec![ScopeCommand::Rollback]),
            depth => Some(vec![
                ScopeCommand::RollbackTo(depth),
                ScopeCommand::Release(depth),
            ]),
        }
    }

    pub fn push(&mut self) {
        self.depth += 1;
    }

    /// Callers plan the transition first, so popping an empty stack is a bug.
    pub fn pop(&mut self) {
        debug_assert!(self.depth > 0, "popped a scope stack that has no open scope");
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn clear(&mut self) {
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{ScopeCommand, ScopeStack};

    #[test]
    fn first_scope_is_a_top_level_transaction() {
        let stack = ScopeStack::new();

        assert_eq!(stack.plan_begin(), vec![ScopeCommand::Begin]);
        assert_eq!(stack.plan_commit(), None);
        assert_eq!(stack.plan_rollback(), None);
    }

    #[test]
    fn nested_scopes_are_savepoints_named_by_depth() {
        let mut stack = ScopeStack::new();
        stack.push();
        stack.push();

        let begin = stack.plan_begin();
        let rollback = stack.plan_rollback().expect("depth 2 has a scope");
        let commit = stack.plan_commit().expect("depth 2 has a scope");

        assert_eq!(begin[0].to_sql(), "SAVEPOINT sp3");
        assert_eq!(
            rollback.iter().map(ScopeCommand::to_sql).collect::<Vec<_>>(),
            vec!["ROLLBACK TO SAVEPOINT sp2", "RELEASE SAVEPOINT sp2"],
        );
        assert_eq!(commit[0].to_sql(), "RELEASE SAVEPOINT sp2");
    }

    #[test]
    fn push_and_pop_balance_back_to_empty() {
        let mut stack = ScopeStack::new();
        stack.push();
        stack.push();
        stack.pop();
        stack.pop();

        assert_eq!(stack.depth(), 0);
        assert!(stack.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "no open scope")]
    fn popping_an_empty_stack_is_caught_in_debug_builds() {
        let mut stack = ScopeStack::new();
        stack.pop();
    }
}
