use serde::Serialize;

use crate::host::HostTarget;
use crate::stack::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepScope {
    Stack,
    Host,
}

/// One named shell operation, run in `dir` on `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandStep {
    pub name: String,
    pub target: HostTarget,
    pub dir: Option<String>,
    pub program: String,
    pub args: Vec<String>,
    pub scope: StepScope,
}

impl CommandStep {
    pub fn command_line(&self) -> String {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.as_str());
        argv.extend(self.args.iter().map(String::as_str));
        shell_words::join(argv)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub program: String,
    pub base_args: Vec<String>,
}

impl Default for ComposeCommand {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            base_args: vec!["compose".to_string()],
        }
    }
}

impl ComposeCommand {
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            base_args: rest.to_vec(),
        })
    }

    pub fn args(&self, extra: &[&str]) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend(extra.iter().map(|arg| arg.to_string()));
        args
    }

    fn stack_step(&self, stack: &Stack, name: &str, extra: &[&str]) -> CommandStep {
        CommandStep {
            name: name.to_string(),
            target: stack.host().clone(),
            dir: Some(stack.path().to_string()),
            program: self.program.clone(),
            args: self.args(extra),
            scope: StepScope::Stack,
        }
    }

    pub fn up_sequence(&self, stack: &Stack) -> Vec<CommandStep> {
        vec![self.stack_step(stack, "compose up", &["up", "-d"])]
    }

    pub fn down_sequence(&self, stack: &Stack) -> Vec<CommandStep> {
        vec![self.stack_step(stack, "compose down", &["down"])]
    }

    pub fn pull_sequence(&self, stack: &Stack) -> Vec<CommandStep> {
        vec![self.stack_step(stack, "pull images", &["pull"])]
    }

    pub fn refresh_sequence(&self, stack: &Stack) -> Vec<CommandStep> {
        vec![
            self.stack_step(stack, "pull images", &["pull"]),
            self.stack_step(stack, "compose down", &["down"]),
            self.stack_step(stack, "compose up", &["up", "-d"]),
        ]
    }
}

pub fn prune_host_step(host: &HostTarget) -> CommandStep {
    CommandStep {
        name: "prune host".to_string(),
        target: host.clone(),
        dir: None,
        program: "docker".to_string(),
        args: vec!["system".to_string(), "prune".to_string(), "-f".to_string()],
        scope: StepScope::Host,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Up,
    Down,
    Pull,
    Refresh,
    Prune,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceTarget {
    Stack { stack: Stack },
    Host { host: HostTarget },
}

impl SequenceTarget {
    /// Key under which at most one sequence may run at a time.
    pub fn key(&self) -> String {
        match self {
            SequenceTarget::Stack { stack } => stack.identifier(),
            SequenceTarget::Host { host } => format!("host:{}", host.server_name()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            SequenceTarget::Stack { stack } => {
                format!("{} ({})", stack.name(), stack.host().server_name())
            }
            SequenceTarget::Host { host } => host.server_name().to_string(),
        }
    }

    pub fn host(&self) -> &HostTarget {
        match self {
            SequenceTarget::Stack { stack } => stack.host(),
            SequenceTarget::Host { host } => host,
        }
    }
}

impl SequenceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SequenceKind::Up => "up",
            SequenceKind::Down => "down",
            SequenceKind::Pull => "pull",
            SequenceKind::Refresh => "refresh",
            SequenceKind::Prune => "prune",
        }
    }

    /// Builds the ordered steps for this kind, or `None` when the kind does
    /// not apply to the target (stack kinds need a stack, prune needs a host).
    pub fn steps_for(
        &self,
        target: &SequenceTarget,
        compose: &ComposeCommand,
    ) -> Option<Vec<CommandStep>> {
        match (self, target) {
            (SequenceKind::Up, SequenceTarget::Stack { stack }) => Some(compose.up_sequence(stack)),
            (SequenceKind::Down, SequenceTarget::Stack { stack }) => {
                Some(compose.down_sequence(stack))
            }
            (SequenceKind::Pull, SequenceTarget::Stack { stack }) => {
                Some(compose.pull_sequence(stack))
            }
            (SequenceKind::Refresh, SequenceTarget::Stack { stack }) => {
                Some(compose.refresh_sequence(stack))
            }
            (SequenceKind::Prune, SequenceTarget::Host { host }) => {
                Some(vec![prune_host_step(host)])
            }
            _ => None,
        }
    }
}
