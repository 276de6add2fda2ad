use crate::{
    error::{RegError, RegResult},
    node::{Node, NodeHandle, NodeKind},
    value::Value,
};
use std::sync::Arc;

/// Callback of a command, called with the hosting device and the optional argument.
pub type CommandFn = Arc<dyn Fn(&Node, Option<Value>) + Send + Sync>;

pub struct Command {
    function: CommandFn,
}

impl Command {
    pub fn create(
        name: &str,
        description: &str,
        function: impl Fn(&Node, Option<Value>) + Send + Sync + 'static,
    ) -> NodeHandle {
        Node::create(name, description, false, |_| {
            NodeKind::Command(Command {
                function: Arc::new(function),
            })
        })
    }
}

impl Node {
    /// Run a command with `arg`.
    pub fn call(&self, arg: Option<Value>) -> RegResult<()> {
        let cmd = self.as_command().ok_or_else(|| RegError::WrongKind {
            path: self.path(),
            expected: "command",
        })?;
        let device = self
            .parent_device()
            .ok_or_else(|| RegError::NotAttached { path: self.path() })?;
        let function = cmd.function.clone();
        function(&device, arg);
        Ok(())
    }
}
