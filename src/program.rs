use std::fmt;

use tracing::debug;

use crate::backend::Backend;
use crate::error::BackendError;
use crate::instruction::Instruction;
use crate::response::Response;

/// Per-run state: the backend handle and the responses produced so far.
pub struct ExecutionContext<'a> {
    backend: &'a dyn Backend,
    responses: Vec<Response>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            responses: Vec::new(),
        }
    }

    pub fn backend(&self) -> &'a dyn Backend {
        self.backend
    }

    pub fn add_response(&mut self, response: Response) {
        self.responses.push(response);
    }

    pub fn into_last_response(self) -> Option<Response> {
        self.responses.into_iter().last()
    }
}

/// Ordered instructions produced by one resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Run every instruction in order, stopping at the first failure.
    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), BackendError> {
        for (index, instruction) in self.instructions.iter().enumerate() {
            debug!(index, %instruction, "executing");
            instruction.execute(ctx)?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{index:>3}. {instruction}")?;
        }
        Ok(())
    }
}
