use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{MpdError, Result};
use crate::protocol::{Request, Response};

/// Lifecycle of a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    /// Waiting to be written
    Initial,
    /// On the wire, waiting for the reply
    Written,
    /// Reply delivered
    Complete,
}

pub(crate) type ReplySender = oneshot::Sender<Result<Response>>;

pub(crate) struct PendingCommand {
    pub request: Request,
    state: TaskState,
    ticks: u32,
    reply: Option<ReplySender>,
}

impl PendingCommand {
    pub fn new(request: Request, reply: ReplySender) -> Self {
        Self {
            request,
            state: TaskState::Initial,
            ticks: 0,
            reply: Some(reply),
        }
    }

    /// A command nobody waits for (re-login after reconnect)
    pub fn detached(request: Request) -> Self {
        Self {
            request,
            state: TaskState::Initial,
            ticks: 0,
            reply: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn mark_written(&mut self) {
        self.state = TaskState::Written;
        self.ticks = 0;
    }

    /// Answer without ever writing it
    pub fn fail(self, error: MpdError) {
        self.finish(Err(error));
    }

    fn finish(mut self, result: Result<Response>) {
        self.state = TaskState::Complete;
        match self.reply.take() {
            Some(reply) => {
                // the caller may have given up waiting
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!("Background command {} failed: {}", self.request.label(), e);
                }
            }
        }
    }
}

/// FIFO of commands where only the head is ever in flight
pub(crate) struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    timeout_ticks: u32,
}

impl CommandQueue {
    pub fn new(timeout_ticks: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            timeout_ticks,
        }
    }

    pub fn push(&mut self, command: PendingCommand) {
        self.pending.push_back(command);
    }

    pub fn push_front(&mut self, command: PendingCommand) {
        self.pending.push_front(command);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn head_state(&self) -> Option<TaskState> {
        self.pending.front().map(PendingCommand::state)
    }

    /// The head, if it still has to be written
    pub fn next_to_write(&mut self) -> Option<&mut PendingCommand> {
        self.pending
            .front_mut()
            .filter(|head| head.state() == TaskState::Initial)
    }

    /// Deliver a reply to the written head. Returns false if nothing was waiting.
    pub fn complete(&mut self, result: Result<Response>) -> bool {
        if self.head_state() != Some(TaskState::Written) {
            return false;
        }
        match self.pending.pop_front() {
            Some(head) => {
                head.finish(result);
                true
            }
            None => false,
        }
    }

    /// Count one tick against the written head; fails it once it runs out.
    /// Returns the label of a command that timed out.
    pub fn tick(&mut self) -> Option<String> {
        let head = self.pending.front_mut()?;
        if head.state() != TaskState::Written {
            return None;
        }
        if head.ticks < self.timeout_ticks {
            head.ticks += 1;
            return None;
        }
        let head = self.pending.pop_front()?;
        let label = head.request.label();
        head.finish(Err(MpdError::Timeout(format!("Timeout on {}", label))));
        Some(label)
    }

    /// Fail the head if it is on the wire
    pub fn fail_written(&mut self, error: impl FnOnce() -> MpdError) {
        if self.head_state() == Some(TaskState::Written) {
            if let Some(head) = self.pending.pop_front() {
                head.finish(Err(error()));
            }
        }
    }

    /// Fail everything
    pub fn fail_all(&mut self, error: impl Fn() -> MpdError) {
        for command in self.pending.drain(..) {
            command.finish(Err(error()));
        }
    }
}
