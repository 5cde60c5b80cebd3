//! The mutation context.
//!
//! Document mutations run on exactly one dedicated thread. Work is shipped
//! to it as a job and the caller blocks until the job returns.

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::{AppError, AppResult};

/// Proof that code is running on the mutation context. Only the context
/// hands these out.
#[derive(Debug)]
pub struct ExecutionToken {
    _private: (),
}

type Job = Box<dyn FnOnce(&ExecutionToken) + Send>;

/// Where a pass evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextChoice {
    /// The scheduler's own background thread.
    Background,
    /// The mutation context.
    Mutation,
}

/// Pick the context for a pass from the capability flags of the nodes
/// taking part and the debug setting.
pub fn choose_context(requires_transaction: impl IntoIterator<Item = bool>, debug: bool) -> ContextChoice {
    if debug || requires_transaction.into_iter().any(|flag| flag) {
        ContextChoice::Mutation
    } else {
        ContextChoice::Background
    }
}

pub struct MutationContext {
    sender: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl MutationContext {
    pub fn spawn() -> AppResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name("df-mutation".to_string())
            .spawn(move || {
                let token = ExecutionToken { _private: () };
                while let Ok(job) = receiver.recv() {
                    job(&token);
                }
                tracing::debug!("mutation context stopped");
            })?;
        let thread_id = thread.thread().id();
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            thread_id,
        })
    }

    /// True when called from the mutation context itself.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Run `f` on the mutation context and wait for its result. Called from
    /// the context itself, `f` runs inline.
    pub fn run_on<R, F>(&self, f: F) -> AppResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&ExecutionToken) -> R + Send + 'static,
    {
        if self.is_current() {
            return Ok(f(&ExecutionToken { _private: () }));
        }

        let sender = self.sender.as_ref().ok_or(AppError::ContextClosed)?;
        let (reply, result) = mpsc::channel();
        let job: Job = Box::new(move |token| {
            // The caller may have gone away; nothing to do then.
            let _ = reply.send(f(token));
        });
        sender.send(job).map_err(|_| AppError::ContextClosed)?;
        result.recv().map_err(|_| AppError::ContextClosed)
    }
}

impl Drop for MutationContext {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            // The last owner may be a job running on the context itself.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl std::fmt::Debug for MutationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationContext")
            .field("thread_id", &self.thread_id)
            .field("running", &self.sender.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn jobs_run_on_one_thread() {
        let context = MutationContext::spawn().unwrap();
        let first = context.run_on(|_| thread::current().id()).unwrap();
        let second = context.run_on(|_| thread::current().id()).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, thread::current().id());
        assert_eq!(
            context.run_on(|_| thread::current().name().map(str::to_string)).unwrap(),
            Some("df-mutation".to_string())
        );
    }

    #[test]
    fn nested_run_on_executes_inline() {
        let context = Arc::new(MutationContext::spawn().unwrap());
        let inner = Arc::clone(&context);
        let value = context
            .run_on(move |_| inner.run_on(|_| 41).map(|v| v + 1))
            .unwrap()
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn choice_follows_flags_and_debug() {
        assert_eq!(choose_context([false, false], false), ContextChoice::Background);
        assert_eq!(choose_context([false, true], false), ContextChoice::Mutation);
        assert_eq!(choose_context(Vec::<bool>::new(), true), ContextChoice::Mutation);
        assert_eq!(choose_context(Vec::<bool>::new(), false), ContextChoice::Background);
    }
}
