//! Run scheduling.
//!
//! A run evaluates every topmost dirty node of the home workspace. Runs
//! execute on a background thread; a pass whose nodes touch the document,
//! or any pass in debug mode, moves to the mutation context. The closing
//! commit always happens on the mutation context. Edits and change batches
//! wait for a pass in flight to finish, commit included.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use df_core::{ChangeBatch, NodeId};
use df_eval::{EvalError, Expr};
use df_graph::{
    compile, compile_with, requires_transaction, BuildContext, CompileError, Compiled, PassPlan,
    WorkspaceId,
};
use tracing::{debug, error, info, warn};

use crate::context::{choose_context, ContextChoice, ExecutionToken, MutationContext};
use crate::error::AppResult;
use crate::run_state::{RunGate, RunPhase, RunTrigger};
use crate::session::{Edit, EditOutcome, Session};
use crate::transaction::TransactionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every topmost node evaluated and the transaction committed.
    Success,
    /// Some node failed to compile or evaluate, or the transaction failed.
    PartialFailure,
    /// Stopped by `cancel` before every node was evaluated.
    Cancelled,
}

/// What one pass did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trigger: RunTrigger,
    pub mode: TransactionMode,
    pub context: ContextChoice,
    /// Topmost nodes evaluated, in evaluation order, with their results.
    pub evaluated: Vec<(NodeId, Expr)>,
    pub compile_errors: Vec<(NodeId, CompileError)>,
    /// The evaluation error that stopped the pass.
    pub runtime_error: Option<(NodeId, EvalError)>,
    /// Transaction or context failure outside node evaluation.
    pub failure: Option<String>,
    pub committed: bool,
    pub rolled_back: bool,
    pub outcome: RunOutcome,
    /// Every node this pass marked Clean. Dirtied again if the pass rolls back.
    pub contributors: Vec<NodeId>,
}

impl RunReport {
    fn new(trigger: RunTrigger, mode: TransactionMode, context: ContextChoice) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            trigger,
            mode,
            context,
            evaluated: Vec::new(),
            compile_errors: Vec::new(),
            runtime_error: None,
            failure: None,
            committed: false,
            rolled_back: false,
            outcome: RunOutcome::Success,
            contributors: Vec::new(),
        }
    }

    /// Result computed for `node` in this pass.
    pub fn result(&self, node: NodeId) -> Option<&Expr> {
        self.evaluated
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, value)| value)
    }

    fn settle(&mut self) {
        if self.outcome == RunOutcome::Cancelled {
            return;
        }
        let failed = !self.compile_errors.is_empty()
            || self.runtime_error.is_some()
            || self.failure.is_some();
        self.outcome = if failed {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        };
    }
}

/// Handle to a requested run.
#[derive(Debug)]
pub enum RunTicket {
    /// This request started a run thread.
    Started(JoinHandle<Vec<RunReport>>),
    /// A run was already in flight; the request folded into its trailing run.
    Queued,
}

impl RunTicket {
    pub fn is_queued(&self) -> bool {
        matches!(self, RunTicket::Queued)
    }

    /// Wait for the run thread. Returns the reports of every pass it ran,
    /// including trailing passes; empty for a queued ticket.
    pub fn wait(self) -> Vec<RunReport> {
        match self {
            RunTicket::Started(handle) => handle.join().unwrap_or_else(|_| {
                error!("run thread panicked");
                Vec::new()
            }),
            RunTicket::Queued => Vec::new(),
        }
    }
}

struct Inner {
    /// Held for a whole pass and by every edit.
    pass: Mutex<()>,
    session: Mutex<Session>,
    gate: Mutex<RunGate>,
    idle: Condvar,
    cancel: AtomicBool,
    context: MutationContext,
}

impl Inner {
    // Lock order: `pass`, then `session`, then `gate`.
    fn lock_pass(&self) -> MutexGuard<'_, ()> {
        self.pass.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_gate(&self) -> MutexGuard<'_, RunGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, phase: RunPhase) {
        self.lock_gate().enter(phase);
    }
}

/// Owns a session and serializes runs over it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(session: Session) -> AppResult<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                pass: Mutex::new(()),
                session: Mutex::new(session),
                gate: Mutex::new(RunGate::new()),
                idle: Condvar::new(),
                cancel: AtomicBool::new(false),
                context: MutationContext::spawn()?,
            }),
        })
    }

    /// Request a manual run.
    pub fn request_run(&self) -> RunTicket {
        self.request_run_with(RunTrigger::Manual)
    }

    pub fn request_run_with(&self, trigger: RunTrigger) -> RunTicket {
        let start = self.inner.lock_gate().request(trigger);
        if !start {
            debug!(?trigger, "run in flight, request queued");
            return RunTicket::Queued;
        }
        spawn_runs(Arc::clone(&self.inner), trigger)
    }

    /// Run now and wait. When a run is already in flight this waits for it
    /// and its trailing run instead, and returns no reports.
    pub fn run_blocking(&self) -> Vec<RunReport> {
        match self.request_run() {
            RunTicket::Queued => {
                self.wait_idle();
                Vec::new()
            }
            ticket => ticket.wait(),
        }
    }

    /// Block until no run is in flight.
    pub fn wait_idle(&self) {
        let mut gate = self.inner.lock_gate();
        while gate.is_running() {
            gate = self
                .inner
                .idle
                .wait(gate)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop the pass in flight before its next node.
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
    }

    pub fn phase(&self) -> RunPhase {
        self.inner.lock_gate().phase()
    }

    pub fn runs_started(&self) -> usize {
        self.inner.lock_gate().runs_started()
    }

    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.inner.lock_session())
    }

    /// Apply an edit; with dynamic run on this also requests an automatic run.
    /// Waits for a pass in flight to finish first.
    pub fn apply_edit(&self, edit: impl Into<Edit>) -> AppResult<EditOutcome> {
        let (outcome, dynamic) = {
            let _pass = self.inner.lock_pass();
            let mut session = self.inner.lock_session();
            let outcome = session.apply_edit(edit)?;
            (outcome, session.config.dynamic_run)
        };
        if dynamic {
            self.request_run_with(RunTrigger::Automatic);
        }
        Ok(outcome)
    }

    /// Forward a document change batch. Returns true when a watched entity
    /// was involved; with dynamic run on that also requests a run.
    pub fn notify_changed(&self, batch: &ChangeBatch) -> bool {
        let (relevant, dynamic) = {
            let _pass = self.inner.lock_pass();
            let mut session = self.inner.lock_session();
            (session.notify_changed(batch), session.config.dynamic_run)
        };
        if relevant && dynamic {
            self.request_run_with(RunTrigger::Automatic);
        }
        relevant
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("phase", &self.phase())
            .field("context", &self.inner.context)
            .finish()
    }
}

fn spawn_runs(inner: Arc<Inner>, first: RunTrigger) -> RunTicket {
    let worker = Arc::clone(&inner);
    let spawned = thread::Builder::new()
        .name("df-run".to_string())
        .spawn(move || {
            let mut reports = Vec::new();
            let mut trigger = first;
            loop {
                reports.push(run_pass(&worker, trigger));
                let next = worker.lock_gate().finish();
                match next {
                    Some(queued) => trigger = queued,
                    None => {
                        worker.idle.notify_all();
                        break;
                    }
                }
            }
            reports
        });

    match spawned {
        Ok(handle) => RunTicket::Started(handle),
        Err(err) => {
            error!(error = %err, "failed to start run thread");
            let mut gate = inner.lock_gate();
            while gate.finish().is_some() {}
            drop(gate);
            inner.idle.notify_all();
            RunTicket::Queued
        }
    }
}

fn run_pass(inner: &Arc<Inner>, trigger: RunTrigger) -> RunReport {
    let _pass = inner.lock_pass();
    let started_at = Utc::now();
    let debug = inner.lock_session().config.debug;

    let mut report = if debug {
        on_context(inner, trigger)
    } else {
        match execute(inner, trigger, None) {
            Some(report) => report,
            None => on_context(inner, trigger),
        }
    };

    if report.context == ContextChoice::Background && !report.rolled_back {
        let worker = Arc::clone(inner);
        let touched = report.contributors.clone();
        let closing = inner.context.run_on(move |_| {
            let mut session = worker.lock_session();
            let mut closing = Closing::default();
            finalize(&worker, &mut session, &touched, &mut closing);
            closing
        });
        match closing {
            Ok(closing) => closing.apply(&mut report),
            Err(err) => {
                error!(error = %err, "could not reach the mutation context to commit");
                report.failure = Some(err.to_string());
            }
        }
    }

    report.started_at = started_at;
    report.finished_at = Utc::now();
    report.settle();
    inner.cancel.store(false, Ordering::SeqCst);

    info!(
        outcome = ?report.outcome,
        evaluated = report.evaluated.len(),
        committed = report.committed,
        rolled_back = report.rolled_back,
        "run finished"
    );
    report
}

fn on_context(inner: &Arc<Inner>, trigger: RunTrigger) -> RunReport {
    let worker = Arc::clone(inner);
    let attempt = inner
        .context
        .run_on(move |token| execute(&worker, trigger, Some(token)));
    match attempt {
        Ok(Some(report)) => report,
        Ok(None) => {
            // execute only declines when it has no token
            let mut report = RunReport::new(trigger, TransactionMode::Manual, ContextChoice::Mutation);
            report.failure = Some("pass declined on the mutation context".to_string());
            report
        }
        Err(err) => {
            error!(error = %err, "could not reach the mutation context");
            let mut report = RunReport::new(trigger, TransactionMode::Manual, ContextChoice::Mutation);
            report.failure = Some(err.to_string());
            report
        }
    }
}

/// Evaluate one pass. Returns `None` without side effects when the pass
/// needs the mutation context and `token` is absent.
fn execute(inner: &Inner, trigger: RunTrigger, token: Option<&ExecutionToken>) -> Option<RunReport> {
    let mut guard = inner.lock_session();
    let session = &mut *guard;
    let debug = session.config.debug;

    inner.enter(RunPhase::Compiling);
    let ctx = session.build_context();
    let roots = session.graph.home.collect_topmost_dirty();
    let pass = PassPlan::new(&session.graph.home, &roots);
    let plans: Vec<_> = roots
        .into_iter()
        .map(|id| (id, compile(&session.graph, &WorkspaceId::Home, id, &ctx)))
        .collect();

    let flags = plans
        .iter()
        .filter_map(|(_, plan)| plan.as_ref().ok())
        .flat_map(|compiled| compiled.nodes.iter())
        .filter_map(|id| session.graph.home.node(*id))
        .map(|node| requires_transaction(&session.graph, node));
    if choose_context(flags, debug) == ContextChoice::Mutation && token.is_none() {
        return None;
    }

    let mode = match (debug, trigger) {
        (true, _) => TransactionMode::Debug,
        (false, RunTrigger::Manual) => TransactionMode::Manual,
        (false, RunTrigger::Automatic) => TransactionMode::Automatic,
    };
    let context = match token {
        Some(_) => ContextChoice::Mutation,
        None => ContextChoice::Background,
    };
    let mut report = RunReport::new(trigger, mode, context);
    session.transactions.set_mode(mode);
    info!(?trigger, ?mode, ?context, nodes = plans.len(), "run started");
    if debug {
        session.log.log_line("Running expression in debug.");
    }

    if token.is_some() {
        if let Err(err) = session.transactions.begin() {
            error!(error = %err, "could not open transaction");
            session.log.log_line(&format!("ERROR: {err}"));
            report.failure = Some(err.to_string());
            report.rolled_back = true;
            return Some(report);
        }
    }

    inner.enter(RunPhase::Evaluating);
    let mut shared = HashMap::new();
    for (id, plan) in plans {
        if inner.cancel.load(Ordering::SeqCst) {
            info!(node = %id, "run cancelled");
            report.outcome = RunOutcome::Cancelled;
            break;
        }

        let step = plan.map_err(Failure::Compile).and_then(|compiled| {
            evaluate_root(session, &pass, compiled, &ctx, &mut shared, &mut report.contributors)
        });
        match step {
            Ok((compiled, value)) => {
                debug!(node = %id, result = %value, "node evaluated");
                session.log.log_line(&value.to_string());
                session
                    .graph
                    .home
                    .mark_evaluated(&compiled.nodes, id, value.clone());
                report.contributors.extend(compiled.nodes);
                report.evaluated.push((id, value));
            }
            Err(Failure::Compile(err)) => {
                warn!(node = %id, error = %err, "node did not compile");
                session.log.log_line(&format!("ERROR: {err}"));
                report.compile_errors.push((id, err));
            }
            Err(Failure::Evaluate(err)) => {
                error!(node = %id, error = %err, "evaluation failed");
                session.log.log_line(&format!("ERROR: {err}"));
                inner.enter(RunPhase::RollingBack);
                session.transactions.rollback();
                session.graph.reset_runs();
                redirty(session, &report.contributors);
                report.rolled_back = true;
                report.runtime_error = Some((id, err));
                break;
            }
        }
    }

    if token.is_some() && !report.rolled_back {
        let mut closing = Closing::default();
        finalize(inner, session, &report.contributors, &mut closing);
        closing.apply(&mut report);
    }
    Some(report)
}

enum Failure {
    Compile(CompileError),
    Evaluate(EvalError),
}

/// Evaluate one topmost node. Shared nodes it needs that no earlier root of
/// the pass produced are evaluated first, once, and their values stand in
/// for them from then on.
fn evaluate_root(
    session: &mut Session,
    pass: &PassPlan,
    compiled: Compiled,
    ctx: &BuildContext,
    shared: &mut HashMap<NodeId, Expr>,
    touched: &mut Vec<NodeId>,
) -> Result<(Compiled, Expr), Failure> {
    let root = compiled.root;
    for node in pass.needed_by(&session.graph.home, root, shared) {
        let part = compile_with(&session.graph, &WorkspaceId::Home, node, ctx, shared)
            .map_err(Failure::Compile)?;
        let value = session.env.evaluate(&part.expr).map_err(Failure::Evaluate)?;
        debug!(node = %node, result = %value, "shared node evaluated");
        session
            .graph
            .home
            .mark_evaluated(&part.nodes, node, value.clone());
        touched.extend(part.nodes);
        shared.insert(node, value);
    }

    let compiled = if compiled.nodes.iter().any(|id| shared.contains_key(id)) {
        compile_with(&session.graph, &WorkspaceId::Home, root, ctx, shared)
            .map_err(Failure::Compile)?
    } else {
        compiled
    };
    if session.config.log_expressions {
        session.log.log_line(&format!("> {}", compiled.expr));
    }
    let value = session.env.evaluate(&compiled.expr).map_err(Failure::Evaluate)?;
    Ok((compiled, value))
}

/// Nothing a rolled-back pass touched stays Clean.
fn redirty(session: &mut Session, touched: &[NodeId]) {
    for id in touched {
        session.graph.home.mark_dirty(*id);
    }
}

#[derive(Debug, Default)]
struct Closing {
    committed: bool,
    rolled_back: bool,
    failure: Option<String>,
}

impl Closing {
    fn apply(self, report: &mut RunReport) {
        report.committed = self.committed;
        report.rolled_back |= self.rolled_back;
        if self.failure.is_some() {
            report.failure = self.failure;
        }
    }
}

/// Close the pass: the transaction (opened if nothing opened one yet) is
/// committed after per-node run bookkeeping is reset. A rejected commit
/// dirties `touched` again.
fn finalize(inner: &Inner, session: &mut Session, touched: &[NodeId], closing: &mut Closing) {
    inner.enter(RunPhase::Committing);
    if let Err(err) = session.transactions.begin() {
        error!(error = %err, "could not open transaction");
        session.log.log_line(&format!("ERROR: {err}"));
        closing.failure = Some(err.to_string());
        return;
    }
    session.graph.reset_runs();
    match session.transactions.commit(session.log.as_ref()) {
        Ok(committed) => closing.committed = committed,
        Err(err) => {
            error!(error = %err, "commit rejected");
            session.log.log_line(&format!("ERROR: {err}"));
            redirty(session, touched);
            closing.rolled_back = true;
            closing.failure = Some(err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::log::{LogSink, MemoryLog};
    use df_core::MemoryDocument;
    use df_graph::{GraphEdit, NodeKind, Position};
    use std::time::Duration;

    fn scheduler(config: RuntimeConfig) -> (Scheduler, Arc<MemoryDocument>, Arc<MemoryLog>) {
        let doc = Arc::new(MemoryDocument::new());
        let log = Arc::new(MemoryLog::new());
        let session = Session::new(doc.clone(), log.clone(), config);
        (Scheduler::new(session).unwrap(), doc, log)
    }

    fn add(scheduler: &Scheduler, kind: NodeKind) -> NodeId {
        scheduler
            .apply_edit(GraphEdit::AddNode {
                workspace: WorkspaceId::Home,
                id: None,
                kind,
                name: None,
                position: Position::default(),
            })
            .unwrap()
            .node
            .unwrap()
    }

    #[test]
    fn pure_pass_evaluates_on_background_and_commits_once() {
        let (scheduler, doc, log) = scheduler(RuntimeConfig::default());
        let a = add(&scheduler, NodeKind::Number { value: 3.0 });
        let b = add(&scheduler, NodeKind::Number { value: 4.0 });
        let sum = add(&scheduler, NodeKind::Add);
        scheduler
            .apply_edit(GraphEdit::AddConnector { start: a, end: sum, end_index: 0 })
            .unwrap();
        scheduler
            .apply_edit(GraphEdit::AddConnector { start: b, end: sum, end_index: 1 })
            .unwrap();

        let reports = scheduler.run_blocking();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.context, ContextChoice::Background);
        assert_eq!(report.outcome, RunOutcome::Success);
        assert_eq!(report.result(sum), Some(&Expr::Number(7.0)));
        assert!(report.committed);
        assert_eq!(doc.committed_transactions().len(), 1);
        assert_eq!(log.lines(), vec!["> (+ 3 4)".to_string(), "7".to_string()]);
        assert_eq!(scheduler.phase(), RunPhase::Idle);
    }

    #[test]
    fn debug_mode_moves_to_the_mutation_context() {
        let config = RuntimeConfig {
            debug: true,
            ..RuntimeConfig::default()
        };
        let (scheduler, _doc, log) = scheduler(config);
        add(&scheduler, NodeKind::Number { value: 1.0 });

        let reports = scheduler.run_blocking();
        assert_eq!(reports[0].context, ContextChoice::Mutation);
        assert_eq!(reports[0].mode, TransactionMode::Debug);
        assert_eq!(log.lines()[0], "Running expression in debug.");
    }

    #[test]
    fn clean_graph_runs_nothing_but_still_commits() {
        let (scheduler, doc, _log) = scheduler(RuntimeConfig::default());
        let one = add(&scheduler, NodeKind::Number { value: 1.0 });
        scheduler.run_blocking();

        let reports = scheduler.run_blocking();
        assert!(reports[0].evaluated.is_empty());
        assert!(reports[0].committed);
        assert_eq!(doc.committed_transactions().len(), 2);
        scheduler.with_session(|session| assert!(!session.graph.node(one).unwrap().is_dirty()));
    }

    #[test]
    fn document_nodes_force_the_mutation_context() {
        let (scheduler, doc, _log) = scheduler(RuntimeConfig::default());
        let value = add(&scheduler, NodeKind::Number { value: 2.0 });
        let create = add(
            &scheduler,
            NodeKind::CreateEntity {
                kind: "column".into(),
            },
        );
        scheduler
            .apply_edit(GraphEdit::AddConnector { start: value, end: create, end_index: 0 })
            .unwrap();

        let reports = scheduler.run_blocking();
        assert_eq!(reports[0].context, ContextChoice::Mutation);
        assert_eq!(reports[0].outcome, RunOutcome::Success);
        assert_eq!(doc.entity_count(), 1);
        assert_eq!(doc.committed_transactions().len(), 1);
    }

    #[test]
    fn cancel_before_a_pass_stops_it_and_clears() {
        let (scheduler, _doc, _log) = scheduler(RuntimeConfig::default());
        add(&scheduler, NodeKind::Number { value: 1.0 });

        scheduler.cancel();
        let reports = scheduler.run_blocking();
        assert_eq!(reports[0].outcome, RunOutcome::Cancelled);
        assert!(reports[0].evaluated.is_empty());

        let reports = scheduler.run_blocking();
        assert_eq!(reports[0].outcome, RunOutcome::Success);
        assert_eq!(reports[0].evaluated.len(), 1);
    }

    /// Starts an edit from another thread once evaluation begins, then
    /// records whether it landed before the commit reported its warnings.
    #[derive(Default)]
    struct EditDuringCommit {
        scheduler: Mutex<Option<Scheduler>>,
        edit: Mutex<Option<JoinHandle<()>>>,
        landed: Arc<AtomicBool>,
        landed_at_commit: Mutex<Option<bool>>,
    }

    impl LogSink for EditDuringCommit {
        fn log_line(&self, line: &str) {
            if line.starts_with("> ") {
                let mut edit = self.edit.lock().unwrap();
                let Some(scheduler) = self.scheduler.lock().unwrap().clone() else {
                    return;
                };
                if edit.is_some() {
                    return;
                }
                let landed = Arc::clone(&self.landed);
                *edit = Some(thread::spawn(move || {
                    add(&scheduler, NodeKind::Number { value: 2.0 });
                    landed.store(true, Ordering::SeqCst);
                }));
            } else if line.starts_with("Warning:") {
                thread::sleep(Duration::from_millis(50));
                *self.landed_at_commit.lock().unwrap() = Some(self.landed.load(Ordering::SeqCst));
            }
        }
    }

    #[test]
    fn edits_wait_until_the_pass_has_committed() {
        let doc = Arc::new(MemoryDocument::new());
        let log = Arc::new(EditDuringCommit::default());
        let session = Session::new(doc.clone(), log.clone(), RuntimeConfig::default());
        let scheduler = Scheduler::new(session).unwrap();
        add(&scheduler, NodeKind::Number { value: 1.0 });
        *log.scheduler.lock().unwrap() = Some(scheduler.clone());
        doc.set_commit_warnings(vec!["views regenerated".into()]);

        let reports = scheduler.run_blocking();
        assert_eq!(reports[0].context, ContextChoice::Background);
        assert!(reports[0].committed);
        assert_eq!(*log.landed_at_commit.lock().unwrap(), Some(false));

        let edit = log.edit.lock().unwrap().take().unwrap();
        edit.join().unwrap();
        assert!(log.landed.load(Ordering::SeqCst));
        scheduler.with_session(|session| assert_eq!(session.graph.home.len(), 2));
    }
}
