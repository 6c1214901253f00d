//! Unidade de trabalho com hooks de pré-commit e pós-commit.
//!
//! Hooks de pré-commit fazem parte da transação: o primeiro que falha reverte
//! tudo, executando em ordem inversa as compensações dos hooks que já tinham
//! rodado. Hooks de pós-commit só rodam depois de um commit bem-sucedido, na
//! ordem de registro, e cada um é isolado dos demais.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{CollaboratorError, UnitOfWorkError};

type BeforeCommitRun =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<(), CollaboratorError>> + Send>;
type Compensation = Box<dyn FnOnce() + Send>;
type AfterCommitHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct BeforeCommitHook {
    run: BeforeCommitRun,
    undo: Option<Compensation>,
}

/// Resultado da execução dos hooks de pós-commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub hooks_run: usize,
    pub hooks_panicked: usize,
}

/// Uma transação do chamador. Não é compartilhada entre transações.
///
/// Descartar uma unidade não confirmada equivale a um rollback.
pub struct UnitOfWork {
    id: Uuid,
    before_commit: Vec<BeforeCommitHook>,
    after_commit: Vec<AfterCommitHook>,
    finished: bool,
}

impl UnitOfWork {
    pub fn begin() -> Self {
        let id = Uuid::new_v4();
        debug!(unit_of_work = %id, "unit of work started");
        Self {
            id,
            before_commit: Vec::new(),
            after_commit: Vec::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Registra trabalho que deve ser gravado junto com a transação.
    pub fn register_before_commit<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CollaboratorError>> + Send + 'static,
    {
        self.before_commit.push(BeforeCommitHook {
            run: Box::new(move || hook().boxed()),
            undo: None,
        });
    }

    /// Como [`register_before_commit`](Self::register_before_commit), com uma
    /// compensação executada se um hook posterior falhar.
    pub fn register_before_commit_with_undo<F, Fut, U>(&mut self, hook: F, undo: U)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CollaboratorError>> + Send + 'static,
        U: FnOnce() + Send + 'static,
    {
        self.before_commit.push(BeforeCommitHook {
            run: Box::new(move || hook().boxed()),
            undo: Some(Box::new(undo)),
        });
    }

    /// Registra um callback que só executa após commit bem-sucedido.
    pub fn register_after_commit<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.after_commit.push(Box::new(move || hook().boxed()));
    }

    pub fn pending_hooks(&self) -> usize {
        self.before_commit.len() + self.after_commit.len()
    }

    /// Confirma a transação e então executa os hooks de pós-commit.
    ///
    /// Um hook de pós-commit que entra em pânico é registrado em log; os
    /// seguintes continuam executando e o commit permanece válido.
    pub async fn commit(mut self) -> Result<CommitReport, UnitOfWorkError> {
        self.finished = true;

        let mut applied: Vec<Compensation> = Vec::new();
        for (index, hook) in std::mem::take(&mut self.before_commit)
            .into_iter()
            .enumerate()
        {
            if let Err(source) = (hook.run)().await {
                warn!(
                    unit_of_work = %self.id,
                    index,
                    error = %source,
                    compensations = applied.len(),
                    discarded = self.after_commit.len(),
                    "before-commit hook failed, rolling back"
                );
                for undo in applied.into_iter().rev() {
                    undo();
                }
                self.after_commit.clear();
                return Err(UnitOfWorkError::BeforeCommit {
                    id: self.id,
                    index,
                    source,
                });
            }
            applied.extend(hook.undo);
        }
        debug!(unit_of_work = %self.id, "unit of work committed");

        let mut report = CommitReport::default();
        for hook in std::mem::take(&mut self.after_commit) {
            let outcome = AssertUnwindSafe(async move { hook().await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(()) => report.hooks_run += 1,
                Err(_) => {
                    report.hooks_panicked += 1;
                    error!(unit_of_work = %self.id, "after-commit hook panicked");
                }
            }
        }
        Ok(report)
    }

    /// Desfaz a transação; nenhum hook é executado.
    pub fn rollback(mut self) {
        self.finished = true;
        self.discard("rolled back");
    }

    fn discard(&mut self, reason: &'static str) {
        let discarded = self.pending_hooks();
        self.before_commit.clear();
        self.after_commit.clear();
        debug!(unit_of_work = %self.id, discarded, reason, "unit of work closed without commit");
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.finished {
            self.discard("dropped");
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("before_commit", &self.before_commit.len())
            .field("after_commit", &self.after_commit.len())
            .field("finished", &self.finished)
            .finish()
    }
}
