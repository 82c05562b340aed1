//! Service-level scenarios: a member service writing through two repositories,
//! each of which may or may not demarcate its own transaction.

use anyhow::{bail, Context, Result};
use txscope::resource::{MemoryConnection, MemoryDataSource};
use txscope::transaction::{
    TransactionContext, TransactionCoordinator, TransactionDefinition, TransactionError,
    TransactionTemplate,
};

type Coordinator = TransactionCoordinator<MemoryDataSource>;
type Chain = TransactionContext<MemoryConnection>;

const LOG_FAILURE_MARKER: &str = "log-exception";

/// Runs `work` on the active connection, inside its own logical transaction
/// when `definition` is set.
fn in_scope(
    coord: &Coordinator,
    definition: &Option<TransactionDefinition>,
    ctx: &mut Chain,
    work: impl FnOnce(&mut MemoryConnection) -> Result<()>,
) -> Result<()> {
    let run = |ctx: &mut Chain| -> Result<()> {
        let conn = ctx
            .connection_mut()
            .context("repository called without a transaction")?;
        work(conn)
    };

    match definition {
        Some(definition) => TransactionTemplate::new(coord, definition.clone()).execute(ctx, run),
        None => run(ctx),
    }
}

struct MemberRepository<'a> {
    coord: &'a Coordinator,
    definition: Option<TransactionDefinition>,
}

impl MemberRepository<'_> {
    fn save(&self, ctx: &mut Chain, username: &str) -> Result<()> {
        in_scope(self.coord, &self.definition, ctx, |conn| {
            conn.insert("member", username)?;
            Ok(())
        })
    }
}

struct LogRepository<'a> {
    coord: &'a Coordinator,
    definition: Option<TransactionDefinition>,
}

impl LogRepository<'_> {
    fn save(&self, ctx: &mut Chain, message: &str) -> Result<()> {
        in_scope(self.coord, &self.definition, ctx, |conn| {
            conn.insert("log", message)?;
            if message.contains(LOG_FAILURE_MARKER) {
                bail!("failed to write log for {}", message);
            }
            Ok(())
        })
    }
}

struct MemberService<'a> {
    coord: &'a Coordinator,
    definition: Option<TransactionDefinition>,
    members: MemberRepository<'a>,
    logs: LogRepository<'a>,
}

impl MemberService<'_> {
    fn join(&self, ctx: &mut Chain, username: &str) -> Result<()> {
        self.in_service_scope(ctx, |svc, ctx| {
            svc.members.save(ctx, username)?;
            svc.logs.save(ctx, username)
        })
    }

    /// Like `join`, but a failed log write does not fail the call.
    fn join_recovering(&self, ctx: &mut Chain, username: &str) -> Result<()> {
        self.in_service_scope(ctx, |svc, ctx| {
            svc.members.save(ctx, username)?;
            if let Err(e) = svc.logs.save(ctx, username) {
                log::info!("log save failed, continuing: {}", e);
            }
            Ok(())
        })
    }

    fn in_service_scope(
        &self,
        ctx: &mut Chain,
        body: impl FnOnce(&Self, &mut Chain) -> Result<()>,
    ) -> Result<()> {
        match &self.definition {
            Some(definition) => TransactionTemplate::new(self.coord, definition.clone())
                .execute(ctx, |ctx| body(self, ctx)),
            None => body(self, ctx),
        }
    }
}

fn tx(on: bool) -> Option<TransactionDefinition> {
    on.then(TransactionDefinition::required)
}

fn service(
    coord: &Coordinator,
    service_tx: Option<TransactionDefinition>,
    member_tx: Option<TransactionDefinition>,
    log_tx: Option<TransactionDefinition>,
) -> MemberService<'_> {
    MemberService {
        coord,
        definition: service_tx,
        members: MemberRepository {
            coord,
            definition: member_tx,
        },
        logs: LogRepository {
            coord,
            definition: log_tx,
        },
    }
}

fn is_unexpected_rollback(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TransactionError>()
        .map_or(false, TransactionError::is_unexpected_rollback)
}

#[test]
fn test_outer_tx_off_success() -> Result<()> {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let svc = service(&coord, tx(false), tx(true), tx(true));
    let mut ctx = TransactionContext::new();

    svc.join(&mut ctx, "outerTxOff_success")?;

    let ds = coord.data_source();
    assert!(ds.contains("member", "outerTxOff_success"));
    assert!(ds.contains("log", "outerTxOff_success"));
    assert_eq!(ds.begin_count(), 2);
    assert_eq!(ds.commit_count(), 2);
    Ok(())
}

#[test]
fn test_outer_tx_off_fail() {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let svc = service(&coord, tx(false), tx(true), tx(true));
    let mut ctx = TransactionContext::new();
    let username = "log-exception_outerTxOff_fail";

    let err = svc.join(&mut ctx, username).unwrap_err();

    assert!(!is_unexpected_rollback(&err));
    let ds = coord.data_source();
    assert!(ds.contains("member", username));
    assert!(!ds.contains("log", username));
    assert_eq!(ds.commit_count(), 1);
    assert_eq!(ds.rollback_count(), 1);
}

#[test]
fn test_single_tx() -> Result<()> {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let svc = service(&coord, tx(true), tx(false), tx(false));
    let mut ctx = TransactionContext::new();

    svc.join(&mut ctx, "singleTx")?;

    let ds = coord.data_source();
    assert!(ds.contains("member", "singleTx"));
    assert!(ds.contains("log", "singleTx"));
    assert_eq!(ds.begin_count(), 1);
    Ok(())
}

#[test]
fn test_outer_tx_on_success() -> Result<()> {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let svc = service(&coord, tx(true), tx(true), tx(true));
    let mut ctx = TransactionContext::new();

    svc.join(&mut ctx, "outerTxOn_success")?;

    let ds = coord.data_source();
    assert!(ds.contains("member", "outerTxOn_success"));
    assert!(ds.contains("log", "outerTxOn_success"));
    assert_eq!(ds.begin_count(), 1);
    assert_eq!(ds.commit_count(), 1);
    assert_eq!(ctx.depth(), 0);
    Ok(())
}

#[test]
fn test_outer_tx_on_fail() {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let svc = service(&coord, tx(true), tx(true), tx(true));
    let mut ctx = TransactionContext::new();
    let username = "log-exception_outerTxOn_fail";

    let err = svc.join(&mut ctx, username).unwrap_err();

    // The application error reaches the caller, not an unexpected rollback.
    assert!(!is_unexpected_rollback(&err));
    let ds = coord.data_source();
    assert!(!ds.contains("member", username));
    assert!(!ds.contains("log", username));
    assert_eq!(ds.begin_count(), 1);
    assert_eq!(ds.commit_count(), 0);
    assert_eq!(ds.rollback_count(), 1);
}

#[test]
fn test_recover_exception_fail() {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let svc = service(&coord, tx(true), tx(true), tx(true));
    let mut ctx = TransactionContext::new();
    let username = "log-exception_recoverException_fail";

    let err = svc.join_recovering(&mut ctx, username).unwrap_err();

    assert!(is_unexpected_rollback(&err));
    let ds = coord.data_source();
    assert!(!ds.contains("member", username));
    assert!(!ds.contains("log", username));
    assert!(!ctx.is_rollback_only());
}

#[test]
fn test_recover_exception_success() -> Result<()> {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let svc = service(
        &coord,
        tx(true),
        tx(true),
        Some(TransactionDefinition::requires_new()),
    );
    let mut ctx = TransactionContext::new();
    let username = "log-exception_recoverException_success";

    svc.join_recovering(&mut ctx, username)?;

    let ds = coord.data_source();
    assert!(ds.contains("member", username));
    assert!(!ds.contains("log", username));
    assert_eq!(ds.begin_count(), 2);
    assert_eq!(ds.commit_count(), 1);
    assert_eq!(ds.rollback_count(), 1);
    Ok(())
}

#[test]
fn test_internal_call_is_transactional() -> Result<()> {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let template = TransactionTemplate::new(&coord, TransactionDefinition::required());
    let mut ctx = TransactionContext::new();

    let internal = |ctx: &mut Chain| -> Result<bool> {
        template.execute(ctx, |ctx| Ok(ctx.is_actual_transaction_active()))
    };
    let external = |ctx: &mut Chain| -> Result<(bool, bool)> {
        let outside = ctx.is_actual_transaction_active();
        let inside = internal(ctx)?;
        Ok((outside, inside))
    };

    assert_eq!(external(&mut ctx)?, (false, true));
    assert_eq!(coord.data_source().commit_count(), 1);
    Ok(())
}

#[test]
fn test_read_only_level() -> Result<()> {
    let coord = TransactionCoordinator::new(MemoryDataSource::new());
    let read = TransactionTemplate::new(&coord, TransactionDefinition::required().read_only(true));
    let write = TransactionTemplate::new(&coord, TransactionDefinition::required());
    let mut ctx = TransactionContext::new();

    assert!(read.execute(&mut ctx, |ctx| Ok(ctx.is_current_transaction_read_only()))?);
    assert!(!write.execute(&mut ctx, |ctx| Ok(ctx.is_current_transaction_read_only()))?);

    let rejected = read.execute(&mut ctx, |ctx| {
        ctx.connection_mut()
            .context("no connection")?
            .insert("member", "reader")?;
        Ok(())
    });
    assert!(rejected.is_err());
    assert!(!coord.data_source().contains("member", "reader"));
    Ok(())
}
