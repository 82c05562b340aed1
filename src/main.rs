//! txscope - walks through transaction propagation scenarios

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use txscope::resource::{MemoryConnection, MemoryDataSource};
use txscope::transaction::{
    TransactionContext, TransactionCoordinator, TransactionDefinition, TransactionError,
    TransactionTemplate,
};

/// Runs a propagation scenario against an in-memory data source and prints
/// every physical action that reached it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value = "inner-rollback")]
    scenario: Scenario,

    /// Run every scenario in turn
    #[arg(short, long, conflicts_with = "scenario")]
    all: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    /// One transaction, committed
    Commit,
    /// One transaction, rolled back
    Rollback,
    /// Two sequential transactions, both committed
    DoubleCommit,
    /// Inner REQUIRED commits, outer commits
    InnerCommit,
    /// Inner REQUIRED commits, outer rolls back
    OuterRollback,
    /// Inner REQUIRED rolls back, outer tries to commit
    InnerRollback,
    /// Inner REQUIRES_NEW fails, outer commits
    RequiresNew,
}

impl Scenario {
    fn all() -> &'static [Scenario] {
        &[
            Scenario::Commit,
            Scenario::Rollback,
            Scenario::DoubleCommit,
            Scenario::InnerCommit,
            Scenario::OuterRollback,
            Scenario::InnerRollback,
            Scenario::RequiresNew,
        ]
    }
}

type Coordinator = TransactionCoordinator<MemoryDataSource>;
type Chain = TransactionContext<MemoryConnection>;

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let scenarios = if args.all {
        Scenario::all().to_vec()
    } else {
        vec![args.scenario]
    };

    for scenario in scenarios {
        run(scenario).with_context(|| format!("scenario {:?} failed", scenario))?;
    }

    Ok(())
}

fn run(scenario: Scenario) -> Result<()> {
    let coordinator = TransactionCoordinator::new(MemoryDataSource::new());
    let mut ctx = TransactionContext::new();

    println!("== {:?}", scenario);
    let outcome = match scenario {
        Scenario::Commit => commit(&coordinator, &mut ctx),
        Scenario::Rollback => rollback(&coordinator, &mut ctx),
        Scenario::DoubleCommit => double_commit(&coordinator, &mut ctx),
        Scenario::InnerCommit => inner_commit(&coordinator, &mut ctx),
        Scenario::OuterRollback => outer_rollback(&coordinator, &mut ctx),
        Scenario::InnerRollback => inner_rollback(&coordinator, &mut ctx),
        Scenario::RequiresNew => requires_new(&coordinator, &mut ctx),
    };

    match outcome {
        Ok(()) => println!("   outcome: ok"),
        Err(e) if is_unexpected_rollback(&e) => println!("   outcome: unexpected rollback"),
        Err(e) => return Err(e),
    }

    for event in coordinator.data_source().events() {
        println!("   {}", event);
    }

    if ctx.depth() != 0 || ctx.is_actual_transaction_active() {
        bail!("context not reset: depth {}", ctx.depth());
    }
    Ok(())
}

fn is_unexpected_rollback(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<TransactionError>()
        .map_or(false, TransactionError::is_unexpected_rollback)
}

fn commit(coord: &Coordinator, ctx: &mut Chain) -> Result<()> {
    let tx = coord.begin(ctx, TransactionDefinition::required())?;
    Ok(coord.commit(ctx, tx)?)
}

fn rollback(coord: &Coordinator, ctx: &mut Chain) -> Result<()> {
    let tx = coord.begin(ctx, TransactionDefinition::required())?;
    Ok(coord.rollback(ctx, tx)?)
}

fn double_commit(coord: &Coordinator, ctx: &mut Chain) -> Result<()> {
    commit(coord, ctx)?;
    commit(coord, ctx)
}

fn inner_commit(coord: &Coordinator, ctx: &mut Chain) -> Result<()> {
    let outer = coord.begin(ctx, TransactionDefinition::required().named("outer"))?;
    let inner = coord.begin(ctx, TransactionDefinition::required().named("inner"))?;
    log::info!(
        "outer new = {}, inner new = {}",
        outer.is_new_transaction(),
        inner.is_new_transaction()
    );
    coord.commit(ctx, inner)?;
    Ok(coord.commit(ctx, outer)?)
}

fn outer_rollback(coord: &Coordinator, ctx: &mut Chain) -> Result<()> {
    let outer = coord.begin(ctx, TransactionDefinition::required().named("outer"))?;
    let inner = coord.begin(ctx, TransactionDefinition::required().named("inner"))?;
    coord.commit(ctx, inner)?;
    Ok(coord.rollback(ctx, outer)?)
}

fn inner_rollback(coord: &Coordinator, ctx: &mut Chain) -> Result<()> {
    let outer = coord.begin(ctx, TransactionDefinition::required().named("outer"))?;
    let inner = coord.begin(ctx, TransactionDefinition::required().named("inner"))?;
    coord.rollback(ctx, inner)?;
    Ok(coord.commit(ctx, outer)?)
}

fn requires_new(coord: &Coordinator, ctx: &mut Chain) -> Result<()> {
    let template = TransactionTemplate::new(coord, TransactionDefinition::required().named("member"));
    let independent =
        TransactionTemplate::new(coord, TransactionDefinition::requires_new().named("log"));

    template.execute(ctx, |ctx| {
        ctx.connection_mut()
            .context("no connection")?
            .insert("member", "kim")?;

        let logged: Result<()> = independent.execute(ctx, |ctx| {
            ctx.connection_mut()
                .context("no connection")?
                .insert("log", "kim")?;
            bail!("log write failed")
        });
        if let Err(e) = logged {
            log::info!("recovered from independent failure: {}", e);
        }
        Ok(())
    })
}
