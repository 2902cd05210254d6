use clap::{Parser, ValueEnum};
use escore::ast::Program;
use escore::error::{EngineError, Result};
use escore::interpreter::{
    Agent, AgentOptions, BreakOnDebuggerStatement, Checkpoint, CheckpointGranularity,
    DrainOutcome, Outcome, StepEveryCheckpoint,
};
use escore::types::JsObject;
use escore::{Completion, JsValue};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DebuggerMode {
    /// Never pause
    Off,
    /// Pause at every checkpoint
    Step,
    /// Pause at `debugger;` statements
    Break,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Granularity {
    Node,
    Statement,
}

#[derive(Parser)]
#[command(name = "escore", version, about = "Evaluate an ECMAScript syntax tree")]
struct Cli {
    /// JSON syntax tree to evaluate
    file: Option<PathBuf>,

    /// Evaluate an inline JSON syntax tree
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    #[arg(long, value_enum, default_value = "off")]
    debugger: DebuggerMode,

    /// Checkpoint granularity for the debugger
    #[arg(long, value_enum, default_value = "node")]
    granularity: Granularity,

    /// Stop draining the job queue after this many jobs
    #[arg(long)]
    max_jobs: Option<usize>,

    /// Log engine internals (overrides RUST_LOG)
    #[arg(long)]
    trace: bool,
}

fn init_logging(trace: bool) {
    let filter = if trace {
        EnvFilter::new("escore=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_tree(path: &Path) -> Result<Program> {
    let source = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&source)?)
}

/// Blocks on stdin at a pause. Returns false when the user asks to quit.
fn prompt(checkpoint: &Checkpoint) -> bool {
    eprintln!(
        "paused: {} at {}:{} ({:?}, depth {})",
        checkpoint.node_kind,
        checkpoint.location.line,
        checkpoint.location.column,
        checkpoint.phase,
        checkpoint.stack_depth
    );
    eprint!("[enter] continue, q quit > ");
    if io::stderr().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => line.trim() != "q",
    }
}

/// Resume paused computations until the outcome is a completion.
fn settle(agent: &Agent, mut outcome: Outcome) -> Result<Option<Completion>> {
    loop {
        match outcome {
            Outcome::Completed(completion) => return Ok(Some(completion)),
            Outcome::Paused(checkpoint) => {
                if !prompt(&checkpoint) {
                    return Ok(None);
                }
                outcome = agent.resume(None)?;
            }
        }
    }
}

fn drain(agent: &Agent) -> Result<bool> {
    loop {
        match agent.run_jobs()? {
            DrainOutcome::Idle => return Ok(true),
            DrainOutcome::LimitReached => {
                eprintln!("job limit reached; pending jobs were not run");
                return Ok(true);
            }
            DrainOutcome::Paused(checkpoint) => {
                if settle(agent, Outcome::Paused(checkpoint))?.is_none() {
                    return Ok(false);
                }
            }
        }
    }
}

fn describe_error(agent: &Agent, value: &JsValue) -> String {
    let name = match agent.get_property(value, "name") {
        Completion::Normal(JsValue::String(name)) => Some(name.to_rust_string()),
        _ => None,
    };
    match (name, agent.error_message(value)) {
        (Some(name), Some(message)) if !message.is_empty() => format!("{name}: {message}"),
        (Some(name), _) => name,
        _ => value.to_string(),
    }
}

fn report_unhandled(agent: &Agent, promises: &[JsObject]) {
    for promise in promises {
        if let Some((_, reason)) = agent.promise_state(&JsValue::Object(*promise)) {
            eprintln!(
                "Unhandled promise rejection: {}",
                describe_error(agent, &reason)
            );
        }
    }
}

fn execute(cli: &Cli, program: Program) -> Result<ExitCode> {
    let mut options = AgentOptions::default().with_checkpoint_granularity(match cli.granularity {
        Granularity::Node => CheckpointGranularity::Node,
        Granularity::Statement => CheckpointGranularity::Statement,
    });
    if let Some(limit) = cli.max_jobs {
        options = options.with_max_jobs_per_drain(limit);
    }
    let agent = Agent::new(options);
    match cli.debugger {
        DebuggerMode::Off => {}
        DebuggerMode::Step => agent.set_debugger_hook(Some(Rc::new(StepEveryCheckpoint))),
        DebuggerMode::Break => agent.set_debugger_hook(Some(Rc::new(BreakOnDebuggerStatement))),
    }

    let outcome = agent.evaluate_script(program)?;
    let Some(completion) = settle(&agent, outcome)? else {
        return Ok(ExitCode::from(130));
    };
    if !drain(&agent)? {
        return Ok(ExitCode::from(130));
    }

    let mut status = ExitCode::SUCCESS;
    match completion {
        Completion::Normal(value) => println!("{value}"),
        Completion::Throw(error) => {
            eprintln!("Uncaught {}", describe_error(&agent, &error));
            status = ExitCode::from(1);
        }
        other => eprintln!("script ended with a {} completion", other.kind_name()),
    }
    if let Some(queue) = agent.job_queue() {
        let unhandled = queue.unhandled_rejections();
        if !unhandled.is_empty() {
            report_unhandled(&agent, &unhandled);
            status = ExitCode::from(1);
        }
    }
    Ok(status)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let program = if let Some(tree) = &cli.eval {
        serde_json::from_str(tree)?
    } else if let Some(path) = &cli.file {
        read_tree(path)?
    } else {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .map_err(|source| EngineError::Io {
                path: PathBuf::from("<stdin>"),
                source,
            })?;
        serde_json::from_str(&source)?
    };
    execute(cli, program)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.trace);
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
