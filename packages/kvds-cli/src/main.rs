mod cli;
mod commands;
mod engines;
mod repl;

use std::io;

use clap::Parser;
use kvds_core::EngineRegistry;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args
        .first()
        .map(String::as_str)
        .unwrap_or("kvds")
        .to_string();

    let registry = engines::build_registry();

    if args.len() == 2 {
        let arg = &args[1];
        if arg == "-h" || arg == "--help" || arg == "help" {
            engines::print_usage(&mut io::stdout(), &program, &registry);
            std::process::exit(repl::EXIT_CLEAN);
        }
    } else if args.len() > 2 {
        eprintln!("Error: Too many arguments.");
        engines::print_usage(&mut io::stderr(), &program, &registry);
        std::process::exit(repl::EXIT_USAGE);
    }

    let parsed = cli::Args::parse_from(args.clone());
    let algorithm = parsed
        .algorithm
        .unwrap_or_else(|| engines::default_algorithm_name().to_string());

    let Some(entry) = registry.lookup(&algorithm).copied() else {
        eprintln!("Error: No such algorithm: {algorithm}");
        engines::print_usage(&mut io::stderr(), &program, &registry);
        std::process::exit(repl::EXIT_USAGE);
    };

    registry.install();
    let db = (EngineRegistry::global()
        .lookup(&algorithm)
        .expect("looked up moments ago")
        .create)();

    tracing::info!(algorithm, "starting session");
    let mut state = commands::CommandState::new(db);
    let interactive = repl::stdin_is_interactive();
    let stdin = io::stdin();
    let code = repl::run(
        &mut state,
        entry.name,
        stdin.lock(),
        io::stdout(),
        io::stderr(),
        interactive,
    );
    std::process::exit(code);
}
