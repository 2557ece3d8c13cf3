use std::path::PathBuf;

use clap::Parser;

use piquant::{logging, Interpreter, Options, PiquantError, Repl};

#[derive(Parser)]
#[command(author, version, about = "Piquant language interpreter")]
struct Args {
    /// Run a Piquant script file and exit
    script: Option<PathBuf>,
    /// Load a file before starting the REPL
    #[arg(short = 'l', long = "load")]
    load: Option<PathBuf>,
    /// Evaluate a snippet of Piquant code, print its result and exit
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,
    /// Skip the built-in prelude
    #[arg(long)]
    no_prelude: bool,
}

fn main() -> Result<(), PiquantError> {
    logging::init_tracing();
    let args = Args::parse();
    let interpreter = Interpreter::with_options(Options {
        load_prelude: !args.no_prelude,
        ..Options::default()
    });

    if let Some(source) = args.eval {
        interpreter.eval_print(&source, "eval", true);
        return Ok(());
    }
    if let Some(script) = args.script {
        return interpreter.load_file(&script);
    }

    println!("Piquant {}", env!("CARGO_PKG_VERSION"));
    println!("(Press Ctrl+C or type :quit to exit)\n");
    if let Some(path) = args.load {
        if let Err(err) = interpreter.load_file(&path) {
            println!("Error while loading file <{}>: {err}", path.display());
        }
    }
    Repl::new(interpreter).run()
}
