//! Command-line argument parsing for the checkpoint calculator

/// Parse command line arguments
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Args {
    pub once: bool,
    pub validate: bool,
    pub trace: bool,
    pub json: bool,
    pub help: bool,
}

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Parse an argv-style list; the first element is the program name
pub fn parse_args_from(args: &[String]) -> Args {
    let mut result = Args::default();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--once" => result.once = true,
            "--validate" => result.validate = true,
            "--trace" => result.trace = true,
            "--json" => result.json = true,
            "--help" | "-h" => result.help = true,
            _ => {}
        }
    }

    result
}

pub fn print_help() {
    println!("checkpoint-calc - recurring checkpoint window calculator\n");
    println!("USAGE:");
    println!("    checkpoint-calc [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --once              Compute the windows due now and exit");
    println!("    --validate          Validate configuration and exit");
    println!("    --trace             Print every candidate with its outcome");
    println!("    --json              Print one JSON object per line");
    println!("    --help, -h          Show this help message\n");
    println!("Without --once, windows are recomputed at the top of every minute until Ctrl-C.\n");
    println!("ENVIRONMENT:");
    println!("    CHECKPOINT_ANCHOR, CHECKPOINT_PERIOD_AMOUNT and CHECKPOINT_PERIOD_UNIT are required.");
    println!("    See .env.example for the optional filter variables");
}
