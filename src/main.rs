use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vi_db::config::RcLoader;
use vi_db::controller::CommandController;
use vi_db::document_model::ScreenMode;
use vi_db::{Editor, MsgType, Result};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "vi-db", version, about = "Line editor over a recoverable line database")]
struct Args {
    /// File to edit.
    #[arg(required_unless_present = "recover")]
    file: Option<PathBuf>,
    /// Recover FILE from the recovery directory; with no FILE, list what
    /// can be recovered.
    #[arg(short = 'r', long = "recover")]
    recover: bool,
    /// Recovery directory, overriding .vidbrc.
    #[arg(long)]
    recdir: Option<PathBuf>,
    /// Never run the mailer.
    #[arg(long)]
    secure: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("VIDB_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    // Load RC configuration, then let the command line override it
    let mut config = RcLoader::load_config();
    if let Some(dir) = &args.recdir {
        config.recdir = dir.clone();
    }
    if args.secure {
        config.secure = true;
    }
    debug!(?config, "configuration");

    let mut ed = Editor::new(config);
    match run(&mut ed, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            flush_messages(&mut ed);
            eprintln!("vi-db: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(ed: &mut Editor, args: &Args) -> Result<()> {
    // Without a file, clap guarantees -r: list what can be recovered
    let Some(file) = &args.file else {
        for line in ed.list_recovery()? {
            println!("{line}");
        }
        flush_messages(ed);
        return Ok(());
    };

    let sid = if args.recover {
        ed.recover(&file.to_string_lossy(), ScreenMode::Ex)?
    } else {
        ed.open(file)?
    };
    info!(file = ?args.file, recover = args.recover, "session started");
    flush_messages(ed);

    let mut ctl = CommandController::new(sid);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    loop {
        if !ctl.is_inputting() {
            print!(":");
            stdout.flush()?;
        }
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            debug!("end of input");
            if let Err(e) = ed.hangup(sid) {
                eprintln!("{e}");
            }
            break;
        }

        let events = ed.poll_events();
        if !events.is_empty() {
            debug!(?events, "unhandled events");
        }

        let command = line.trim_end_matches(['\n', '\r']);
        let quit = match ctl.handle_line(ed, command) {
            Ok(quit) => quit,
            Err(e) => {
                eprintln!("{e}");
                false
            }
        };
        for out in ctl.take_output() {
            println!("{out}");
        }
        flush_messages(ed);
        if quit || ed.screen(sid).exit_force {
            break;
        }
    }

    ed.close(sid)?;
    flush_messages(ed);
    Ok(())
}

fn flush_messages(ed: &mut Editor) {
    for msg in ed.take_messages() {
        match msg.kind {
            MsgType::Info => println!("{}", msg.text),
            MsgType::Error | MsgType::SysErr => eprintln!("{}", msg.text),
        }
    }
}
