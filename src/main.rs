use std::fs::File;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{backend::CrosstermBackend, prelude::*};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

mod app;
mod db;
mod ui;

use app::{App, Viewport};
use db::Database;

#[derive(Parser, Debug)]
#[command(author, version, about = "Browse SQLite tables in the terminal")]
struct Args {
    /// Path to SQLite database file
    #[arg(value_name = "DB_PATH")]
    db_path: PathBuf,

    /// Write a log to this file (logging is off otherwise)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let log_file = File::create(path)
        .with_context(|| format!("cannot create log file '{}'", path.display()))?;
    let _ = WriteLogger::init(args.log_level, log_config, log_file);
    Ok(())
}

fn main() -> Result<()> {
    // Usage errors exit with 1 rather than clap's 2
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    init_logging(&args)?;

    ensure!(
        args.db_path.exists(),
        "Database file '{}' does not exist.",
        args.db_path.display()
    );
    let db = Database::open(&args.db_path).with_context(|| {
        format!("Error connecting to database '{}'", args.db_path.display())
    })?;
    let mut app = App::new(db, Viewport::new(80, 24))
        .with_context(|| format!("Error reading database '{}'", args.db_path.display()))?;
    log::info!("opened {}", args.db_path.display());

    let mut terminal = setup_terminal()?;
    let size = terminal.size()?;
    app.resize(size.width, size.height);
    let res = run_app(&mut terminal, &mut app);
    restore_terminal(terminal)?;
    res
}

/// Block on one event, apply it, redraw. No timers and no background work.
fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
            Event::Resize(width, height) => app.resize(width, height),
            _ => {}
        }

        if app.should_quit {
            log::info!("quit");
            return Ok(());
        }
    }
}
