//! Headless console for a reveal session.
//!
//! Line-oriented protocol:
//! - Lines starting with `#` are commands (help, status, findings, markers,
//!   cancel, quit)
//! - Every other non-blank line is sent as a query
//! - Output lines are tagged: `[STATUS]`, `[REPORT]`, `[MARKER]`, `[WARN]`

use analyst::{Analyst, ClientConfig};
use sitrep_core::{
    ChatSession, CoordinateResolver, Gazetteer, Marker, Message, Role, SessionConfig, Submission,
};
use std::cell::RefCell;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Options gathered from the command line. Unset fields fall back to the
/// environment, then to defaults.
#[derive(Debug, Default, PartialEq)]
pub struct HeadlessConfig {
    pub backend_url: Option<String>,
    pub gazetteer: Option<PathBuf>,
    pub typewriter_ms: Option<u64>,
    pub marker_ms: Option<u64>,
}

/// Parse console options from command line arguments.
pub fn parse_config_from_args(args: &[String]) -> Result<HeadlessConfig, String> {
    let mut config = HeadlessConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "--backend" => config.backend_url = Some(value()?),
            "--gazetteer" => config.gazetteer = Some(PathBuf::from(value()?)),
            "--typewriter-ms" => config.typewriter_ms = Some(parse_millis(flag, &value()?)?),
            "--marker-ms" => config.marker_ms = Some(parse_millis(flag, &value()?)?),
            other => return Err(format!("Unknown option: {other}. Try --help.")),
        }
        i += 2;
    }

    Ok(config)
}

fn parse_millis(flag: &str, value: &str) -> Result<u64, String> {
    value
        .parse()
        .map_err(|_| format!("{flag} expects a whole number of milliseconds, got {value:?}"))
}

/// Run the console until `#quit` or end of input.
pub async fn run_headless(config: HeadlessConfig) -> Result<(), Box<dyn Error>> {
    let mut session = build_session(config).await?;

    let console = Rc::new(RefCell::new(Console::default()));
    let view = Rc::clone(&console);
    session
        .transcript()
        .subscribe(move |messages: &[Message]| {
            emit(&view.borrow_mut().transcript_changed(messages));
        })
        .detach();
    let view = Rc::clone(&console);
    session
        .markers()
        .subscribe(move |markers: &[Marker]| {
            emit(&view.borrow_mut().markers_changed(markers));
        })
        .detach();

    println!("=== Sitrep ===");
    print_commands();
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // Piped input: let the last report finish.
                        session.run_until_idle().await;
                        finish_run(&session, &console);
                        break;
                    }
                    Err(e) => {
                        eprintln!("Error reading input: {e}");
                        break;
                    }
                };
                if !handle_line(line.trim(), &mut session, &console) {
                    println!("Goodbye!");
                    break;
                }
            }
            _ = session.process_next(), if !session.accepts_input() => {
                if session.accepts_input() {
                    finish_run(&session, &console);
                }
            }
        }
    }

    Ok(())
}

async fn build_session(config: HeadlessConfig) -> Result<ChatSession, Box<dyn Error>> {
    let mut client = ClientConfig::from_env()?;
    if let Some(url) = config.backend_url {
        client = client.with_base_url(url);
    }
    tracing::info!(url = %client.chat_url(), "using backend");
    let analyst = Analyst::new(client)?;

    let gazetteer_path = config
        .gazetteer
        .or_else(|| std::env::var_os("SITREP_GAZETTEER").map(PathBuf::from));
    let resolver: Rc<dyn CoordinateResolver> = match gazetteer_path {
        Some(path) => Rc::new(Gazetteer::load(path).await?),
        None => Rc::new(Gazetteer::builtin()),
    };

    let mut session_config = SessionConfig::from_env()?;
    if let Some(ms) = config.typewriter_ms {
        session_config = session_config.with_typewriter_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = config.marker_ms {
        session_config = session_config.with_marker_interval(Duration::from_millis(ms));
    }

    Ok(ChatSession::new(Rc::new(analyst), resolver, session_config)?)
}

/// Apply one input line. Returns `false` when the console should exit.
fn handle_line(line: &str, session: &mut ChatSession, console: &Rc<RefCell<Console>>) -> bool {
    if line.is_empty() {
        return true;
    }

    if let Some(command) = line.strip_prefix('#') {
        match command.split_whitespace().next() {
            Some("quit") | Some("exit") => return false,
            Some("cancel") => {
                if session.cancel() {
                    finish_run(session, console);
                    println!("[CANCELLED]");
                } else {
                    println!("[ERROR] Nothing to cancel.");
                }
            }
            Some("status") => {
                println!("[STATUS]");
                println!("  State: {}", session.state());
                println!("  Reports requested: {}", session.generation());
                println!("  Findings: {}", session.findings().len());
                println!("  Markers: {}", session.markers().len());
                if let Some(error) = session.last_error() {
                    println!("  Last error: {error}");
                }
            }
            Some("findings") => {
                let findings = session.findings().current();
                if findings.is_empty() {
                    println!("[FINDINGS] none");
                }
                for (index, finding) in findings.iter().enumerate() {
                    println!("[FINDING {index}] {}: {}", finding.name, finding.explanation);
                }
            }
            Some("markers") => {
                let markers = session.markers().current();
                if markers.is_empty() {
                    println!("[MARKERS] none");
                }
                for marker in &markers {
                    println!("{}", marker_line(marker));
                }
            }
            Some("help") => print_commands(),
            _ => println!("[ERROR] Unknown command. Type #help for help."),
        }
        io::stdout().flush().ok();
        return true;
    }

    match session.submit(line) {
        Submission::Accepted { generation } => {
            tracing::debug!(generation, "query submitted");
        }
        Submission::Busy => {
            println!("[BUSY] A report is still being revealed. Type #cancel to stop it.");
        }
        Submission::Empty => {}
    }
    true
}

fn finish_run(session: &ChatSession, console: &Rc<RefCell<Console>>) {
    emit(&console.borrow_mut().close_line());
    for warning in session.warnings() {
        println!("[WARN] {warning}");
    }
}

fn print_commands() {
    println!("Commands:");
    println!("  #status      - Show session state");
    println!("  #findings    - List findings from the last report");
    println!("  #markers     - List markers revealed so far");
    println!("  #cancel      - Stop the report in progress");
    println!("  #quit        - Exit");
    println!("  #help        - Show this help");
    println!("  (anything else is sent as a query)");
}

fn marker_line(marker: &Marker) -> String {
    format!(
        "[MARKER] {} ({:.4}, {:.4})",
        marker.name, marker.coordinate.lat, marker.coordinate.lng
    )
}

fn emit(text: &str) {
    if text.is_empty() {
        return;
    }
    print!("{text}");
    io::stdout().flush().ok();
}

/// Turns store snapshots into console output.
///
/// Remembers what has already been printed so that each notification only
/// produces the new part: a freshly typed character, a new status line, a
/// newly revealed marker.
#[derive(Debug, Default)]
struct Console {
    shown: Vec<Message>,
    markers_shown: usize,
    line_open: bool,
}

impl Console {
    fn transcript_changed(&mut self, messages: &[Message]) -> String {
        let mut out = String::new();

        for (index, message) in messages.iter().enumerate() {
            match self.shown.get(index) {
                Some(previous) if previous == message => {}
                Some(previous)
                    if previous.role == Role::Assistant
                        && message.role == Role::Assistant
                        && message.content.starts_with(&previous.content) =>
                {
                    out.push_str(&message.content[previous.content.len()..]);
                }
                _ => out.push_str(&self.start_message(message)),
            }
        }

        self.shown = messages.to_vec();
        out
    }

    fn start_message(&mut self, message: &Message) -> String {
        let mut out = self.close_line();
        match message.role {
            // Operators already see what they typed.
            Role::User => {}
            Role::Status => {
                out.push_str(&format!("[STATUS] {}\n", message.content));
            }
            Role::Assistant => {
                out.push_str(&format!("[REPORT] {}", message.content));
                self.line_open = true;
            }
        }
        out
    }

    fn markers_changed(&mut self, markers: &[Marker]) -> String {
        if markers.len() < self.markers_shown {
            self.markers_shown = 0;
        }
        let mut out = String::new();
        for marker in &markers[self.markers_shown..] {
            out.push_str(&self.close_line());
            out.push_str(&marker_line(marker));
            out.push('\n');
        }
        self.markers_shown = markers.len();
        out
    }

    fn close_line(&mut self) -> String {
        if std::mem::take(&mut self.line_open) {
            "\n".to_string()
        } else {
            String::new()
        }
    }
}
