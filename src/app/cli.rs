use std::{
    io::{self, Write},
    time::Duration,
};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, terminal,
};

use crate::config::coerce_duration;
use crate::error::CommandError;
use crate::manager::task_registry::TaskRegistry;
use crate::models::task::{TaskId, TaskRecord, TaskStatus};

const PROMPT: &str = ">>> ";
const BAR_WIDTH: usize = 20;
const WATCH_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq)]
pub enum Command {
    Start { name: String, duration_secs: u32 },
    Cancel(TaskId),
    Status(TaskId),
    List,
    Watch(TaskId),
    Help,
    Exit,
}

/// Parses one input line. Blank input yields `Ok(None)`.
///
/// `start <duration> <name...>`: the first argument is always the
/// duration, coerced to `default_duration` when it is not a positive
/// number of seconds.
pub fn parse_command(input: &str, default_duration: u32) -> Result<Option<Command>, CommandError> {
    let mut args = input.split_whitespace();
    let Some(command) = args.next() else {
        return Ok(None);
    };

    let command = match command {
        "start" => {
            let duration_secs = coerce_duration(args.next().unwrap_or_default(), default_duration);
            let name = args.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err(CommandError::MissingName);
            }
            Command::Start {
                name,
                duration_secs,
            }
        }
        "cancel" => Command::Cancel(parse_id(args.next())?),
        "status" => Command::Status(parse_id(args.next())?),
        "watch" => Command::Watch(parse_id(args.next())?),
        "list" => Command::List,
        "help" => Command::Help,
        "exit" | "quit" => Command::Exit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_id(arg: Option<&str>) -> Result<TaskId, CommandError> {
    let arg = arg.ok_or(CommandError::MissingId)?;
    arg.parse::<TaskId>()
        .map_err(|_| CommandError::InvalidId(arg.to_string()))
}

pub fn progress_bar(progress: u8) -> String {
    let filled = usize::from(progress.min(100)) * BAR_WIDTH / 100;
    format!(
        "[{}{}] {}% complete",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        progress
    )
}

/// One card per task: header, timing line and, while running, a progress bar.
pub fn render_card(task: &TaskRecord) -> Vec<String> {
    let mut lines = vec![
        format!("#{} {}  Status: {}", task.id, task.name, task.status),
        format!(
            "    Duration: {}s | Started: {}",
            task.duration_secs,
            task.started_at.format("%H:%M:%S")
        ),
    ];
    if task.status == TaskStatus::Running {
        lines.push(format!("    {}", progress_bar(task.progress)));
    }
    lines
}

const HELP: &[&str] = &[
    "start <duration> <name>  start a simulated task (duration in seconds, default 5)",
    "cancel <id>              cancel a running task",
    "status <id>              show one task",
    "list                     show all tasks",
    "watch <id>               follow a task until it finishes (any key stops)",
    "help                     show this help",
    "exit                     cancel running tasks and quit",
];

struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

pub fn run_cli(registry: TaskRegistry) -> io::Result<()> {
    println!("Background task tracker started. Enter a command, 'help' or 'exit' to quit.");
    let _raw = RawMode::enable()?;
    let mut history: Vec<String> = Vec::new();

    loop {
        let Some(input) = read_line(&mut history)? else {
            break;
        };
        let default_duration = registry.config().default_duration_secs;

        match parse_command(&input, default_duration) {
            Ok(None) => continue,
            Ok(Some(Command::Exit)) => break,
            Ok(Some(command)) => execute_command(&registry, command)?,
            Err(e) => println!("\r{}", e),
        }

        if let Some(message) = registry.acknowledge_notification() {
            println!("\r[notice] {}", message);
        }
    }

    println!("\rExiting the program...");
    registry.shutdown();
    Ok(())
}

fn execute_command(registry: &TaskRegistry, command: Command) -> io::Result<()> {
    match command {
        Command::Start {
            name,
            duration_secs,
        } => {
            if let Some(id) = registry.start(&name, duration_secs) {
                println!("\rStarted task with ID: {}", id);
                println!("\rUse `watch {}` to follow its progress", id);
            }
        }
        Command::Cancel(id) => {
            registry.cancel(id);
            match registry.task(id) {
                Some(task) => println!("\rTask {} status: {}", id, task.status),
                None => println!("\rTask {} not found", id),
            }
        }
        Command::Status(id) => match registry.task(id) {
            Some(task) => print_card(&task),
            None => println!("\rTask {} not found", id),
        },
        Command::List => {
            let tasks = registry.tasks();
            if tasks.is_empty() {
                println!("\rNo tasks started");
            } else {
                println!("\r\tTask list:");
                println!("\r{}", "-".repeat(60));
                for task in tasks.iter() {
                    print_card(task);
                }
            }
        }
        Command::Watch(id) => watch_task(registry, id)?,
        Command::Help => {
            for line in HELP {
                println!("\r{}", line);
            }
        }
        Command::Exit => {}
    }
    Ok(())
}

fn print_card(task: &TaskRecord) {
    for line in render_card(task) {
        println!("\r{}", line);
    }
}

fn watch_task(registry: &TaskRegistry, id: TaskId) -> io::Result<()> {
    if registry.task(id).is_none() {
        println!("\rTask {} not found", id);
        return Ok(());
    }
    println!("\rWatching task {}. Press any key to stop.", id);
    let updates = registry.observe_tasks();
    let mut last: Option<(TaskStatus, u8)> = None;

    loop {
        if let Ok(tasks) = updates.recv_timeout(WATCH_POLL) {
            if let Some(task) = tasks.iter().find(|task| task.id == id) {
                let current = (task.status, task.progress);
                if last != Some(current) {
                    last = Some(current);
                    println!("\r{}  {}", task.status, progress_bar(task.progress));
                }
                if task.status.is_terminal() {
                    break;
                }
            }
        }
        if event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Line editor with history on Up/Down. Returns `None` on Ctrl+C / Ctrl+D.
fn read_line(history: &mut Vec<String>) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    let mut history_index = history.len();
    let mut input = String::new();
    print!("\r{}", PROMPT);
    stdout.flush()?;

    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => {
                println!();
                break;
            }
            KeyCode::Char('c') | KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => {
                println!();
                return Ok(None);
            }
            KeyCode::Up => {
                history_index = history_index.saturating_sub(1);
                if let Some(command) = history.get(history_index) {
                    input = command.clone();
                }
            }
            KeyCode::Down => {
                if history_index < history.len() {
                    history_index += 1;
                }
                input = history.get(history_index).cloned().unwrap_or_default();
            }
            KeyCode::Char(c) => input.push(c),
            KeyCode::Backspace => {
                input.pop();
            }
            _ => continue,
        }
        redraw(&input)?;
    }

    if !input.trim().is_empty() {
        history.push(input.clone());
    }
    Ok(Some(input))
}

fn redraw(input: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    print!("{}{}", PROMPT, input);
    stdout.flush()
}
