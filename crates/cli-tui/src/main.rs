use anyhow::{Context, Result};
use chapters::{
    config::ChapterConfig,
    job::load_ledger,
    progress::{self, format_clock, format_hms, BatchProgress, JobProgress, MarkerExtractor},
    workspace::WorkspaceHandle,
};
use chrono::Utc;
use clap::Parser;
use humansize::{format_size, DECIMAL};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io::stdout;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use sysinfo::System;

struct App {
    batch: Option<BatchProgress>,
    last_error: Option<String>,
    system: System,
    table_state: TableState,
    should_quit: bool,
    ws: WorkspaceHandle,
    extractor: MarkerExtractor,
}

impl App {
    fn new(ws: WorkspaceHandle) -> Self {
        Self {
            batch: None,
            last_error: None,
            system: System::new(),
            table_state: TableState::default(),
            should_quit: false,
            ws,
            extractor: MarkerExtractor::default(),
        }
    }

    fn refresh(&mut self) {
        self.system.refresh_all();

        // Errors are shown in the status bar rather than ending the session
        let result = load_ledger(&self.ws)
            .and_then(|ledger| progress::report(&self.ws, &ledger, &self.extractor, Utc::now()));
        match result {
            Ok(batch) => {
                self.batch = Some(batch);
                self.last_error = None;
            }
            Err(e) => {
                self.batch = None;
                self.last_error = Some(format!("{:#}", e));
            }
        }
    }
}

/// Chapter encode TUI monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory holding the job ledger and logs
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Refresh interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = ChapterConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = args.work_dir {
        cfg.work_dir = dir;
    }
    // The monitor only reads; a mistyped work dir must not be created
    let ws = WorkspaceHandle::open_existing(&cfg.work_dir)?;

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(ws);
    let result = run(&mut terminal, &mut app, Duration::from_millis(args.interval_ms.max(100)));

    // Restore terminal even when the loop failed
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    result
}

fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App, interval: Duration) -> Result<()> {
    app.refresh();
    let mut last_refresh = Instant::now();

    loop {
        if last_refresh.elapsed() >= interval {
            app.refresh();
            last_refresh = Instant::now();
        }

        terminal.draw(|f| ui(f, app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let crossterm::event::Event::Key(key) = crossterm::event::read()? {
                match key.code {
                    crossterm::event::KeyCode::Char('q') => {
                        app.should_quit = true;
                    }
                    crossterm::event::KeyCode::Char('r') => {
                        app.refresh();
                        last_refresh = Instant::now();
                    }
                    _ => {}
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let size = f.size();

    if size.height < 13 || size.width < 80 {
        let error_msg = Paragraph::new("Terminal too small! Please resize to at least 80x13.")
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red));
        f.render_widget(error_msg, size);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // CPU/Memory
            Constraint::Length(3), // Overall completion
            Constraint::Min(3),    // Chapter table
            Constraint::Length(3), // Status bar
        ])
        .split(size);

    render_top_bar(f, app, chunks[0]);
    render_overall(f, app, chunks[1]);
    render_chapter_table(f, app, chunks[2]);
    render_status_bar(f, app, chunks[3]);
}

/// Clamp a percentage into what a gauge can draw
fn gauge_percent(value: f64) -> u16 {
    if value.is_finite() {
        value.clamp(0.0, 100.0) as u16
    } else {
        0
    }
}

fn render_top_bar(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let cpu_raw = app.system.global_cpu_usage() as f64;
    let cpu_usage = if cpu_raw.is_finite() { cpu_raw.clamp(0.0, 100.0) } else { 0.0 };
    let cpu_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("CPU"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(gauge_percent(cpu_usage))
        .label(format!("{:.1}%", cpu_usage));
    f.render_widget(cpu_gauge, chunks[0]);

    let total_memory = app.system.total_memory();
    let memory_percent = if total_memory == 0 {
        0.0
    } else {
        app.system.used_memory() as f64 / total_memory as f64 * 100.0
    };
    let memory_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Memory"))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(gauge_percent(memory_percent))
        .label(format!("{:.1}%", memory_percent));
    f.render_widget(memory_gauge, chunks[1]);
}

fn render_overall(f: &mut Frame, app: &App, area: Rect) {
    let (percent, label) = match &app.batch {
        Some(batch) => {
            let pct = batch.completion_percent();
            let label = format!(
                "{} | {} / {} | elapsed {}",
                pct.map(|p| format!("{:.2}%", p)).unwrap_or_else(|| "n/a".to_string()),
                format_hms(batch.total_encoded_secs),
                format_hms(batch.total_length_secs),
                format_hms(batch.elapsed.num_seconds() as f64),
            );
            (pct.map(gauge_percent).unwrap_or(0), label)
        }
        None => (0, "No batch".to_string()),
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Completion"))
        .gauge_style(Style::default().fg(Color::Magenta))
        .percent(percent)
        .label(label);
    f.render_widget(gauge, area);
}

/// Cells of one table row
fn chapter_cells(job: &JobProgress) -> Vec<String> {
    let fps = if job.launch_failed {
        "FAILED".to_string()
    } else {
        job.record.speed().to_string()
    };
    let percent = job
        .percent()
        .map(|p| format!("{:.1}%", p))
        .unwrap_or_else(|| "-".to_string());
    let log_size = std::fs::metadata(&job.log_path)
        .map(|m| format_size(m.len(), DECIMAL))
        .unwrap_or_else(|_| "-".to_string());

    vec![
        truncate_string(&job.title, 40),
        fps,
        format_clock(job.record.time_encoded),
        format_hms(job.length_seconds),
        percent,
        log_size,
    ]
}

fn render_chapter_table(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(vec!["CHAPTER", "FPS", "ENCODED", "LENGTH", "DONE", "LOG"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .height(1);

    // Top border, header and bottom border
    let max_data_rows = (area.height as usize).saturating_sub(3);

    let (rows, title): (Vec<Row>, String) = match &app.batch {
        Some(batch) if !batch.jobs.is_empty() => {
            let rows: Vec<Row> = batch
                .jobs
                .iter()
                .take(max_data_rows)
                .map(|job| {
                    let row = Row::new(chapter_cells(job)).height(1);
                    if job.launch_failed {
                        row.style(Style::default().fg(Color::Red))
                    } else {
                        row
                    }
                })
                .collect();
            let title = format!("Chapters ({}/{})", rows.len(), batch.jobs.len());
            (rows, title)
        }
        _ => (
            vec![Row::new(vec![
                "No chapters".to_string(),
                format!("Dir: {}", app.ws.root().display()),
            ])],
            "Chapters (0 found)".to_string(),
        ),
    };

    let widths = [
        Constraint::Percentage(35), // CHAPTER
        Constraint::Length(8),      // FPS
        Constraint::Length(12),     // ENCODED
        Constraint::Length(9),      // LENGTH
        Constraint::Length(8),      // DONE
        Constraint::Length(10),     // LOG
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .column_spacing(1);

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let dir_display = app.ws.root().display().to_string();
    let dir_short = truncate_string(&dir_display, 35);

    let (status_text, style) = match (&app.batch, &app.last_error) {
        (_, Some(err)) => (
            format!("Error: {} | q=quit r=refresh", truncate_string(err, 120)),
            Style::default().fg(Color::Red),
        ),
        (Some(batch), None) => {
            let failed = batch.jobs.iter().filter(|j| j.launch_failed).count();
            (
                format!(
                    "Batch: {} | Chapters: {} | Failed launches: {} | Dir: {} | q=quit r=refresh",
                    batch.batch_id,
                    batch.jobs.len(),
                    failed,
                    dir_short
                ),
                Style::default(),
            )
        }
        (None, None) => (format!("Dir: {} | q=quit r=refresh", dir_short), Style::default()),
    };

    let paragraph = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(style)
        .wrap(ratatui::widgets::Wrap { trim: true });

    f.render_widget(paragraph, area);
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
