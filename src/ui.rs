use anyhow::Result;
use care_ledger::{
    finance::HospitalOverview, DashboardStats, Doctor, Hospital, IncomeRecord, SurgeryRecord,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Finance,
    SurgeryRecords,
}

impl Page {
    pub fn toggle(&self) -> Self {
        match self {
            Page::Finance => Page::SurgeryRecords,
            Page::SurgeryRecords => Page::Finance,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Finance => "Finance",
            Page::SurgeryRecords => "Surgery Records",
        }
    }
}

pub struct App {
    pub doctor: Doctor,
    pub hospitals: Vec<Hospital>,
    pub overview: Vec<HospitalOverview>,
    pub surgeries: Vec<SurgeryRecord>,
    pub stats: DashboardStats,
    pub current_page: Page,
    pub finance_state: TableState,
    pub surgery_state: TableState,
    pub show_detail: bool,
}

impl App {
    pub fn new(
        doctor: Doctor,
        hospitals: Vec<Hospital>,
        surgeries: Vec<SurgeryRecord>,
        stats: DashboardStats,
    ) -> Self {
        let overview = hospitals.iter().map(HospitalOverview::from).collect();

        let mut finance_state = TableState::default();
        if !hospitals.is_empty() {
            finance_state.select(Some(0));
        }
        let mut surgery_state = TableState::default();
        if !surgeries.is_empty() {
            surgery_state.select(Some(0));
        }

        Self {
            doctor,
            hospitals,
            overview,
            surgeries,
            stats,
            current_page: Page::Finance,
            finance_state,
            surgery_state,
            show_detail: false,
        }
    }

    fn active(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Finance => (&mut self.finance_state, self.hospitals.len()),
            Page::SurgeryRecords => (&mut self.surgery_state, self.surgeries.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn toggle_page(&mut self) {
        self.current_page = self.current_page.toggle();
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_hospital(&self) -> Option<&Hospital> {
        self.finance_state.selected().and_then(|i| self.hospitals.get(i))
    }

    pub fn selected_surgery(&self) -> Option<&SurgeryRecord> {
        self.surgery_state.selected().and_then(|i| self.surgeries.get(i))
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab | KeyCode::BackTab => app.toggle_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let content = if app.show_detail {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        match app.current_page {
            Page::Finance => render_ledger_panel(f, split[1], app),
            Page::SurgeryRecords => render_entries_panel(f, split[1], app),
        }
        split[0]
    } else {
        chunks[1]
    };

    match app.current_page {
        Page::Finance => render_finance(f, content, app),
        Page::SurgeryRecords => render_surgeries(f, content, app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    for (i, page) in [Page::Finance, Page::SurgeryRecords].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("{} ({})", app.doctor.name, app.doctor.plan()),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Income: {:.0}", app.stats.income),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("Records: {}", app.stats.records),
        Style::default().fg(Color::Cyan),
    ));

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_finance(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.overview.iter().map(|h| {
        Row::new(vec![
            Cell::from(truncate(&h.name, 28)),
            Cell::from(if h.wht_enabled { "5%" } else { "-" }),
            Cell::from(format!("{:.2}", h.channeling_income)),
            Cell::from(format!("{:.2}", h.surgical_income)),
            Cell::from(format!("{:.2}", h.total_payable)).style(Style::default().fg(Color::Green)),
            Cell::from(h.record_count.to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(30),
            Constraint::Length(6),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&[
        "Hospital",
        "WHT",
        "Channeling",
        "Surgical",
        "Payable",
        "Records",
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Hospitals "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.finance_state);
}

fn render_surgeries(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.surgeries.iter().map(|r| {
        Row::new(vec![
            Cell::from(r.date.clone()),
            Cell::from(truncate(&r.patient_name, 24)),
            Cell::from(r.bht.clone().unwrap_or_default()),
            Cell::from(truncate(&r.surgery, 24)),
            Cell::from(r.entries.len().to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(26),
            Constraint::Length(12),
            Constraint::Length(26),
            Constraint::Length(8),
        ],
    )
    .header(header_row(&["Date", "Patient", "BHT", "Surgery", "Entries"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Surgery Records "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.surgery_state);
}

fn render_ledger_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Income Records ");

    let Some(hospital) = app.selected_hospital() else {
        f.render_widget(Paragraph::new("No hospital selected").block(block), area);
        return;
    };

    let lines: Vec<Line> = hospital
        .records
        .iter()
        .map(|entry| {
            let (label, color, detail) = match &entry.record {
                IncomeRecord::Channeling { patient_count, .. } => (
                    "CH",
                    Color::Cyan,
                    format!("{} patients", patient_count.unwrap_or(0)),
                ),
                IncomeRecord::Surgical { bht, .. } => (
                    "SX",
                    Color::Magenta,
                    bht.clone().unwrap_or_else(|| "-".to_string()),
                ),
            };
            Line::from(vec![
                Span::raw(format!(" {} ", entry.record.date())),
                Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(format!(" {:>12.2}  ", entry.record.value())),
                Span::styled(truncate(&detail, 20), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let body = if lines.is_empty() {
        Paragraph::new("No income records yet")
    } else {
        Paragraph::new(lines)
    };
    f.render_widget(body.block(block), area);
}

fn render_entries_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Progress Entries ");

    let Some(record) = app.selected_surgery() else {
        f.render_widget(Paragraph::new("No record selected").block(block), area);
        return;
    };

    let mut lines = Vec::new();
    for entry in &record.entries {
        lines.push(Line::from(Span::styled(
            format!(" {}", entry.created_at.format("%Y-%m-%d %H:%M")),
            Style::default().fg(Color::Cyan),
        )));
        lines.push(Line::from(format!("   {}", entry.notes)));
        if !entry.images.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("   {} image(s)", entry.images.len()),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    let body = if lines.is_empty() {
        Paragraph::new("No entries yet")
    } else {
        Paragraph::new(lines)
    };
    f.render_widget(body.block(block), area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Finance => (app.finance_state.selected(), app.hospitals.len()),
        Page::SurgeryRecords => (app.surgery_state.selected(), app.surgeries.len()),
    };
    let selected = selected.map(|i| i + 1).unwrap_or(0);

    let status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, total),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
