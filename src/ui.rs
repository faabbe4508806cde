use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        block::{Position, Title},
        canvas::{Canvas, Line as CanvasLine},
        Axis, Block, BorderType, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table,
        Tabs, Wrap,
    },
    Frame, Terminal,
};

use crate::{
    app::App,
    chart::ChartAdapter,
    config::Page,
    constants::{PROCESS_METRICS, TICK_RATE_MS},
    controller::{Entry, RefreshState},
    model::StatisticsTable,
    params::element_id,
    util::{format_success_rate, SuccessClass},
};

/// Take over the terminal and run the dashboard until `q` or until `running`
/// is cleared.
pub fn run(mut app: App, running: Arc<AtomicBool>) -> io::Result<()> {
    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.start();
    let res = run_app_loop(&mut terminal, &mut app, &running);
    app.stop();

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    running: &AtomicBool,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(TICK_RATE_MS);

    while running.load(Ordering::SeqCst) && !app.should_quit {
        terminal.draw(|f| draw(f, app))?;

        // Handle input
        let timeout = tick_rate
            .checked_sub(app.last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                        return Ok(());
                    }
                    app.on_key(key.code);
                }
            }
        }
        if app.last_tick.elapsed() >= tick_rate {
            app.on_tick();
        }
    }

    tracing::info!("dashboard closed");
    Ok(())
}

fn draw(f: &mut Frame, app: &App) {
    // ============= whole screen layout ============
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Page Tabs
            Constraint::Min(10),   // Page Body
            Constraint::Length(1), // Bottom Status Bar
        ])
        .split(f.size());

    let titles: Vec<&str> = Page::ALL.iter().map(|p| p.title()).collect();
    let selected = Page::ALL.iter().position(|p| *p == app.page).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(rounded(format!(" admin [{}] ", app.histograms.view_url().origin().ascii_serialization())))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, main_chunks[0]);

    match app.page {
        Page::Summary => draw_summary(f, app, main_chunks[1]),
        Page::Metrics => draw_metrics(f, app, main_chunks[1]),
        Page::Servers => draw_servers(f, app, main_chunks[1]),
        Page::Histograms => draw_histograms(f, app, main_chunks[1]),
        Page::Process => draw_process(f, app, main_chunks[1]),
    }

    draw_status_bar(f, app, main_chunks[2]);
}

fn rounded<'a>(title: impl Into<Line<'a>>) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(title)
}

fn header(cells: &[&'static str]) -> Row<'static> {
    Row::new(
        cells
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().bg(Color::Rgb(40, 40, 40)))
}

fn success_color(ratio: f64) -> Color {
    match SuccessClass::of(ratio) {
        SuccessClass::Bad => Color::Red,
        SuccessClass::Poor => Color::LightYellow,
        SuccessClass::Good => Color::Green,
    }
}

/// Bar-per-sample line graph of a rolling window.
fn draw_live_chart(f: &mut Frame, chart: &ChartAdapter, color: Color, area: Rect) {
    let max = chart.max_value().max(1.0);
    let x_limit = chart.window().capacity() as f64;
    let since = chart
        .window()
        .iter()
        .next()
        .map(|(t, _)| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();

    let canvas = Canvas::default()
        .block(
            rounded(format!(" {} ", chart.title()))
                .title_style(Style::default().fg(color))
                .title(
                    Title::from(format!(" now {} | max {} | since {} ", chart.latest(), max, since))
                        .position(Position::Bottom),
                ),
        )
        .marker(Marker::Braille)
        .x_bounds([0.0, x_limit])
        .y_bounds([0.0, max])
        .paint(|ctx| {
            for (i, val) in chart.values().enumerate() {
                ctx.draw(&CanvasLine {
                    x1: i as f64,
                    y1: 0.0,
                    x2: i as f64,
                    y2: val,
                    color,
                });
            }
        });
    f.render_widget(canvas, area);
}

fn draw_summary(f: &mut Frame, app: &App, area: Rect) {
    let summary = &app.summary;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(14), Constraint::Min(6)])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(chunks[0]);

    draw_live_chart(f, &summary.chart, Color::Cyan, top[0]);

    let rate = match summary.success_rate {
        Some(ratio) => Span::styled(
            format_success_rate(ratio),
            Style::default().fg(success_color(ratio)).add_modifier(Modifier::BOLD),
        ),
        None => Span::raw("-"),
    };
    let mut lines = vec![Line::from(vec![Span::styled("Success Rate ", Style::default().fg(Color::DarkGray)), rate])];
    if let Some(notice) = summary.notice {
        lines.push(Line::from(Span::styled(notice, Style::default().fg(Color::LightYellow))));
    }
    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: true }).block(rounded(" Server ")),
        top[1],
    );

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);

    let rows = summary
        .highlights
        .iter()
        .map(|(label, value)| Row::new(vec![Cell::from(label.as_str()), Cell::from(value.as_str())]));
    let table = Table::new(rows, [Constraint::Percentage(50), Constraint::Percentage(50)])
        .header(header(&["Metric", "Value"]))
        .block(rounded(" Highlights "));
    f.render_widget(table, bottom[0]);

    let rows = summary.clients.iter().map(|client| {
        let rate = match client.success_rate {
            Some(ratio) => Cell::from(format_success_rate(ratio)).style(Style::default().fg(success_color(ratio))),
            None => Cell::from("-"),
        };
        Row::new(vec![
            Cell::from(client.name.as_str()),
            rate,
            Cell::from(client.ports.join(", ")).style(Style::default().fg(Color::DarkGray)),
        ])
    });
    let table = Table::new(
        rows,
        [Constraint::Percentage(40), Constraint::Percentage(20), Constraint::Percentage(40)],
    )
    .header(header(&["Client", "Success Rate", "Ports"]))
    .block(rounded(" Least Performant Clients "));
    f.render_widget(table, bottom[1]);
}

fn cursor_style(selected: bool) -> Style {
    if selected {
        Style::default().bg(Color::Rgb(40, 40, 40)).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn draw_metrics(f: &mut Frame, app: &App, area: Rect) {
    let metrics = &app.metrics;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    let lines: Vec<Line> = metrics
        .entries()
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let style = cursor_style(i == metrics.cursor);
            match entry {
                Entry::Group { name, expanded } => {
                    let marker = if expanded { "▼ " } else { "▶ " };
                    Line::from(Span::styled(format!("{}{}", marker, name), style.fg(Color::Cyan)))
                }
                Entry::Metric { name, label } => {
                    let style = if metrics.selected_metric() == Some(name.as_str()) {
                        style.fg(Color::Yellow)
                    } else {
                        style
                    };
                    Line::from(Span::styled(format!("    {}", label), style))
                }
            }
        })
        .collect();

    let skip = metrics.cursor.saturating_sub(chunks[0].height.saturating_sub(3) as usize);
    f.render_widget(
        Paragraph::new(lines).scroll((skip as u16, 0)).block(rounded(" Metrics ")),
        chunks[0],
    );
    draw_live_chart(f, &metrics.chart, Color::Green, chunks[1]);
}

fn draw_servers(f: &mut Frame, app: &App, area: Rect) {
    let servers = &app.servers;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(14), Constraint::Min(4)])
        .split(area);

    let names = servers.names();
    let active = servers
        .active_server()
        .and_then(|s| names.iter().position(|n| *n == s))
        .unwrap_or(0);
    let tabs = Tabs::new(names.clone())
        .select(active)
        .block(rounded(" Servers (←/→) "))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, chunks[0]);

    draw_live_chart(f, &servers.chart, Color::Magenta, chunks[1]);

    let rows = servers.active_keys().iter().map(|key| {
        Row::new(vec![
            Cell::from(key.as_str()),
            Cell::from(servers.board.text(&element_id(key)).to_string()),
        ])
    });
    let table = Table::new(rows, [Constraint::Percentage(70), Constraint::Percentage(30)])
        .header(header(&["Metric", "Delta"]))
        .block(rounded(" Deltas "));
    f.render_widget(table, chunks[2]);
}

fn draw_histograms(f: &mut Frame, app: &App, area: Rect) {
    let histograms = &app.histograms;
    let params = histograms.params();
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(area);

    let lines: Vec<Line> = histograms
        .names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let style = cursor_style(i == histograms.cursor);
            let style = if *name == params.metric_name {
                style.fg(Color::Yellow)
            } else {
                style
            };
            Line::from(Span::styled(name.as_str(), style))
        })
        .collect();
    let skip = histograms.cursor.saturating_sub(chunks[0].height.saturating_sub(3) as usize);
    f.render_widget(
        Paragraph::new(lines).scroll((skip as u16, 0)).block(rounded(" Histograms ")),
        chunks[0],
    );

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(14)])
        .split(chunks[1]);

    let points = histograms.points();
    let (x_min, x_max) = points
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)));
    let (x_min, x_max) = if points.is_empty() { (0.0, 1.0) } else { (x_min, x_max.max(x_min + 1.0)) };
    let y_max = points.iter().map(|(_, y)| *y).fold(0.0, f64::max).max(f64::EPSILON);

    let x_title = if params.log_scale { "log10(value)" } else { "value" };
    let dataset = Dataset::default()
        .name(params.format.label())
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&points);
    let refresh = match histograms.refresh_state() {
        RefreshState::On => Span::styled("auto refresh on", Style::default().fg(Color::Green)),
        RefreshState::Off => Span::styled("auto refresh off", Style::default().fg(Color::DarkGray)),
    };
    let chart = Chart::new(vec![dataset])
        .block(
            rounded(format!(" {} ", params.metric_name))
                .title(Title::from(Line::from(vec![Span::raw(" "), refresh, Span::raw(" ")])).position(Position::Bottom)),
        )
        .x_axis(
            Axis::default()
                .title(x_title)
                .bounds([x_min, x_max])
                .labels(vec![Span::raw(format!("{:.2}", x_min)), Span::raw(format!("{:.2}", x_max))]),
        )
        .y_axis(
            Axis::default()
                .title("%")
                .bounds([0.0, y_max])
                .labels(vec![Span::raw("0"), Span::raw(format!("{:.2}", y_max))]),
        );
    f.render_widget(chart, right[0]);

    draw_statistics(f, app, right[1]);
}

fn draw_statistics(f: &mut Frame, app: &App, area: Rect) {
    let board = &app.histograms.board;
    let rows = StatisticsTable::default().rows().map(|(id, _)| {
        Row::new(vec![
            Cell::from(id.trim_start_matches("detail_")),
            Cell::from(board.text(id).to_string()),
        ])
    });
    let table = Table::new(rows, [Constraint::Percentage(40), Constraint::Percentage(60)])
        .header(header(&["Statistic", "Value"]))
        .block(rounded(" Statistics "));
    f.render_widget(table, area);
}

fn draw_process(f: &mut Frame, app: &App, area: Rect) {
    let process = &app.process;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let rows = PROCESS_METRICS
        .iter()
        .map(|name| Row::new(vec![Cell::from(*name), Cell::from(process.text(name).to_string())]));
    let table = Table::new(rows, [Constraint::Percentage(60), Constraint::Percentage(40)])
        .header(header(&["Metric", "Value"]))
        .block(rounded(" Process "));
    f.render_widget(table, chunks[0]);

    let text = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(40),
            Constraint::Percentage(20),
        ])
        .split(chunks[1]);
    f.render_widget(
        Paragraph::new(process.client_info.as_str())
            .wrap(Wrap { trim: false })
            .block(rounded(" Clients ")),
        text[0],
    );
    f.render_widget(
        Paragraph::new(process.server_info.as_str())
            .wrap(Wrap { trim: false })
            .block(rounded(" Server Info ")),
        text[1],
    );
    f.render_widget(
        Paragraph::new(process.lint_warnings.as_str())
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::Yellow))
            .block(rounded(" Lint Warnings ")),
        text[2],
    );
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        format!(" {} ", app.page.title().to_uppercase()),
        Style::default().bg(Color::White).fg(Color::Black).add_modifier(Modifier::BOLD),
    )];

    if app.page == Page::Histograms {
        spans.push(Span::raw(format!(" {} ", app.histograms.view_url())));
        spans.push(Span::styled(
            "| r/s refresh  l/n log  p/c pdf/cdf  d download ",
            Style::default().fg(Color::DarkGray),
        ));
        if let Some(path) = &app.last_download {
            spans.push(Span::styled(
                format!("| saved {} ", path.display()),
                Style::default().fg(Color::Green),
            ));
        }
    } else if let Some(fragment) = &app.fragment {
        spans.push(Span::styled(format!(" #{} ", fragment.trim_start_matches('#')), Style::default().fg(Color::DarkGray)));
    }

    if let Some(error) = &app.last_error {
        spans.push(Span::styled(format!("| {} ", error), Style::default().fg(Color::Red)));
    }
    spans.push(Span::raw("| Tab to switch, 'q' to quit"));

    let status_bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(20, 20, 20)));
    f.render_widget(status_bar, area);
}
