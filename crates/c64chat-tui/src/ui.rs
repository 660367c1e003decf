use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use c64chat_core::palette::C64Color;
use c64chat_core::screen::{TextScreen, COLUMNS, ROWS};
use crate::app::App;

fn rgb(color: C64Color) -> Color {
    let (r, g, b) = color.rgb();
    Color::Rgb(r, g, b)
}

/// One styled line per screen row, merging runs of the same colour.
pub fn screen_lines(screen: &TextScreen) -> Vec<Line<'static>> {
    (0..ROWS)
        .map(|row| {
            let mut spans: Vec<Span<'static>> = Vec::new();
            let mut run = String::new();
            let mut run_color: Option<C64Color> = None;
            for cell in screen.row(row) {
                if run_color != Some(cell.color) && !run.is_empty() {
                    if let Some(color) = run_color {
                        spans.push(Span::styled(std::mem::take(&mut run), Style::default().fg(rgb(color))));
                    }
                }
                run_color = Some(cell.color);
                run.push(cell.ch);
            }
            if let Some(color) = run_color {
                spans.push(Span::styled(run, Style::default().fg(rgb(color))));
            }
            Line::from(spans)
        })
        .collect()
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_device(app, frame, body_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" C64 Chat Simulator ", Style::default().fg(Color::Cyan).bold()),
        Span::raw(" "),
        Span::styled(
            format!("{} / {}", app.provider.display_name(), app.model),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(title), area);
}

fn render_device(app: &App, frame: &mut Frame, area: Rect) {
    let screen = app.device.screen();

    // The device screen plus a one-cell border in the border colour.
    let [column] = Layout::horizontal([Constraint::Length(COLUMNS as u16 + 2)])
        .flex(Flex::Center)
        .areas(area);
    let [device_area] = Layout::vertical([Constraint::Length(ROWS as u16 + 2)])
        .flex(Flex::Center)
        .areas(column);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(rgb(screen.border)))
        .style(Style::default().bg(rgb(screen.background)));
    let paragraph = Paragraph::new(screen_lines(screen)).block(block);
    frame.render_widget(paragraph, device_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" send  "),
        Span::styled("/color <name>", Style::default().fg(Color::Yellow)),
        Span::raw(" border  "),
        Span::styled("/thinking", Style::default().fg(Color::Yellow)),
        Span::raw(" reasoning  "),
        Span::styled("/reset", Style::default().fg(Color::Yellow)),
        Span::raw(" new chat  "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ];
    if let Some(outcome) = &app.last_outcome {
        spans.push(Span::styled(format!("  | {}", outcome), Style::default().fg(Color::DarkGray)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
