use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

use crate::card::{EditState, RowCard};
use crate::domain::{Field, Screen};
use crate::inputter::InputResult;
use crate::model::Model;
use crate::screens::{DataScreen, NO_DATA, RowScreen};

pub const TAB_TITLES: [&str; 2] = ["Data", "Favoritte"];
const FAVORITE_ON: &str = "★";
const FAVORITE_OFF: &str = "☆";
const KEY_HINTS: &str = "? help | Tab screen | q quit";

#[derive(Debug, Default)]
pub struct AppUI {
    list_state: ListState,
}

impl AppUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(5), Constraint::Length(1)])
            .split(frame.area());

        let selected_tab = match model.screen() {
            Screen::Data => 0,
            Screen::Favorites => 1,
        };
        let tabs = Tabs::new(TAB_TITLES)
            .block(Block::bordered().title(" wordsearch ".bold()).border_set(border::THICK))
            .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .select(selected_tab);
        frame.render_widget(tabs, layout[0]);

        let list_area = match model.screen() {
            Screen::Data => self.draw_data_header(model, frame, layout[1]),
            Screen::Favorites => {
                let parts = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Length(1), Constraint::Min(1)])
                    .split(layout[1]);
                frame.render_widget(Paragraph::new(model.favorites().header().dim()), parts[0]);
                parts[1]
            }
        };
        self.draw_cards(model, frame, list_area);

        let status = Line::from(vec![
            Span::raw(model.status_message().to_string()).yellow(),
            Span::raw(" | ").dim(),
            Span::raw(KEY_HINTS).dim(),
        ]);
        frame.render_widget(Paragraph::new(status), layout[2]);

        if let Some(message) = model.popup() {
            let area = centered_rect(70, 60, frame.area());
            frame.render_widget(Clear, area);
            let popup = Paragraph::new(message.to_string())
                .wrap(Wrap { trim: false })
                .block(Block::bordered().title(" Esc to close "));
            frame.render_widget(popup, area);
        }
    }

    /// Draws the connection and search sections, returns the area left for the results.
    fn draw_data_header(&self, model: &Model, frame: &mut Frame, area: Rect) -> Rect {
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(7), Constraint::Length(3), Constraint::Min(1)])
            .split(area);
        let data = model.data();
        let editing = model.editing();

        let mut lines = vec![
            field_line("IP / Host", Field::Host, data.host(), editing),
            field_line("Port", Field::Port, data.port(), editing),
            Line::from(format!("Base URL: {}", data.base_url()).dim()),
            Line::from(save_label(data)),
        ];
        if !data.test_message().is_empty() {
            lines.push(Line::from(data.test_message().to_string()));
        }
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .block(Block::default().borders(Borders::ALL).title(" Connection ")),
            parts[0],
        );

        let search = Paragraph::new(field_line("Query", Field::Search, data.query(), editing)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Search by Lemma ")
                .title_bottom(Line::from(data.service_line()).right_aligned()),
        );
        frame.render_widget(search, parts[1]);
        parts[2]
    }

    fn draw_cards(&mut self, model: &Model, frame: &mut Frame, area: Rect) {
        let screen = model.active();
        let block = Block::default().borders(Borders::ALL).title(screen.results_title());
        let list = screen.list();
        if list.is_empty() {
            frame.render_widget(Paragraph::new(screen.empty_text().dim()).block(block), area);
            return;
        }

        let table = screen.active_table();
        let meet_input = match model.editing() {
            Some((Field::Meet, input)) => Some(input),
            _ => None,
        };
        let meet_target = model.meet_target();
        let selected = list.selected_index();
        let items: Vec<ListItem> = list
            .cards()
            .iter()
            .map(|card| {
                let editor = meet_input.filter(|_| meet_target == Some(card.key()));
                ListItem::new(card_lines(card, table.as_deref(), editor))
            })
            .collect();

        self.list_state.select(Some(selected));
        let widget = List::new(items)
            .block(block)
            .highlight_symbol("> ")
            .highlight_style(Style::default().add_modifier(Modifier::BOLD));
        frame.render_stateful_widget(widget, area, &mut self.list_state);
    }
}

fn save_label(data: &DataScreen) -> Span<'static> {
    if data.is_testing() {
        "Testing...".italic()
    } else {
        "[t] Save & Test".cyan()
    }
}

/// `label: value`, with the editor contents when `field` has focus.
fn field_line(label: &str, field: Field, value: &str, editing: Option<(Field, &InputResult)>) -> Line<'static> {
    let mut spans = vec![Span::raw(format!("{label}: "))];
    match editing {
        Some((focused, input)) if focused == field => spans.extend(with_cursor(input)),
        _ => spans.push(Span::raw(value.to_string())),
    }
    Line::from(spans)
}

fn with_cursor(input: &InputResult) -> Vec<Span<'static>> {
    let before: String = input.input.chars().take(input.cursor_pos).collect();
    let mut rest = input.input.chars().skip(input.cursor_pos);
    let at = rest.next().map(String::from).unwrap_or_else(|| " ".to_string());
    let after: String = rest.collect();
    vec![
        Span::raw(before).underlined(),
        Span::raw(at).reversed(),
        Span::raw(after).underlined(),
    ]
}

fn card_lines(card: &RowCard, table: Option<&str>, editor: Option<&InputResult>) -> Text<'static> {
    let marker = if card.is_favorite() { FAVORITE_ON } else { FAVORITE_OFF };
    let marker = if card.toggle_enabled(table) {
        Span::raw(marker).yellow()
    } else {
        Span::raw(marker).dim()
    };
    let mut lines = vec![Line::from(vec![
        marker,
        Span::raw(" "),
        Span::raw(card.headline()).bold(),
        Span::raw(format!("  ID: {}", card.id_label())).dim(),
    ])];
    let summary = card.summary();
    if !summary.is_empty() {
        lines.push(Line::from(format!("  {summary}")));
    }
    let definition = card.definition();
    if !definition.is_empty() {
        lines.push(Line::from(format!("  {definition}").italic()));
    }
    match card.state() {
        EditState::Pending { .. } => lines.push(Line::from("  saving...".dim())),
        EditState::RolledBack { error } => {
            lines.push(Line::from(format!("  update failed: {error}").red()));
        }
        EditState::Idle | EditState::Committed => {}
    }

    if card.is_expanded() {
        let details = card.details();
        if details.is_empty() {
            lines.push(Line::from(format!("    {NO_DATA}").dim()));
        }
        for (key, value) in details {
            lines.push(Line::from(vec![
                Span::raw(format!("    {key}: ")).cyan(),
                Span::raw(value),
            ]));
        }
        if card.is_editable() {
            let mut spans = vec![Span::raw("    meet: ").cyan()];
            match editor {
                Some(input) => spans.extend(with_cursor(input)),
                None => spans.push(Span::raw(card.meet_value().to_string()).underlined()),
            }
            spans.push(Span::raw("  [e] edit [s] Save [F] Set Favorite [c] Clear").dim());
            lines.push(Line::from(spans));
        }
    }
    Text::from(lines)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ratatui::{Terminal, backend::TestBackend};

    use super::*;
    use crate::api::RowsResponse;
    use crate::client::BaseUrlConfig;
    use crate::domain::{AppConfig, HELP_TEXT, Message};
    use crate::query::{Fetched, Request};
    use crate::row::Row;
    use crate::settings::MemoryStore;

    fn render(model: &Model) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        let mut ui = AppUI::new();
        terminal.draw(|f| ui.draw(model, f)).unwrap();
        let buffer = terminal.backend().buffer();
        (0..buffer.area.height)
            .map(|y| {
                (0..buffer.area.width)
                    .map(|x| buffer[(x, y)].symbol())
                    .collect::<String>()
            })
            .collect::<Vec<String>>()
            .join("\n")
    }

    fn model_with_rows(rows: Vec<Row>) -> Model {
        let base_url = BaseUrlConfig::new(Arc::new(MemoryStore::default()), "http://localhost:5035/");
        let mut model = Model::init(&AppConfig::default(), base_url, None);
        let generation = model
            .take_requests()
            .iter()
            .find_map(|r| match r {
                Request::Rows { generation, .. } => Some(*generation),
                _ => None,
            })
            .unwrap();
        model.update(Message::Fetched(Fetched::Rows {
            screen: Screen::Data,
            generation,
            result: Ok(RowsResponse { table: "lexicon".to_string(), limit: 50, offset: 0, rows }),
        }));
        model
    }

    #[test]
    fn data_screen_shows_connection_and_cards() {
        let model = model_with_rows(vec![
            Row::new().with("id", 1).with("Lemma", "cat").with("Summary", "small feline"),
            Row::new().with("id", 2).with("meet", "favorite"),
        ]);
        let screen = render(&model);
        assert!(screen.contains("IP / Host: localhost"));
        assert!(screen.contains("Base URL: http://localhost:5035/"));
        assert!(screen.contains("☆ cat  ID: 1"));
        assert!(screen.contains("small feline"));
        assert!(screen.contains("★ Untitled  ID: 2"));
        assert!(screen.contains("Favoritte"));
    }

    #[test]
    fn expanded_card_lists_sorted_fields() {
        let mut model = model_with_rows(vec![Row::new().with("id", 1).with("Lemma", "cat").with("meet", "")]);
        model.update(Message::ToggleDetails);
        let screen = render(&model);
        let id = screen.find("    id: 1").unwrap();
        let lemma = screen.find("    Lemma: cat").unwrap();
        assert!(lemma < id);
        assert!(screen.contains("[s] Save"));
    }

    #[test]
    fn explain_only_row_fills_summary_and_definition() {
        let model = model_with_rows(vec![Row::new().with("id", 1).with("Lemma", "cat").with("explain", "zzfeline")]);
        assert_eq!(render(&model).matches("zzfeline").count(), 2);
    }

    #[test]
    fn empty_results_show_placeholder() {
        let model = model_with_rows(Vec::new());
        assert!(render(&model).contains("No data"));
    }

    #[test]
    fn help_popup_is_drawn() {
        let mut model = model_with_rows(Vec::new());
        model.update(Message::Help);
        let first_line = HELP_TEXT.lines().next().unwrap();
        assert!(render(&model).contains(first_line.trim_end()));
    }
}
