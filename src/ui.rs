use std::iter;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Prompt, TableView};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

pub const MIN_COL_WIDTH: usize = 10;
pub const COL_PADDING: usize = 2;

const SORT_COLOR: Color = Color::Rgb(173, 216, 230);
const LEGEND: &str = "'q': Quit, 's': Sort, 'f': Search, ←/→: Change Sort, 'h'/'l': Scroll Left/Right, ↑/↓: Navigate, PgUp/PgDn: Page";

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.size();
    match &app.view {
        Some(view) => {
            let lines = match &view.prompt {
                Some(Prompt::Sort(input)) => sort_prompt_lines(view, input, area.width),
                _ => table_lines(view, area.width),
            };
            f.render_widget(Paragraph::new(lines), area);
        }
        None => draw_table_list(f, area, app),
    }
}

fn draw_table_list(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(2)].as_ref())
        .split(area);

    let items: Vec<ListItem> = app
        .tables
        .iter()
        .map(|t| ListItem::new(t.as_str()))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Select a table:"),
        )
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .fg(Color::Yellow),
        )
        .highlight_symbol("> ");

    f.render_stateful_widget(list, chunks[0], &mut list_state(app));

    let status = Paragraph::new(app.status.as_str()).block(Block::default().borders(Borders::TOP));
    f.render_widget(status, chunks[1]);
}

fn list_state(app: &App) -> ListState {
    let mut st = ListState::default();
    if !app.tables.is_empty() {
        st.select(Some(app.selected_table));
    }
    st
}

/// Display width per column: widest of header and the current page's cells, never below
/// `MIN_COL_WIDTH`. Recomputed per page, so widths shift as the user pages.
pub fn column_widths(columns: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|v| text_width(&cell_text(v)))
                .chain(iter::once(text_width(name)))
                .max()
                .unwrap_or(0)
                .max(MIN_COL_WIDTH)
        })
        .collect()
}

/// Contiguous columns starting at `scroll` that fit in `avail`. The first column is kept
/// even when it alone overflows, and is truncated when drawn.
pub fn visible_columns(widths: &[usize], scroll: usize, avail: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut used = 0;
    for (i, &w) in widths.iter().enumerate().skip(scroll) {
        if used + w > avail && !out.is_empty() {
            break;
        }
        out.push(i);
        used += w + COL_PADDING;
    }
    out
}

pub fn scroll_bar(scroll: usize, max_scroll: usize) -> String {
    let k = if max_scroll == 0 {
        0
    } else {
        (scroll.min(max_scroll) * 10) / max_scroll
    };
    format!("[{}|{}]", " ".repeat(k), " ".repeat(10 - k))
}

/// Bottom indicator row: centred scroll bar with `<<`/`>>` at the edges.
pub fn indicator_line(width: usize, bar: Option<&str>, left: bool, right: bool) -> String {
    let mut cells = vec![' '; width];
    if let Some(bar) = bar {
        let bar: Vec<char> = bar.chars().collect();
        let start = width.saturating_sub(bar.len()) / 2;
        for (slot, c) in cells.iter_mut().skip(start).zip(bar) {
            *slot = c;
        }
    }
    if width >= 2 {
        if left {
            cells[0] = '<';
            cells[1] = '<';
        }
        if right {
            cells[width - 2] = '>';
            cells[width - 1] = '>';
        }
    }
    cells.into_iter().collect::<String>().trim_end().to_string()
}

pub fn row_range(offset: usize, page_size: usize, total: usize) -> String {
    if total == 0 {
        return "0-0".to_string();
    }
    let first = (offset + 1).min(total);
    format!("{}-{}", first, (offset + page_size).min(total))
}

/// One line per screen row of the table view: title, header, rule, rows, indicator, footer.
pub fn table_lines(view: &TableView, width: u16) -> Vec<Line<'static>> {
    let width = usize::from(width);
    let avail = width.saturating_sub(2);
    let widths = column_widths(&view.columns, &view.page.rows);
    let visible = visible_columns(&widths, view.h_scroll, avail);
    let total_width: usize = widths.iter().map(|w| w + COL_PADDING).sum();
    let max_scroll = view.max_scroll();

    let mut lines = Vec::with_capacity(view.spec.page_size + 5);
    lines.push(Line::from(Span::styled(
        center(&format!("Table: {}", view.table), width),
        Style::default().add_modifier(Modifier::BOLD),
    )));

    // header
    let mut spans = Vec::new();
    let mut remaining = avail;
    for &i in &visible {
        let cell = truncate(&pad(&view.columns[i], widths[i]), remaining);
        if cell.is_empty() {
            break;
        }
        remaining -= text_width(&cell);
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if i == view.spec.sort_column {
            style = style.add_modifier(Modifier::REVERSED);
        }
        spans.push(Span::styled(cell, style));
    }
    lines.push(Line::from(spans));
    lines.push(Line::from(Span::styled(
        "-".repeat(avail.min(total_width)),
        Style::default().add_modifier(Modifier::BOLD),
    )));

    for row in &view.page.rows {
        let text: String = visible
            .iter()
            .map(|&i| pad(&cell_text(row.get(i).map(|s| s.as_str()).unwrap_or("")), widths[i]))
            .collect();
        lines.push(Line::from(truncate(&text, avail)));
    }
    for _ in view.page.rows.len()..view.spec.page_size {
        lines.push(Line::default());
    }

    let bar = (total_width > avail && max_scroll > 0).then(|| scroll_bar(view.h_scroll, max_scroll));
    lines.push(Line::from(indicator_line(
        width,
        bar.as_deref(),
        view.h_scroll > 0,
        view.h_scroll < max_scroll,
    )));
    lines.push(footer_line(view));
    lines
}

fn footer_line(view: &TableView) -> Line<'static> {
    if let Some(Prompt::Search(input)) = &view.prompt {
        return Line::from(format!("Enter search term: {input}_"));
    }
    let spec = &view.spec;
    let sort_name = view
        .columns
        .get(spec.sort_column)
        .map(|s| s.as_str())
        .unwrap_or("");
    let mut spans = vec![
        Span::raw(format!(
            "Showing rows {} of {} | ",
            row_range(spec.offset, spec.page_size, view.page.total_rows),
            view.page.total_rows
        )),
        Span::styled(
            format!("Sorted by: {} ({})", sort_name, spec.sort_dir),
            Style::default().fg(SORT_COLOR),
        ),
    ];
    if !spec.search.is_empty() {
        spans.push(Span::raw(format!(" | Search: {}", spec.search)));
    }
    spans.push(Span::raw(format!(" | {LEGEND}")));
    Line::from(spans)
}

pub fn sort_prompt_lines(view: &TableView, input: &str, width: u16) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(Span::styled(
            center("Sort by Column", usize::from(width)),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::default(),
    ];
    lines.extend(
        view.columns
            .iter()
            .enumerate()
            .map(|(i, c)| Line::from(format!("{i}: {c}"))),
    );
    lines.push(Line::default());
    lines.push(Line::from(format!("Enter column number to sort by: {input}_")));
    lines
}

// Control characters would break the one-line-per-row layout
fn cell_text(v: &str) -> String {
    v.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Terminal columns occupied by `s`; CJK and other wide glyphs take two.
fn text_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

fn pad(s: &str, width: usize) -> String {
    let fill = (width + COL_PADDING).saturating_sub(text_width(s));
    format!("{}{}", s, " ".repeat(fill))
}

/// Cut `s` to at most `width` terminal columns without splitting a wide glyph.
fn truncate(s: &str, width: usize) -> String {
    let mut used = 0;
    s.chars()
        .take_while(|c| {
            used += c.width().unwrap_or(0);
            used <= width
        })
        .collect()
}

fn center(s: &str, width: usize) -> String {
    let left = width.saturating_sub(text_width(s)) / 2;
    format!("{}{}", " ".repeat(left), s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{TableView, Viewport};
    use crate::db::{Page, tests::fixture};
    use ratatui::{Terminal, backend::TestBackend};

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn users_view(page_size: usize) -> TableView {
        let mut view = TableView::new("users".into(), strings(&["id", "name"]), page_size);
        view.page = Page {
            rows: vec![
                strings(&["1", "ann"]),
                strings(&["2", "bob"]),
                strings(&["3", "cy"]),
            ],
            total_rows: 3,
        };
        view
    }

    fn wide_view() -> TableView {
        let columns = strings(&["a", "b", "c", "d", "e"]);
        let mut view = TableView::new("wide".into(), columns, 2);
        view.page = Page {
            rows: vec![strings(&["x", "y", "a much longer value here", "z", "w"])],
            total_rows: 1,
        };
        view
    }

    #[test]
    fn widths_have_a_floor_and_track_content() {
        let columns = strings(&["id", "a_rather_long_header"]);
        let rows = vec![strings(&["123456789012345", "x"])];
        assert_eq!(column_widths(&columns, &rows), vec![15, 20]);
        assert_eq!(column_widths(&columns, &[]), vec![10, 20]);
    }

    #[test]
    fn widths_follow_the_current_page_only() {
        let columns = strings(&["v"]);
        let first = column_widths(&columns, &[strings(&["short"])]);
        let second = column_widths(&columns, &[strings(&["a value of twenty ch"])]);
        assert_eq!(first, vec![10]);
        assert_eq!(second, vec![20]);
    }

    #[test]
    fn visible_window_starts_at_scroll() {
        let widths = vec![10, 10, 10, 10];
        assert_eq!(visible_columns(&widths, 0, 30), vec![0, 1]);
        assert_eq!(visible_columns(&widths, 2, 30), vec![2, 3]);
        assert_eq!(visible_columns(&widths, 3, 100), vec![3]);
        assert_eq!(visible_columns(&widths, 0, 5), vec![0]);
    }

    #[test]
    fn scroll_bar_is_proportional() {
        assert_eq!(scroll_bar(0, 4), "[|          ]");
        assert_eq!(scroll_bar(2, 4), "[     |     ]");
        assert_eq!(scroll_bar(4, 4), "[          |]");
    }

    #[test]
    fn indicator_places_markers_at_edges() {
        let line = indicator_line(20, Some("[|]"), true, true);
        assert!(line.starts_with("<<"));
        assert!(line.ends_with(">>"));
        assert_eq!(line.chars().count(), 20);
        assert_eq!(&line[8..11], "[|]");
        assert_eq!(indicator_line(20, None, false, false), "");
    }

    #[test]
    fn row_range_handles_empty_and_partial_pages() {
        assert_eq!(row_range(0, 5, 0), "0-0");
        assert_eq!(row_range(0, 5, 3), "1-3");
        assert_eq!(row_range(5, 5, 12), "6-10");
        assert_eq!(row_range(7, 5, 12), "8-12");
    }

    #[test]
    fn table_frame_layout() {
        let view = users_view(5);
        let lines = table_lines(&view, 40);
        assert_eq!(lines.len(), 10);
        assert_eq!(line_text(&lines[0]).trim(), "Table: users");
        assert_eq!(line_text(&lines[1]), "id          name        ");
        assert_eq!(line_text(&lines[2]), "-".repeat(24));
        assert_eq!(line_text(&lines[3]), "1           ann         ");
        assert_eq!(line_text(&lines[6]), "");
        let indicator = line_text(&lines[8]);
        assert_eq!(indicator.trim(), ">>");
        assert_eq!(indicator.chars().count(), 40);
        let footer = line_text(&lines[9]);
        assert!(footer.starts_with("Showing rows 1-3 of 3 | Sorted by: id (ASC)"));
        assert!(!footer.contains("Search:"));
    }

    #[test]
    fn sort_column_header_is_highlighted() {
        let mut view = users_view(5);
        view.spec.sort_column = 1;
        let lines = table_lines(&view, 40);
        let header = &lines[1].spans;
        assert!(!header[0].style.add_modifier.contains(Modifier::REVERSED));
        assert!(header[1].style.add_modifier.contains(Modifier::REVERSED));
        assert!(header[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn rows_are_truncated_never_wrapped() {
        let view = wide_view();
        let lines = table_lines(&view, 30);
        // avail = 28: columns a and b fit
        assert_eq!(line_text(&lines[1]), "a           b           ");
        assert_eq!(line_text(&lines[3]), "x           y           ");
        let indicator = line_text(&lines[5]);
        assert!(indicator.contains("[|          ]"));
        assert!(indicator.ends_with(">>"));
        assert!(!indicator.starts_with("<<"));
    }

    #[test]
    fn scrolled_frame_shows_left_marker() {
        let mut view = wide_view();
        view.h_scroll = 2;
        let lines = table_lines(&view, 30);
        assert!(line_text(&lines[1]).starts_with("c"));
        assert_eq!(line_text(&lines[3]).chars().count(), 26);
        let indicator = line_text(&lines[5]);
        assert!(indicator.starts_with("<<"));
        assert!(indicator.contains("[     |     ]"));
    }

    #[test]
    fn footer_shows_search_and_prompt() {
        let mut view = users_view(5);
        view.spec.search = "b".into();
        let lines = table_lines(&view, 40);
        assert!(line_text(&lines[9]).contains(" | Search: b | 'q': Quit"));

        view.prompt = Some(Prompt::Search("bo".into()));
        let lines = table_lines(&view, 40);
        assert_eq!(line_text(&lines[9]), "Enter search term: bo_");
    }

    #[test]
    fn control_characters_do_not_break_rows() {
        let mut view = users_view(5);
        view.page.rows[0][1] = "line\nbreak".into();
        let lines = table_lines(&view, 40);
        assert_eq!(line_text(&lines[3]), "1           line break  ");
    }

    #[test]
    fn wide_glyphs_count_double() {
        let columns = strings(&["name"]);
        assert_eq!(column_widths(&columns, &[strings(&["漢字漢字漢字"])]), vec![12]);
        assert_eq!(truncate("漢字x", 3), "漢");
        assert_eq!(truncate("漢字x", 5), "漢字x");
        assert_eq!(text_width(&pad("漢字", 10)), 12);
    }

    #[test]
    fn wide_cells_keep_columns_aligned() {
        let mut view = users_view(5);
        view.page.rows[0][0] = "漢字漢字漢字".into();
        let lines = table_lines(&view, 40);
        let header = line_text(&lines[1]);
        let row = line_text(&lines[3]);
        // the second column starts at the same terminal column in header and row
        let header_offset = text_width(&header[..header.find("name").unwrap()]);
        let row_offset = text_width(&row[..row.find("ann").unwrap()]);
        assert_eq!(header_offset, 14);
        assert_eq!(row_offset, 14);
    }

    #[test]
    fn sort_prompt_lists_columns() {
        let view = users_view(5);
        let text: Vec<String> = sort_prompt_lines(&view, "1", 40)
            .iter()
            .map(line_text)
            .collect();
        assert_eq!(text[0].trim(), "Sort by Column");
        assert_eq!(text[2], "0: id");
        assert_eq!(text[3], "1: name");
        assert_eq!(text[5], "Enter column number to sort by: 1_");
    }

    fn render(app: &App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn draws_table_list_and_table_view() {
        let mut app = App::new(fixture(), Viewport::new(60, 10)).unwrap();
        let text = render(&app, 60, 10);
        assert!(text.contains("Select a table:"));
        assert!(text.contains("items"));
        assert!(text.contains("users"));

        app.open_selected_table();
        let text = render(&app, 60, 10);
        assert!(text.contains("Table: items"));
        assert!(text.contains("item1"));
        assert!(text.contains("Showing rows 1-5 of 12"));
    }
}
