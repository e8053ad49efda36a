use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, info, warn};
use thiserror::Error;

use crate::db::{Database, DbError, Page, QuerySpec};

/// Lines reserved around the rows: title, header, rule, scroll indicator, footer.
pub const CHROME_LINES: u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn page_size(&self) -> usize {
        usize::from(self.height.saturating_sub(CHROME_LINES)).max(1)
    }
}

/// Line-based prompts that take over input until Enter or Esc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Sort(String),
    Search(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("'{0}' is not a column number")]
    NotANumber(String),
    #[error("column {index} out of range (0..{columns})")]
    OutOfRange { index: usize, columns: usize },
}

pub fn parse_sort_column(input: &str, columns: usize) -> Result<usize, InputError> {
    let index: usize = input
        .trim()
        .parse()
        .map_err(|_| InputError::NotANumber(input.to_string()))?;
    if index >= columns {
        return Err(InputError::OutOfRange { index, columns });
    }
    Ok(index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    SortPrompt,
    SearchPrompt,
    ScrollLeft,
    ScrollRight,
    SortColumnLeft,
    SortColumnRight,
    RowUp,
    RowDown,
    PageUp,
    PageDown,
}

impl Action {
    pub fn from_key(key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char(c) => match c.to_ascii_lowercase() {
                'q' => Some(Action::Quit),
                's' => Some(Action::SortPrompt),
                'f' => Some(Action::SearchPrompt),
                'h' => Some(Action::ScrollLeft),
                'l' => Some(Action::ScrollRight),
                _ => None,
            },
            KeyCode::Left => Some(Action::SortColumnLeft),
            KeyCode::Right => Some(Action::SortColumnRight),
            KeyCode::Up => Some(Action::RowUp),
            KeyCode::Down => Some(Action::RowDown),
            KeyCode::PageUp => Some(Action::PageUp),
            KeyCode::PageDown => Some(Action::PageDown),
            _ => None,
        }
    }
}

/// State of one open table. Created with defaults on entry, dropped on quit.
#[derive(Debug, Clone)]
pub struct TableView {
    pub table: String,
    pub columns: Vec<String>,
    pub spec: QuerySpec,
    pub page: Page,
    pub h_scroll: usize,
    pub prompt: Option<Prompt>,
}

impl TableView {
    pub fn new(table: String, columns: Vec<String>, page_size: usize) -> Self {
        Self {
            table,
            columns,
            spec: QuerySpec::new(page_size),
            page: Page::default(),
            h_scroll: 0,
            prompt: None,
        }
    }

    pub fn max_scroll(&self) -> usize {
        self.columns.len().saturating_sub(1)
    }

    pub fn clamp_scroll(&mut self) {
        self.h_scroll = self.h_scroll.min(self.max_scroll());
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.spec.page_size = page_size.max(1);
        self.clamp_scroll();
    }

    /// Apply one navigation action. Returns false when the view should close.
    pub fn apply(&mut self, action: Action) -> bool {
        let total = self.page.total_rows;
        let page_size = self.spec.page_size;
        match action {
            Action::Quit => return false,
            Action::SortPrompt => self.prompt = Some(Prompt::Sort(String::new())),
            Action::SearchPrompt => self.prompt = Some(Prompt::Search(String::new())),
            Action::ScrollLeft => self.h_scroll = self.h_scroll.saturating_sub(1),
            Action::ScrollRight => self.h_scroll = (self.h_scroll + 1).min(self.max_scroll()),
            Action::SortColumnLeft => {
                self.spec.sort_column = self.spec.sort_column.saturating_sub(1);
            }
            Action::SortColumnRight => {
                self.spec.sort_column =
                    (self.spec.sort_column + 1).min(self.columns.len().saturating_sub(1));
            }
            Action::RowUp => self.spec.offset = self.spec.offset.saturating_sub(1),
            Action::RowDown => {
                if self.spec.offset + page_size < total {
                    self.spec.offset += 1;
                }
            }
            Action::PageUp => self.spec.offset = self.spec.offset.saturating_sub(page_size),
            Action::PageDown => {
                self.spec.offset =
                    (self.spec.offset + page_size).min(total.saturating_sub(page_size));
            }
        }
        true
    }

    /// Same column flips the direction; a new column starts ascending.
    pub fn select_sort_column(&mut self, index: usize) {
        if index == self.spec.sort_column {
            self.spec.sort_dir = self.spec.sort_dir.toggled();
        } else {
            self.spec.sort_column = index;
            self.spec.sort_dir = Default::default();
        }
    }

    pub fn set_search(&mut self, term: String) {
        self.spec.search = term;
        self.spec.offset = 0;
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    self.commit_prompt(prompt);
                }
            }
            KeyCode::Esc => self.prompt = None,
            KeyCode::Backspace => {
                if let Some(Prompt::Sort(buf) | Prompt::Search(buf)) = self.prompt.as_mut() {
                    buf.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(Prompt::Sort(buf) | Prompt::Search(buf)) = self.prompt.as_mut() {
                    buf.push(c);
                }
            }
            _ => {}
        }
    }

    fn commit_prompt(&mut self, prompt: Prompt) {
        match prompt {
            Prompt::Sort(input) => match parse_sort_column(&input, self.columns.len()) {
                Ok(index) => self.select_sort_column(index),
                Err(e) => debug!("sort input discarded: {e}"),
            },
            Prompt::Search(term) => self.set_search(term),
        }
    }
}

pub struct App {
    pub should_quit: bool,
    pub status: String,
    pub viewport: Viewport,

    pub tables: Vec<String>,
    pub selected_table: usize,

    /// Open table; `None` means the table list is showing
    pub view: Option<TableView>,

    db: Database,
}

impl App {
    pub fn new(db: Database, viewport: Viewport) -> Result<Self, DbError> {
        let tables = db.list_tables()?;
        info!("found {} tables", tables.len());
        Ok(Self {
            should_quit: false,
            status: default_status(&tables),
            viewport,
            tables,
            selected_table: 0,
            view: None,
            db,
        })
    }

    pub fn current_table_name(&self) -> Option<&str> {
        self.tables.get(self.selected_table).map(|s| s.as_str())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.view.is_some() {
            self.handle_key_table(key);
        } else {
            self.handle_key_list(key);
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.viewport = Viewport::new(width, height);
        let page_size = self.viewport.page_size();
        let Some(view) = self.view.as_mut() else {
            return;
        };
        let before = view.spec.clone();
        view.set_page_size(page_size);
        if view.spec != before {
            self.refresh_page();
        }
    }

    fn handle_key_list(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.move_table_selection_up(),
            KeyCode::Down | KeyCode::Char('j') => self.move_table_selection_down(),
            KeyCode::Enter => self.open_selected_table(),
            _ => {}
        }
    }

    fn handle_key_table(&mut self, key: KeyEvent) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        let before = view.spec.clone();
        if view.prompt.is_some() {
            view.handle_prompt_key(key);
        } else if let Some(action) = Action::from_key(key) {
            if !view.apply(action) {
                self.close_table();
                return;
            }
        }
        if view.spec != before {
            self.refresh_page();
        }
    }

    pub fn move_table_selection_up(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        if self.selected_table == 0 {
            self.selected_table = self.tables.len() - 1;
        } else {
            self.selected_table -= 1;
        }
    }

    pub fn move_table_selection_down(&mut self) {
        if self.tables.is_empty() {
            return;
        }
        self.selected_table = (self.selected_table + 1) % self.tables.len();
    }

    pub fn open_selected_table(&mut self) {
        let Some(table) = self.current_table_name().map(|s| s.to_string()) else {
            self.status = "No tables to open".into();
            return;
        };
        let columns = match self.db.list_columns(&table) {
            Ok(columns) => columns,
            Err(e) => {
                warn!("cannot open {table}: {e}");
                self.status = format!("Error: {e}");
                self.reload_tables();
                return;
            }
        };
        info!("opening {table} ({} columns)", columns.len());
        self.view = Some(TableView::new(table, columns, self.viewport.page_size()));
        self.refresh_page();
    }

    pub fn close_table(&mut self) {
        if let Some(view) = self.view.take() {
            info!("closing {}", view.table);
        }
        self.reload_tables();
        self.status = default_status(&self.tables);
    }

    /// Re-run the query for the open table; a failure drops back to the table list.
    pub fn refresh_page(&mut self) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match self.db.fetch_page(&view.table, &view.columns, &view.spec) {
            Ok(page) => view.page = page,
            Err(e) => {
                warn!("query on {} failed: {e}", view.table);
                self.view = None;
                self.reload_tables();
                self.status = format!("Error: {e}");
            }
        }
    }

    fn reload_tables(&mut self) {
        match self.db.list_tables() {
            Ok(tables) => {
                self.tables = tables;
                if self.selected_table >= self.tables.len() {
                    self.selected_table = 0;
                }
            }
            Err(e) => {
                warn!("listing tables failed: {e}");
                self.status = format!("Error: {e}");
            }
        }
    }
}

fn default_status(tables: &[String]) -> String {
    format!(
        "{} tables | ↑/↓: Select, Enter: Open, 'q': Quit",
        tables.len()
    )
}
