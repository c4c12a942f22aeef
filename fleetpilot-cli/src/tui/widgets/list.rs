use crossterm::event::KeyCode;

/// Cursor and scroll position over a list of rows
#[derive(Debug, Clone)]
pub struct ListState {
    selected: Option<usize>,
    scroll_offset: usize,
    scroll_off: usize, // Rows from edge before scrolling (like vim scrolloff)
    wrap_around: bool,
    viewport_height: Option<usize>, // Last known viewport height from renderer
}

impl Default for ListState {
    fn default() -> Self {
        Self::new()
    }
}

impl ListState {
    pub fn new() -> Self {
        Self {
            selected: None,
            scroll_offset: 0,
            scroll_off: 3,
            wrap_around: true,
            viewport_height: None,
        }
    }

    pub fn with_selection() -> Self {
        Self {
            selected: Some(0),
            ..Self::new()
        }
    }

    pub fn with_wrap_around(mut self, wrap_around: bool) -> Self {
        self.wrap_around = wrap_around;
        self
    }

    /// Set the viewport height (called by the renderer with the actual area height)
    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = Some(height);
    }

    pub fn viewport_height(&self) -> Option<usize> {
        self.viewport_height
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Set selected index and adjust scroll so it stays visible
    pub fn select_and_scroll(&mut self, index: Option<usize>, item_count: usize) {
        self.selected = index;
        let height = self.viewport_height.unwrap_or(item_count);
        self.update_scroll(height, item_count);
    }

    /// Keep the cursor inside `0..item_count` after the list changed
    pub fn clamp(&mut self, item_count: usize) {
        self.selected = match (self.selected, item_count) {
            (_, 0) => None,
            (Some(sel), count) => Some(sel.min(count - 1)),
            (None, _) => Some(0),
        };
        let height = self.viewport_height.unwrap_or(item_count);
        self.update_scroll(height, item_count);
    }

    /// Handle a navigation key, returns true if handled
    pub fn handle_key(&mut self, key: KeyCode, item_count: usize, visible_height: usize) -> bool {
        if item_count == 0 {
            return false;
        }
        if !matches!(
            key,
            KeyCode::Up | KeyCode::Down | KeyCode::PageUp | KeyCode::PageDown | KeyCode::Home | KeyCode::End
        ) {
            return false;
        }
        let height = self.viewport_height.unwrap_or(visible_height).max(1);

        let last = item_count - 1;
        let next = match (key, self.selected) {
            (_, None) => 0,
            (KeyCode::Up, Some(0)) if self.wrap_around => last,
            (KeyCode::Up, Some(sel)) => sel.saturating_sub(1),
            (KeyCode::Down, Some(sel)) if sel >= last && self.wrap_around => 0,
            (KeyCode::Down, Some(sel)) => (sel + 1).min(last),
            (KeyCode::PageUp, Some(sel)) => sel.saturating_sub(height),
            (KeyCode::PageDown, Some(sel)) => (sel + height).min(last),
            (KeyCode::Home, Some(_)) => 0,
            (_, Some(_)) => last,
        };
        self.selected = Some(next);
        self.update_scroll(height, item_count);
        true
    }

    /// Update scroll offset so the selection keeps `scroll_off` rows of context
    pub fn update_scroll(&mut self, visible_height: usize, item_count: usize) {
        if let Some(sel) = self.selected {
            let min_scroll = sel.saturating_sub(visible_height.saturating_sub(self.scroll_off + 1));
            let max_scroll = sel.saturating_sub(self.scroll_off);

            if self.scroll_offset < min_scroll {
                self.scroll_offset = min_scroll;
            } else if self.scroll_offset > max_scroll {
                self.scroll_offset = max_scroll;
            }
        }
        let max_offset = item_count.saturating_sub(visible_height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
    }
}
