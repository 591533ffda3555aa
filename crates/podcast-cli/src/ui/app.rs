use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event as CEvent, KeyCode, KeyEvent,
        KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use podcast_player::{MediaHandle, NativeMedia, PlaybackController};
use podcast_types::{Chapter, Episode, PlaybackPhase};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Position, Rect},
    widgets::ListState,
};

use crate::catalog::{self, Catalog, SortOrder};
use crate::config::Settings;

use super::render;

/// Keyboard volume step.
const VOLUME_STEP: f32 = 0.05;

/// Launch the TUI over `catalog` and drive the event loop until quit.
pub(crate) fn run_tui(catalog: Catalog, settings: Settings, log_rx: Receiver<String>) -> Result<()> {
    let playback = settings.playback.clone();
    let mut app = App::new(
        catalog,
        settings,
        log_rx,
        Box::new(move || NativeMedia::spawn(playback.clone())),
    );

    let mut term = init_terminal()?;
    let result = ui_loop(&mut term, &mut app);

    restore_terminal(&mut term)?;
    result
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Focus {
    Episodes,
    Chapters,
}

/// Clickable controls in the player panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Button {
    SkipBack,
    PlayPause,
    SkipForward,
    Rate,
    Mute,
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Drag {
    Progress,
    Volume,
}

/// Screen areas recorded by the last draw, used for mouse hit-testing.
#[derive(Clone, Debug, Default)]
pub(crate) struct HitAreas {
    /// Rows of the episode list (inside the border).
    pub(crate) episodes: Option<Rect>,
    pub(crate) chapters: Option<Rect>,
    pub(crate) progress: Option<Rect>,
    pub(crate) volume: Option<Rect>,
    pub(crate) buttons: Vec<(Rect, Button)>,
}

/// In-memory UI state for rendering + interaction.
pub(crate) struct App<M: MediaHandle> {
    pub(crate) catalog: Catalog,
    pub(crate) settings: Settings,

    pub(crate) query: String,
    pub(crate) searching: bool,
    pub(crate) sort: SortOrder,
    /// Catalog positions of the episodes shown, in display order.
    pub(crate) visible: Vec<usize>,
    pub(crate) list_state: ListState,
    pub(crate) chapters: Vec<Chapter>,
    pub(crate) chapter_state: ListState,
    pub(crate) focus: Focus,

    pub(crate) player: Option<PlaybackController<M>>,
    /// Progress fraction shown while the seek bar is being dragged.
    pub(crate) seek_preview: Option<f64>,
    pub(crate) hits: HitAreas,
    drag: Option<Drag>,
    /// Volume carried over to the next mounted episode.
    volume: f32,
    last_error: Option<String>,
    spare_media: Option<M>,
    new_media: Box<dyn FnMut() -> M>,

    pub(crate) status: String,
    pub(crate) help_open: bool,
    pub(crate) logs_open: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) logs_scroll: usize,
    last_status_snapshot: String,
    log_rx: Receiver<String>,
    pub(crate) list_view_height: usize,
}

impl<M: MediaHandle> App<M> {
    pub(crate) fn new(
        catalog: Catalog,
        settings: Settings,
        log_rx: Receiver<String>,
        new_media: Box<dyn FnMut() -> M>,
    ) -> Self {
        let volume = settings.volume;
        let mut app = Self {
            catalog,
            settings,
            query: String::new(),
            searching: false,
            sort: SortOrder::default(),
            visible: Vec::new(),
            list_state: ListState::default(),
            chapters: Vec::new(),
            chapter_state: ListState::default(),
            focus: Focus::Episodes,
            player: None,
            seek_preview: None,
            hits: HitAreas::default(),
            drag: None,
            volume,
            last_error: None,
            spare_media: None,
            new_media,
            status: "Ready".into(),
            help_open: false,
            logs_open: false,
            logs: VecDeque::new(),
            logs_scroll: 0,
            last_status_snapshot: String::new(),
            log_rx,
            list_view_height: 0,
        };
        app.refilter();
        app
    }

    fn selected_catalog_index(&self) -> Option<usize> {
        self.list_state
            .selected()
            .and_then(|i| self.visible.get(i).copied())
    }

    pub(crate) fn selected_episode(&self) -> Option<&Episode> {
        self.selected_catalog_index()
            .and_then(|i| self.catalog.episodes().get(i))
    }

    /// Volume shown in the player panel.
    pub(crate) fn volume(&self) -> f32 {
        self.player
            .as_ref()
            .map(|p| p.state().volume)
            .unwrap_or(self.volume)
    }

    /// Recompute the visible list, keeping the selected episode when it survives.
    fn refilter(&mut self) {
        let keep = self.selected_catalog_index();
        self.visible = self.catalog.query_indices(&self.query, self.sort);
        let selected = keep
            .and_then(|k| self.visible.iter().position(|&i| i == k))
            .or_else(|| (!self.visible.is_empty()).then_some(0));
        self.list_state.select(selected);
        self.refresh_chapters();
    }

    fn refresh_chapters(&mut self) {
        self.chapters = self
            .selected_episode()
            .map(|e| catalog::chapters(&e.description))
            .unwrap_or_default();
        self.chapter_state = ListState::default();
        if self.chapters.is_empty() {
            self.focus = Focus::Episodes;
        } else {
            self.chapter_state.select(Some(0));
        }
    }

    fn move_selection(&mut self, delta: isize) {
        match self.focus {
            Focus::Episodes => {
                if let Some(i) = step(self.list_state.selected(), self.visible.len(), delta) {
                    if self.list_state.selected() != Some(i) {
                        self.list_state.select(Some(i));
                        self.refresh_chapters();
                    }
                }
            }
            Focus::Chapters => {
                if let Some(i) = step(self.chapter_state.selected(), self.chapters.len(), delta) {
                    self.chapter_state.select(Some(i));
                }
            }
        }
    }

    fn page_step(&self) -> isize {
        self.list_view_height.max(1) as isize
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Episodes if !self.chapters.is_empty() => Focus::Chapters,
            _ => Focus::Episodes,
        };
    }

    fn cycle_sort(&mut self) {
        self.sort = self.sort.next();
        self.refilter();
        self.status = format!("Sorted by {}", self.sort.label());
    }

    fn start_search(&mut self) {
        self.searching = true;
        self.focus = Focus::Episodes;
    }

    /// Leave search mode; `keep` false also clears the query.
    fn finish_search(&mut self, keep: bool) {
        self.searching = false;
        if !keep && !self.query.is_empty() {
            self.query.clear();
            self.refilter();
        }
        if keep {
            self.status = format!("{} episodes match {:?}", self.visible.len(), self.query);
        }
    }

    fn activate(&mut self) {
        match self.focus {
            Focus::Episodes => self.mount_selected(),
            Focus::Chapters => self.play_chapter(),
        }
    }

    /// Mount the selected episode in the player. No autoplay.
    fn mount_selected(&mut self) {
        let Some(episode) = self.selected_episode().cloned() else {
            return;
        };
        if self
            .player
            .as_ref()
            .is_some_and(|p| p.episode().eid == episode.eid)
        {
            return;
        }
        self.close_player();

        let media = match self.spare_media.take() {
            Some(media) => media,
            None => (self.new_media)(),
        };
        let mut player = PlaybackController::new(episode);
        player.set_volume(self.volume);
        player.attach(media);

        self.last_error = player.state().last_error.clone();
        self.status = match &self.last_error {
            Some(err) => format!("Error: {err}"),
            None => format!("Loading {}", player.episode().title),
        };
        self.player = Some(player);
    }

    /// Unmount the player; its listener is removed and playback stopped.
    fn close_player(&mut self) {
        let Some(player) = self.player.take() else {
            return;
        };
        self.volume = player.state().volume;
        self.status = format!("Closed {}", player.episode().title);
        match serde_json::to_string(&player.status()) {
            Ok(snapshot) => tracing::debug!(status = %snapshot, "player closed"),
            Err(e) => tracing::warn!("encode player status: {e}"),
        }
        self.spare_media = player.close();
        self.seek_preview = None;
        self.drag = None;
        self.last_error = None;
    }

    /// Seek to the selected chapter and play, mounting its episode if needed.
    fn play_chapter(&mut self) {
        let Some(chapter) = self
            .chapter_state
            .selected()
            .and_then(|i| self.chapters.get(i))
            .cloned()
        else {
            return;
        };
        self.mount_selected();
        let Some(player) = self.player.as_mut() else {
            return;
        };
        player.seek_to_time(f64::from(chapter.seconds));
        if !player.state().is_playing {
            player.toggle_play();
        }
        self.status = format!("{} {}", chapter.time, chapter.text);
    }

    fn with_player(&mut self, f: impl FnOnce(&mut PlaybackController<M>) -> String) {
        match self.player.as_mut() {
            Some(player) => self.status = f(player),
            None => self.status = "No episode loaded (Enter to open)".into(),
        }
    }

    fn toggle_play(&mut self) {
        self.with_player(|p| {
            p.toggle_play();
            if p.state().is_playing {
                format!("Playing {}", p.episode().title)
            } else {
                "Paused".to_string()
            }
        });
    }

    fn skip(&mut self, delta: f64) {
        self.with_player(|p| {
            p.skip(delta);
            format!("At {}", catalog::format_clock(p.state().current_time))
        });
    }

    fn cycle_rate(&mut self) {
        self.with_player(|p| format!("Speed {}", p.cycle_playback_rate()));
    }

    fn toggle_mute(&mut self) {
        self.with_player(|p| {
            p.toggle_mute();
            let label = if p.state().muted { "Muted" } else { "Unmuted" };
            label.to_string()
        });
    }

    fn change_volume(&mut self, delta: f32) {
        self.set_volume(self.volume() + delta);
    }

    /// Set the level in steps of 0.01; zero mutes.
    fn set_volume(&mut self, level: f32) {
        let level = ((level.clamp(0.0, 1.0) * 100.0).round() / 100.0).clamp(0.0, 1.0);
        self.volume = level;
        if let Some(player) = self.player.as_mut() {
            player.set_volume(level);
        }
        self.status = format!("Volume {:.0}%", level * 100.0);
    }

    fn press(&mut self, button: Button) {
        match button {
            Button::SkipBack => self.skip(-self.settings.skip_back_secs),
            Button::PlayPause => self.toggle_play(),
            Button::SkipForward => self.skip(self.settings.skip_forward_secs),
            Button::Rate => self.cycle_rate(),
            Button::Mute => self.toggle_mute(),
            Button::Close => self.close_player(),
        }
    }

    /// Apply backend events to the mounted player and surface phase changes.
    pub(crate) fn pump_player(&mut self) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        let before = player.state().phase;
        if player.pump() == 0 {
            return;
        }
        let state = player.state();
        let title = &player.episode().title;
        if state.last_error != self.last_error {
            if let Some(err) = &state.last_error {
                self.status = format!("Error: {err}");
            }
            self.last_error = state.last_error.clone();
        } else if state.phase != before {
            match state.phase {
                PlaybackPhase::Ended => self.status = format!("Finished {title}"),
                PlaybackPhase::ReadyPlaying => self.status = format!("Playing {title}"),
                PlaybackPhase::ReadyPaused => self.status = format!("Ready {title}"),
                _ => {}
            }
        }
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return false;
        }
        if self.logs_open {
            match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Char('l') => self.toggle_logs(),
                KeyCode::Up => self.scroll_logs_up(),
                KeyCode::Down => self.scroll_logs_down(),
                _ => {}
            }
            return false;
        }
        if self.help_open {
            match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('?') => self.help_open = false,
                _ => {}
            }
            return false;
        }
        if self.searching {
            match key.code {
                KeyCode::Esc => self.finish_search(false),
                KeyCode::Enter => self.finish_search(true),
                KeyCode::Backspace => {
                    self.query.pop();
                    self.refilter();
                }
                KeyCode::Char(c) => {
                    self.query.push(c);
                    self.refilter();
                }
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-self.page_step()),
            KeyCode::PageDown => self.move_selection(self.page_step()),
            KeyCode::Tab => self.toggle_focus(),
            KeyCode::Enter => self.activate(),
            KeyCode::Char(' ') => self.toggle_play(),
            KeyCode::Left => self.skip(-self.settings.skip_back_secs),
            KeyCode::Right => self.skip(self.settings.skip_forward_secs),
            KeyCode::Char('r') => self.cycle_rate(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.change_volume(VOLUME_STEP),
            KeyCode::Char('-') => self.change_volume(-VOLUME_STEP),
            KeyCode::Char('m') => self.toggle_mute(),
            KeyCode::Char('/') => self.start_search(),
            KeyCode::Char('s') => self.cycle_sort(),
            KeyCode::Char('x') | KeyCode::Esc => self.close_player(),
            KeyCode::Char('l') => self.toggle_logs(),
            KeyCode::Char('h') | KeyCode::Char('?') => self.help_open = true,
            _ => {}
        }
        false
    }

    pub(crate) fn handle_mouse(&mut self, ev: MouseEvent) {
        if self.help_open || self.logs_open {
            return;
        }
        let at = Position::new(ev.column, ev.row);
        match ev.kind {
            MouseEventKind::Down(MouseButton::Left) => self.mouse_down(at),
            MouseEventKind::Drag(MouseButton::Left) => self.mouse_drag(at.x),
            MouseEventKind::Up(MouseButton::Left) => self.mouse_up(at.x),
            MouseEventKind::ScrollDown => self.move_selection(1),
            MouseEventKind::ScrollUp => self.move_selection(-1),
            _ => {}
        }
    }

    fn mouse_down(&mut self, at: Position) {
        if let Some(area) = self.hits.progress.filter(|a| a.contains(at)) {
            let seekable = self
                .player
                .as_ref()
                .is_some_and(|p| p.state().duration_known());
            if seekable {
                self.drag = Some(Drag::Progress);
                self.seek_preview = fraction_at(area, at.x);
            }
            return;
        }
        if let Some(area) = self.hits.volume.filter(|a| a.contains(at)) {
            self.drag = Some(Drag::Volume);
            if let Some(fraction) = fraction_at(area, at.x) {
                self.set_volume(fraction as f32);
            }
            return;
        }
        let button = self
            .hits
            .buttons
            .iter()
            .find(|(rect, _)| rect.contains(at))
            .map(|(_, b)| *b);
        if let Some(button) = button {
            self.press(button);
            return;
        }
        if let Some(area) = self.hits.episodes.filter(|a| a.contains(at)) {
            let row = usize::from(at.y - area.y) + self.list_state.offset();
            if row < self.visible.len() {
                self.focus = Focus::Episodes;
                if self.list_state.selected() == Some(row) {
                    self.mount_selected();
                } else {
                    self.list_state.select(Some(row));
                    self.refresh_chapters();
                }
            }
            return;
        }
        if let Some(area) = self.hits.chapters.filter(|a| a.contains(at)) {
            let row = usize::from(at.y - area.y) + self.chapter_state.offset();
            if row < self.chapters.len() {
                self.focus = Focus::Chapters;
                if self.chapter_state.selected() == Some(row) {
                    self.play_chapter();
                } else {
                    self.chapter_state.select(Some(row));
                }
            }
        }
    }

    fn mouse_drag(&mut self, column: u16) {
        match self.drag {
            Some(Drag::Progress) => {
                if let Some(area) = self.hits.progress {
                    self.seek_preview = Some(fraction_clamped(area, column));
                }
            }
            Some(Drag::Volume) => {
                if let Some(area) = self.hits.volume {
                    self.set_volume(fraction_clamped(area, column) as f32);
                }
            }
            None => {}
        }
    }

    fn mouse_up(&mut self, column: u16) {
        let drag = self.drag.take();
        if drag != Some(Drag::Progress) {
            return;
        }
        let fraction = match (self.seek_preview.take(), self.hits.progress) {
            (Some(f), _) => f,
            (None, Some(area)) => fraction_clamped(area, column),
            (None, None) => return,
        };
        self.with_player(|p| {
            p.seek_to(fraction);
            format!("Seek to {}", catalog::format_clock(p.state().current_time))
        });
    }

    fn toggle_logs(&mut self) {
        self.logs_open = !self.logs_open;
        if !self.logs_open {
            self.logs_scroll = 0;
        }
    }

    fn scroll_logs_up(&mut self) {
        let max = self.logs.len().saturating_sub(1);
        self.logs_scroll = (self.logs_scroll + 1).min(max);
    }

    fn scroll_logs_down(&mut self) {
        self.logs_scroll = self.logs_scroll.saturating_sub(1);
    }

    fn push_log_line(&mut self, line: String) {
        const LOG_CAP: usize = 500;
        if self.logs.len() >= LOG_CAP {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    fn note_status_change(&mut self) {
        if self.last_status_snapshot == self.status {
            return;
        }
        let line = self.status.clone();
        self.last_status_snapshot = self.status.clone();
        self.push_log_line(line);
    }

    fn drain_logs(&mut self) {
        while let Ok(line) = self.log_rx.try_recv() {
            self.push_log_line(line);
        }
    }
}

/// Fraction of `area`'s width at `column`, or `None` outside it.
pub(crate) fn fraction_at(area: Rect, column: u16) -> Option<f64> {
    if area.width == 0 || column < area.x || column >= area.right() {
        return None;
    }
    Some(f64::from(column - area.x) / f64::from(area.width))
}

/// Like [`fraction_at`], pinned to `[0, 1]` when the pointer leaves the area.
fn fraction_clamped(area: Rect, column: u16) -> f64 {
    if column >= area.right() {
        1.0
    } else {
        fraction_at(area, column).unwrap_or(0.0)
    }
}

fn step(current: Option<usize>, len: usize, delta: isize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let i = current.unwrap_or(0) as isize + delta;
    Some(i.clamp(0, len as isize - 1) as usize)
}

fn ui_loop<M: MediaHandle>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App<M>,
) -> Result<()> {
    let tick = Duration::from_millis(33);
    let mut last_tick = Instant::now();

    loop {
        app.pump_player();
        app.drain_logs();
        terminal.draw(|f| render::draw(f, app))?;

        let timeout = tick.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("poll terminal events")? {
            match event::read().context("read terminal event")? {
                CEvent::Key(k) => {
                    if app.handle_key(k) {
                        return Ok(());
                    }
                }
                CEvent::Mouse(m) => app.handle_mouse(m),
                _ => {}
            }
        }

        app.note_status_change();

        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
        }
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use crossterm::event::KeyModifiers;
    use podcast_player::MediaEvent;
    use podcast_player::media::{ListenerId, Listeners, Subscription};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct TestMedia {
        listeners: Arc<Listeners>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl TestMedia {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn called(&self, call: &str) -> bool {
            self.calls.lock().unwrap().iter().any(|c| c == call)
        }
    }

    impl MediaHandle for TestMedia {
        fn load(&mut self, source: &str, _mime: Option<&str>) {
            self.record(format!("load {source}"));
        }
        fn play(&mut self) {
            self.record("play".into());
        }
        fn pause(&mut self) {
            self.record("pause".into());
        }
        fn stop(&mut self) {
            self.record("stop".into());
        }
        fn set_position(&mut self, seconds: f64) {
            self.record(format!("position {seconds}"));
        }
        fn set_rate(&mut self, rate: f64) {
            self.record(format!("rate {rate}"));
        }
        fn set_volume(&mut self, volume: f32) {
            self.record(format!("volume {volume}"));
        }
        fn set_muted(&mut self, muted: bool) {
            self.record(format!("muted {muted}"));
        }
        fn subscribe(&mut self) -> Subscription {
            self.listeners.subscribe()
        }
        fn unsubscribe(&mut self, id: ListenerId) {
            self.record("unsubscribe".into());
            self.listeners.unsubscribe(id);
        }
    }

    const CATALOG: &str = r#"{
        "title": "Night Shift",
        "author": "Ada",
        "episodes": [
            {
                "eid": "a",
                "title": "Coffee and Code",
                "description": "Talk about tools.\n00:00 Hello\n12:30 Rust talk",
                "enclosure": { "url": "https://cdn.example/a.mp3", "duration": 600 },
                "pubDate": "2024-03-01T08:00:00.000Z",
                "playCount": 90
            },
            {
                "eid": "b",
                "title": "Late Trains",
                "description": "No chapters here.",
                "enclosure": { "url": "https://cdn.example/b.mp3", "duration": 1200 },
                "pubDate": "2024-05-01T08:00:00.000Z",
                "playCount": 5
            }
        ]
    }"#;

    fn app() -> (App<TestMedia>, TestMedia) {
        let media = TestMedia::default();
        let shared = media.clone();
        let (_log_tx, log_rx) = unbounded::<String>();
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let app = App::new(
            catalog,
            Settings::default(),
            log_rx,
            Box::new(move || shared.clone()),
        );
        (app, media)
    }

    fn key(app: &mut App<TestMedia>, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn mouse(app: &mut App<TestMedia>, kind: MouseEventKind, column: u16, row: u16) {
        app.handle_mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        });
    }

    /// Mount episode "a" (second in latest-first order) and deliver its metadata.
    fn mounted(duration: f64) -> (App<TestMedia>, TestMedia) {
        let (mut app, media) = app();
        key(&mut app, KeyCode::Down);
        key(&mut app, KeyCode::Enter);
        media.listeners.emit(MediaEvent::MetadataLoaded {
            duration: Some(duration),
        });
        app.pump_player();
        (app, media)
    }

    fn player(app: &App<TestMedia>) -> &PlaybackController<TestMedia> {
        app.player.as_ref().unwrap()
    }

    #[test]
    fn starts_latest_first_with_chapters_of_selection() {
        let (app, _) = app();
        let titles: Vec<&str> = app
            .visible
            .iter()
            .map(|&i| app.catalog.episodes()[i].title.as_str())
            .collect();
        assert_eq!(titles, vec!["Late Trains", "Coffee and Code"]);
        assert!(app.chapters.is_empty());
        assert!(app.player.is_none());
    }

    #[test]
    fn search_filters_and_escape_clears() {
        let (mut app, _) = app();
        key(&mut app, KeyCode::Char('/'));
        for c in "rust".chars() {
            key(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.visible.len(), 1);
        assert_eq!(app.selected_episode().unwrap().eid, "a");
        assert_eq!(app.chapters.len(), 2);

        key(&mut app, KeyCode::Esc);
        assert!(!app.searching);
        assert!(app.query.is_empty());
        assert_eq!(app.visible.len(), 2);
        assert_eq!(app.selected_episode().unwrap().eid, "a");
    }

    #[test]
    fn sort_key_cycles_to_popular() {
        let (mut app, _) = app();
        key(&mut app, KeyCode::Char('s'));
        assert_eq!(app.sort, SortOrder::Popular);
        assert_eq!(app.catalog.episodes()[app.visible[0]].eid, "a");
    }

    #[test]
    fn enter_mounts_selected_episode_without_autoplay() {
        let (app, media) = mounted(600.0);
        let p = player(&app);
        assert_eq!(p.episode().eid, "a");
        assert_eq!(p.state().phase, PlaybackPhase::ReadyPaused);
        assert!(!p.state().is_playing);
        assert!(media.called("load https://cdn.example/a.mp3"));
        assert!(!media.called("play"));
    }

    #[test]
    fn clicking_middle_of_progress_bar_seeks_to_half() {
        let (mut app, media) = mounted(600.0);
        app.hits.progress = Some(Rect::new(10, 20, 40, 1));
        mouse(&mut app, MouseEventKind::Down(MouseButton::Left), 30, 20);
        assert_eq!(app.seek_preview, Some(0.5));
        mouse(&mut app, MouseEventKind::Up(MouseButton::Left), 30, 20);

        let p = player(&app);
        assert_eq!(p.state().current_time, 300.0);
        assert_eq!(p.progress_percent(), 50.0);
        assert!(media.called("position 300"));
        assert!(app.seek_preview.is_none());
    }

    #[test]
    fn dragging_past_the_bar_end_seeks_to_end() {
        let (mut app, _) = mounted(600.0);
        app.hits.progress = Some(Rect::new(10, 20, 40, 1));
        mouse(&mut app, MouseEventKind::Down(MouseButton::Left), 10, 20);
        mouse(&mut app, MouseEventKind::Drag(MouseButton::Left), 70, 21);
        assert_eq!(app.seek_preview, Some(1.0));
        mouse(&mut app, MouseEventKind::Up(MouseButton::Left), 70, 21);
        assert_eq!(player(&app).state().current_time, 600.0);
    }

    #[test]
    fn progress_click_is_ignored_until_duration_known() {
        let (mut app, media) = app();
        key(&mut app, KeyCode::Enter);
        app.hits.progress = Some(Rect::new(0, 0, 10, 1));
        mouse(&mut app, MouseEventKind::Down(MouseButton::Left), 5, 0);
        mouse(&mut app, MouseEventKind::Up(MouseButton::Left), 5, 0);
        assert!(app.seek_preview.is_none());
        assert!(!media.calls.lock().unwrap().iter().any(|c| c.starts_with("position")));
    }

    #[test]
    fn clicking_volume_bar_sets_level_and_zero_mutes() {
        let (mut app, _) = mounted(600.0);
        app.hits.volume = Some(Rect::new(0, 30, 20, 1));
        mouse(&mut app, MouseEventKind::Down(MouseButton::Left), 5, 30);
        mouse(&mut app, MouseEventKind::Up(MouseButton::Left), 5, 30);
        assert_eq!(player(&app).state().volume, 0.25);
        assert!(!player(&app).state().muted);

        mouse(&mut app, MouseEventKind::Down(MouseButton::Left), 0, 30);
        assert_eq!(player(&app).state().volume, 0.0);
        assert!(player(&app).state().muted);
    }

    #[test]
    fn arrow_keys_skip_back_and_forward() {
        let (mut app, _) = mounted(600.0);
        key(&mut app, KeyCode::Right);
        assert_eq!(player(&app).state().current_time, 30.0);
        key(&mut app, KeyCode::Left);
        assert_eq!(player(&app).state().current_time, 15.0);
        key(&mut app, KeyCode::Left);
        assert_eq!(player(&app).state().current_time, 0.0);
    }

    #[test]
    fn buttons_dispatch_transport_actions() {
        let (mut app, media) = mounted(600.0);
        app.hits.buttons = vec![
            (Rect::new(0, 10, 6, 1), Button::PlayPause),
            (Rect::new(7, 10, 6, 1), Button::Rate),
        ];
        mouse(&mut app, MouseEventKind::Down(MouseButton::Left), 2, 10);
        assert!(player(&app).state().is_playing);
        assert!(media.called("play"));
        mouse(&mut app, MouseEventKind::Down(MouseButton::Left), 8, 10);
        assert_eq!(player(&app).state().rate.as_f64(), 1.25);
    }

    #[test]
    fn chapter_enter_seeks_and_plays() {
        let (mut app, media) = app();
        key(&mut app, KeyCode::Down);
        key(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::Chapters);
        key(&mut app, KeyCode::Down);
        key(&mut app, KeyCode::Enter);

        let p = player(&app);
        assert_eq!(p.episode().eid, "a");
        assert!(p.state().is_playing);
        assert_eq!(p.state().current_time, 750.0);
        assert!(media.called("position 750"));
    }

    #[test]
    fn close_unmounts_and_keeps_volume_for_next_episode() {
        let (mut app, media) = mounted(600.0);
        key(&mut app, KeyCode::Char('-'));
        key(&mut app, KeyCode::Char('x'));
        assert!(app.player.is_none());
        assert!(media.called("unsubscribe"));
        assert!(media.called("stop"));
        assert!(media.listeners.is_empty());

        key(&mut app, KeyCode::Up);
        key(&mut app, KeyCode::Enter);
        assert_eq!(player(&app).episode().eid, "b");
        assert_eq!(player(&app).state().volume, 0.95);
    }

    #[test]
    fn backend_error_surfaces_in_status() {
        let (mut app, media) = mounted(600.0);
        media
            .listeners
            .emit(MediaEvent::Error("device unplugged".to_string()));
        app.pump_player();
        assert_eq!(app.status, "Error: device unplugged");
    }

    #[test]
    fn transport_keys_without_player_only_update_status() {
        let (mut app, media) = app();
        key(&mut app, KeyCode::Char(' '));
        assert!(app.status.starts_with("No episode loaded"));
        assert!(media.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn q_quits_even_from_help() {
        let (mut app, _) = app();
        assert!(!key(&mut app, KeyCode::Char('?')));
        assert!(app.help_open);
        assert!(key(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn status_changes_are_logged_once() {
        let (mut app, _) = app();
        app.status = "Paused".into();
        app.note_status_change();
        app.note_status_change();
        assert_eq!(app.logs.iter().filter(|l| *l == "Paused").count(), 1);
    }

    #[test]
    fn fraction_at_maps_columns_inside_area() {
        let area = Rect::new(10, 0, 40, 1);
        assert_eq!(fraction_at(area, 10), Some(0.0));
        assert_eq!(fraction_at(area, 30), Some(0.5));
        assert_eq!(fraction_at(area, 9), None);
        assert_eq!(fraction_at(area, 50), None);
        assert_eq!(fraction_at(Rect::new(0, 0, 0, 1), 0), None);
        assert_eq!(fraction_clamped(area, 200), 1.0);
        assert_eq!(fraction_clamped(area, 0), 0.0);
    }
}
