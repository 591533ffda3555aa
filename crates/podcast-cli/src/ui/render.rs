use podcast_player::MediaHandle;
use podcast_types::{Episode, PlaybackPhase};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
};
use time::OffsetDateTime;

use crate::catalog::{self, SHORT_DESCRIPTION_CHARS};

use super::app::{App, Button, Focus, HitAreas};

pub(crate) fn draw<M: MediaHandle>(f: &mut ratatui::Frame, app: &mut App<M>) {
    app.hits = HitAreas::default();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(7),
            Constraint::Length(4),
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);

    let mid_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);
    draw_episodes(f, app, mid_chunks[0]);
    draw_detail(f, app, mid_chunks[1]);
    draw_player(f, app, chunks[2]);
    draw_footer(f, app, chunks[3]);

    if app.help_open {
        draw_help(f);
    }
    if app.logs_open {
        draw_logs(f, app);
    }
}

fn draw_header<M: MediaHandle>(f: &mut ratatui::Frame, app: &App<M>, area: Rect) {
    let podcast = &app.catalog.podcast;
    let mut parts = vec![podcast.title.clone()];
    if !podcast.author.is_empty() {
        parts.push(format!("by {}", podcast.author));
    }
    let count = if podcast.episode_count > 0 {
        podcast.episode_count as usize
    } else {
        podcast.episodes.len()
    };
    parts.push(format!("{count} episodes"));
    if podcast.subscription_count > 0 {
        parts.push(format!("{} subscribers", podcast.subscription_count));
    }
    let header = Paragraph::new(Line::from(parts.join("  |  ")))
        .block(Block::default().borders(Borders::ALL).title("Podcast"));
    f.render_widget(header, area);
}

fn draw_episodes<M: MediaHandle>(f: &mut ratatui::Frame, app: &mut App<M>, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let search_style = if app.searching {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let cursor = if app.searching { "_" } else { "" };
    let search_text = if app.query.is_empty() && !app.searching {
        "/ to search".to_string()
    } else {
        format!("{}{cursor}", app.query)
    };
    let search = Paragraph::new(Line::from(search_text)).style(search_style).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Search  |  sort: {} (s)", app.sort.label())),
    );
    f.render_widget(search, parts[0]);

    let now = OffsetDateTime::now_utc();
    let mounted = app.player.as_ref().map(|p| p.episode().eid.clone());
    let list_block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Episodes ({})", app.visible.len()));
    let inner = list_block.inner(parts[1]);
    let width = inner.width.saturating_sub(2) as usize;
    let episodes = app.catalog.episodes();

    let items: Vec<ListItem> = if app.visible.is_empty() {
        vec![ListItem::new("<no matching episodes>")]
    } else {
        app.visible
            .iter()
            .filter_map(|&i| episodes.get(i))
            .map(|ep| {
                let tag = if mounted.as_deref() == Some(ep.eid.as_str()) {
                    "  [loaded]"
                } else {
                    ""
                };
                let meta = episode_meta(ep, now);
                let title_width = width.saturating_sub(meta.chars().count() + tag.len() + 2);
                let label = format!(
                    "{:<title_width$}  {meta}{tag}",
                    truncate_label(&ep.title, title_width)
                );
                ListItem::new(label)
            })
            .collect()
    };

    app.list_view_height = inner.height as usize;
    app.hits.episodes = Some(inner);
    let mut list = List::new(items)
        .block(list_block)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));
    if app.focus == Focus::Episodes {
        list = list.highlight_symbol("▶ ");
    }
    f.render_stateful_widget(list, parts[1], &mut app.list_state);
}

/// `30:00 · 2 days ago · 12 plays`
fn episode_meta(ep: &Episode, now: OffsetDateTime) -> String {
    let mut parts = Vec::new();
    if let Some(d) = ep.duration_hint() {
        parts.push(catalog::format_clock(d));
    }
    if let Some(published) = catalog::published_at(ep) {
        parts.push(catalog::relative_date(published, now));
    }
    if let Some(plays) = ep.play_count {
        parts.push(format!("{plays} plays"));
    }
    parts.join(" · ")
}

fn draw_detail<M: MediaHandle>(f: &mut ratatui::Frame, app: &mut App<M>, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let detail_lines = match app.selected_episode() {
        Some(ep) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    ep.title.clone(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
            ];
            let mut facts = Vec::new();
            if let Some(d) = ep.duration_hint() {
                facts.push(catalog::format_duration_long(d));
            }
            if let Some(date) = ep.pub_date.as_deref() {
                facts.push(date.chars().take(10).collect());
            }
            if let Some(n) = ep.comment_count {
                facts.push(format!("{n} comments"));
            }
            if !facts.is_empty() {
                lines.push(Line::from(facts.join("  |  ")));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(catalog::short_description(
                &ep.description,
                SHORT_DESCRIPTION_CHARS,
            )));
            lines
        }
        None => vec![Line::from("-")],
    };
    let detail = Paragraph::new(detail_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Episode"));
    f.render_widget(detail, parts[0]);

    let items: Vec<ListItem> = if app.chapters.is_empty() {
        vec![ListItem::new("<no chapters>")]
    } else {
        app.chapters
            .iter()
            .map(|ch| ListItem::new(format!("{:>5}  {}", ch.time, ch.text)))
            .collect()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Chapters (Tab, Enter to play)");
    if !app.chapters.is_empty() {
        app.hits.chapters = Some(block.inner(parts[1]));
    }
    let mut list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));
    if app.focus == Focus::Chapters {
        list = list.highlight_symbol("▶ ");
    }
    f.render_stateful_widget(list, parts[1], &mut app.chapter_state);
}

fn draw_player<M: MediaHandle>(f: &mut ratatui::Frame, app: &mut App<M>, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Player");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(player) = app.player.as_ref() else {
        f.render_widget(
            Paragraph::new("No episode loaded. Select one and press Enter.")
                .alignment(Alignment::Center),
            inner,
        );
        return;
    };
    let state = player.state();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let phase = match state.phase {
        PlaybackPhase::Unloaded => "unloaded",
        PlaybackPhase::Loading if state.is_playing => "loading, will play",
        PlaybackPhase::Loading => "loading",
        PlaybackPhase::ReadyPaused => "paused",
        PlaybackPhase::ReadyPlaying => "playing",
        PlaybackPhase::Ended => "ended",
    };
    let mut title = vec![
        Span::styled(
            player.episode().title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("  [{phase}]")),
    ];
    if let Some(err) = state.last_error.as_deref() {
        title.push(Span::styled(
            format!("  error: {err}"),
            Style::default().fg(Color::Red),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(title)), rows[0]);

    let skip_back = format!("[<< {}s]", app.settings.skip_back_secs.round());
    let skip_forward = format!("[{}s >>]", app.settings.skip_forward_secs.round());
    let play = if state.is_playing { "[ Pause ]" } else { "[ Play ]" };
    let rate = format!("[ {} ]", state.rate);
    let mute = if state.muted { "[ Unmute ]" } else { "[ Mute ]" };
    let buttons = [
        (skip_back.as_str(), Button::SkipBack),
        (play, Button::PlayPause),
        (skip_forward.as_str(), Button::SkipForward),
        (rate.as_str(), Button::Rate),
        (mute, Button::Mute),
        ("[ Close ]", Button::Close),
    ];
    let mut x = rows[1].x;
    let mut hits = Vec::new();
    for (label, button) in buttons {
        let width = label.chars().count() as u16;
        if x + width > rows[1].right() {
            break;
        }
        let rect = Rect::new(x, rows[1].y, width, 1);
        f.render_widget(Paragraph::new(label), rect);
        hits.push((rect, button));
        x += width + 1;
    }

    let shown = app.seek_preview.unwrap_or_else(|| state.progress_fraction());
    let time_line = if state.duration_known() {
        let at = shown * state.duration;
        format!(
            "{} / {}  ({:.1}%)",
            catalog::format_clock(at),
            catalog::format_clock(state.duration),
            shown * 100.0
        )
    } else {
        format!("{} / --:--", catalog::format_clock(state.current_time))
    };
    f.render_widget(Paragraph::new(Line::from(time_line)), rows[2]);

    let progress = Gauge::default()
        .ratio(shown.clamp(0.0, 1.0))
        .label("")
        .style(Style::default().fg(Color::Black).bg(Color::White))
        .gauge_style(Style::default().fg(Color::White).bg(Color::Black));
    f.render_widget(progress, rows[3]);

    let vol_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(12), Constraint::Length(30), Constraint::Min(0)])
        .split(rows[4]);
    let volume = state.volume;
    let vol_label = if state.muted {
        "vol muted".to_string()
    } else {
        format!("vol {:>3.0}%", volume * 100.0)
    };
    f.render_widget(Paragraph::new(vol_label), vol_chunks[0]);
    let vol_style = if state.muted {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };
    f.render_widget(
        Gauge::default()
            .ratio(f64::from(volume).clamp(0.0, 1.0))
            .label("")
            .gauge_style(vol_style),
        vol_chunks[1],
    );

    app.hits.buttons = hits;
    app.hits.progress = Some(rows[3]);
    app.hits.volume = Some(vol_chunks[1]);
}

fn draw_footer<M: MediaHandle>(f: &mut ratatui::Frame, app: &App<M>, area: Rect) {
    let footer_block = Block::default().borders(Borders::ALL).title("Status");
    let footer_inner = footer_block.inner(area);
    f.render_widget(footer_block, area);

    let footer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(footer_inner);

    f.render_widget(
        Paragraph::new(Line::from(format!("status: {}", app.status))),
        footer_chunks[0],
    );
    f.render_widget(
        Paragraph::new(Line::from(
            "keys: ↑/↓ select | Enter open | Space play/pause | ←/→ skip | r speed | +/- volume | m mute | / search | s sort | x close | l logs | h help | q quit",
        )),
        footer_chunks[1],
    );
}

fn draw_help(f: &mut ratatui::Frame) {
    let area = centered_rect(70, 70, f.area());
    f.render_widget(Clear, area);
    let help = [
        "Browse",
        "  ↑/↓          select",
        "  PgUp/PgDn    page",
        "  Tab          episodes / chapters",
        "  Enter        open episode / play chapter",
        "  /            search (Enter keep, Esc clear)",
        "  s            sort: latest, popular, oldest",
        "",
        "Player",
        "  Space        play/pause",
        "  ←/→          skip back / forward",
        "  r            playback speed",
        "  +/-          volume",
        "  m            mute",
        "  x or Esc     close player",
        "  mouse        click or drag the progress and volume bars",
        "",
        "Other",
        "  l            logs",
        "  h or ?       help",
        "  q            quit",
    ]
    .join("\n");
    let block = Block::default().title("Help").borders(Borders::ALL);
    f.render_widget(Paragraph::new(help).block(block), area);
}

fn draw_logs<M: MediaHandle>(f: &mut ratatui::Frame, app: &App<M>) {
    let area = centered_rect(90, 80, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Logs (Esc to close, ↑/↓ scroll)");
    let inner = block.inner(area);
    let height = inner.height as usize;
    let total = app.logs.len();
    let end = total.saturating_sub(app.logs_scroll);
    let start = end.saturating_sub(height);
    let mut items = Vec::new();
    for line in app.logs.iter().skip(start).take(end.saturating_sub(start)) {
        items.push(ListItem::new(line.clone()));
    }
    if items.is_empty() {
        items.push(ListItem::new("<no logs>"));
    }
    f.render_widget(List::new(items).block(block), area);
}

fn truncate_label(label: &str, max: usize) -> String {
    let len = label.chars().count();
    if max == 0 || len <= max {
        return label.to_string();
    }
    if max <= 3 {
        return label.chars().take(max).collect();
    }
    let cut: String = label.chars().take(max - 3).collect();
    format!("{cut}...")
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    horizontal[1]
}
