//! Episode catalog loaded from a podcast JSON export.
//!
//! Accepts either the page export (`props.pageProps.podcast`) or a bare
//! podcast object, and provides search, ordering, chapter parsing and the
//! display formatting used by the CLI and the TUI.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use podcast_types::{Chapter, Episode, Podcast};
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Characters kept by [`short_description`] in list rows.
pub const SHORT_DESCRIPTION_CHARS: usize = 120;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    /// Newest first.
    #[default]
    Latest,
    /// Most played first.
    Popular,
    /// Oldest first.
    Oldest,
}

impl SortOrder {
    pub fn next(self) -> SortOrder {
        match self {
            SortOrder::Latest => SortOrder::Popular,
            SortOrder::Popular => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Latest,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Latest => "latest",
            SortOrder::Popular => "popular",
            SortOrder::Oldest => "oldest",
        }
    }
}

#[derive(Deserialize)]
struct PageExport {
    props: PageProps,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageProps {
    page_props: PagePodcast,
}

#[derive(Deserialize)]
struct PagePodcast {
    podcast: Podcast,
}

#[derive(Clone, Debug)]
pub struct Catalog {
    pub podcast: Podcast,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Catalog> {
        let text = fs::read_to_string(path).with_context(|| format!("read catalog {path:?}"))?;
        Catalog::from_json(&text).with_context(|| format!("parse catalog {path:?}"))
    }

    pub fn from_json(text: &str) -> Result<Catalog> {
        let value: serde_json::Value = serde_json::from_str(text).context("invalid JSON")?;
        let podcast = if value.get("props").is_some() {
            serde_json::from_value::<PageExport>(value)
                .context("page export without props.pageProps.podcast")?
                .props
                .page_props
                .podcast
        } else {
            serde_json::from_value::<Podcast>(value).context("not a podcast object")?
        };
        if podcast.episodes.is_empty() {
            tracing::warn!(title = %podcast.title, "catalog has no episodes");
        }
        Ok(Catalog { podcast })
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.podcast.episodes
    }

    pub fn episode(&self, eid: &str) -> Option<&Episode> {
        self.podcast.episodes.iter().find(|e| e.eid == eid)
    }

    /// Episode by id, or an error naming the id.
    pub fn require_episode(&self, eid: &str) -> Result<&Episode> {
        self.episode(eid)
            .ok_or_else(|| anyhow!("no episode with id {eid:?}"))
    }

    /// Episodes matching `query`, in `order`.
    pub fn query(&self, query: &str, order: SortOrder) -> Vec<&Episode> {
        self.query_indices(query, order)
            .into_iter()
            .map(|i| &self.podcast.episodes[i])
            .collect()
    }

    /// Like [`Catalog::query`] but yields positions in [`Catalog::episodes`].
    pub fn query_indices(&self, query: &str, order: SortOrder) -> Vec<usize> {
        let episodes = &self.podcast.episodes;
        let mut hits: Vec<usize> = (0..episodes.len())
            .filter(|&i| matches_query(&episodes[i], query))
            .collect();
        sort_by_order(&mut hits, order, |&i| &episodes[i]);
        hits
    }
}

/// Case-insensitive substring match on title or description; blank matches all.
pub fn matches_query(episode: &Episode, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    episode.title.to_lowercase().contains(&q) || episode.description.to_lowercase().contains(&q)
}

/// Stable sort; episodes without a parseable date sort after dated ones.
fn sort_by_order<'a, T>(items: &mut [T], order: SortOrder, episode: impl Fn(&T) -> &'a Episode) {
    match order {
        SortOrder::Latest | SortOrder::Oldest => items.sort_by(|a, b| {
            match (published_at(episode(a)), published_at(episode(b))) {
                (Some(a), Some(b)) if order == SortOrder::Latest => b.cmp(&a),
                (Some(a), Some(b)) => a.cmp(&b),
                (a, b) => b.is_some().cmp(&a.is_some()),
            }
        }),
        SortOrder::Popular => items.sort_by(|a, b| {
            let plays = |t: &T| episode(t).play_count.unwrap_or(0);
            plays(b).cmp(&plays(a))
        }),
    }
}

pub fn published_at(episode: &Episode) -> Option<OffsetDateTime> {
    let raw = episode.pub_date.as_deref()?;
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

/// Chapters from description lines of the form `M:SS text` or `MM:SS text`.
pub fn chapters(description: &str) -> Vec<Chapter> {
    description.lines().filter_map(parse_chapter_line).collect()
}

fn parse_chapter_line(line: &str) -> Option<Chapter> {
    let (len, seconds) = timestamp_at(line)?;
    let rest = &line[len..];
    let text = rest.trim_start_matches(is_inline_space);
    if text.len() == rest.len() || text.trim().is_empty() {
        return None;
    }
    Some(Chapter {
        time: line[..len].to_string(),
        seconds,
        text: text.trim().to_string(),
    })
}

/// Length and value of a `M:SS`/`MM:SS` stamp at the start of `s`.
fn timestamp_at(s: &str) -> Option<(usize, u32)> {
    let b = s.as_bytes();
    let digit = |i: usize| b.get(i).filter(|c| c.is_ascii_digit()).map(|c| (c - b'0') as u32);
    let minutes_len = match (digit(0), digit(1)) {
        (Some(_), Some(_)) if b.get(2) == Some(&b':') => 2,
        (Some(_), _) if b.get(1) == Some(&b':') => 1,
        _ => return None,
    };
    let mut minutes = 0;
    for i in 0..minutes_len {
        minutes = minutes * 10 + digit(i)?;
    }
    let tens = digit(minutes_len + 1)?;
    let ones = digit(minutes_len + 2)?;
    Some((minutes_len + 3, minutes * 60 + tens * 10 + ones))
}

fn is_inline_space(c: char) -> bool {
    c.is_whitespace() && c != '\n'
}

/// Description without chapter stamps, cut to `max_chars` with `...`.
///
/// A stamp followed by text is removed through the end of its line.
pub fn short_description(description: &str, max_chars: usize) -> String {
    let mut clean = String::with_capacity(description.len());
    for line in description.split_inclusive('\n') {
        match find_stamp(line) {
            Some(at) => clean.push_str(&line[..at]),
            None => clean.push_str(line),
        }
    }
    if clean.chars().count() > max_chars {
        let mut cut: String = clean.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    } else {
        clean
    }
}

/// Byte offset of the first stamp in `line` that is followed by text.
fn find_stamp(line: &str) -> Option<usize> {
    line.char_indices()
        .filter(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)
        .find(|&i| {
            let tail = &line[i..];
            let Some((len, _)) = timestamp_at(tail) else {
                return false;
            };
            let rest = &tail[len..];
            let text = rest.trim_start_matches(is_inline_space);
            text.len() < rest.len() && text.chars().next().is_some_and(|c| c != '\n')
        })
}

/// `H:MM:SS` from one hour up, else `M:SS`; non-finite or negative input is `0:00`.
pub fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// `N h M min` from one hour up, else `M min S s`.
pub fn format_duration_long(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0 min 0 s".to_string();
    }
    let total = seconds.floor() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h} h {m} min")
    } else {
        format!("{m} min {s} s")
    }
}

/// Publish date relative to `now`: today, yesterday, days or weeks ago, then the date.
///
/// Dates a day or more in the future are printed as dates.
pub fn relative_date(published: OffsetDateTime, now: OffsetDateTime) -> String {
    let days = (now - published).whole_days();
    match days {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        2..=6 => format!("{days} days ago"),
        7..=29 => {
            let weeks = days / 7;
            if weeks == 1 {
                "1 week ago".to_string()
            } else {
                format!("{weeks} weeks ago")
            }
        }
        _ => {
            let d = published.date();
            format!("{}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
        }
    }
}
