//! Showtime ranking.
//!
//! Tallies are derived from the raw vote rows on every query; nothing here is
//! persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use movienight_db::entities::{movie, showtime, vote};
use serde::Serialize;

/// Tally a locked showtime is lifted by. No amount of organic voting can reach it.
pub const LOCK_SENTINEL: i32 = 1000;

/// Showtimes at or below this net tally are dropped from listings.
pub const EXCLUSION_TALLY: i32 = -3;

/// Showtime details shown next to a tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowtimeSummary {
    pub id: i32,
    pub movie_id: i32,
    pub movie_title: String,
    pub poster: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub screen: String,
    pub location: String,
}

impl ShowtimeSummary {
    /// Build from a showtime row and its (possibly missing) movie.
    #[must_use]
    pub fn from_models(showtime: showtime::Model, movie: Option<movie::Model>) -> Self {
        let (movie_title, poster) = movie.map_or_else(
            || ("Unknown".to_string(), None),
            |m| (m.title, m.poster),
        );

        Self {
            id: showtime.id,
            movie_id: showtime.movie_id,
            movie_title,
            poster,
            starts_at: showtime.starts_at.with_timezone(&Utc),
            screen: showtime.screen,
            location: showtime.location,
        }
    }
}

/// A showtime with its net tally and, when asked for, the requester's own vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowtimeTally {
    #[serde(flatten)]
    pub showtime: ShowtimeSummary,
    /// Net votes over all users.
    pub votes: i32,
    /// Requester's vote, `Some(0)` when they have not voted on this showtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<i32>,
}

impl ShowtimeTally {
    /// Whether this showtime carries the lock vote.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.votes >= LOCK_SENTINEL
    }
}

/// Rank `showtimes` by the votes cast on them.
///
/// Order is net tally descending, then start time ascending. Showtimes at or
/// below [`EXCLUSION_TALLY`] are left out. `for_user` attaches that user's own
/// vote to each entry.
#[must_use]
pub fn rank(
    showtimes: Vec<ShowtimeSummary>,
    votes: &[vote::Model],
    for_user: Option<i32>,
    limit: Option<usize>,
) -> Vec<ShowtimeTally> {
    let mut totals: HashMap<i32, i32> = HashMap::new();
    let mut own: HashMap<i32, i32> = HashMap::new();

    for v in votes {
        *totals.entry(v.showtime_id).or_default() += v.value;
        if Some(v.user_id) == for_user {
            own.insert(v.showtime_id, v.value);
        }
    }

    let mut ranked: Vec<ShowtimeTally> = showtimes
        .into_iter()
        .map(|showtime| ShowtimeTally {
            votes: totals.get(&showtime.id).copied().unwrap_or_default(),
            vote: for_user.map(|_| own.get(&showtime.id).copied().unwrap_or_default()),
            showtime,
        })
        .filter(|t| t.votes > EXCLUSION_TALLY)
        .collect();

    ranked.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then_with(|| a.showtime.starts_at.cmp(&b.showtime.starts_at))
            .then_with(|| a.showtime.id.cmp(&b.showtime.id))
    });

    if let Some(limit) = limit {
        ranked.truncate(limit);
    }

    ranked
}
